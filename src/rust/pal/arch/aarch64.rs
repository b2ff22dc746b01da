// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! AArch64 register file and context-switch routines. The AAPCS64 makes
//! x19-x28, the frame pointer, and the low halves of v8-v15 callee-saved;
//! the link register doubles as the resume address.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::arch::global_asm;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Number of 64-bit words in the saved register file.
pub const CONTEXT_WORDS: usize = 21;

/// Slot holding the stack pointer.
pub const REG_SP: usize = 11;
/// Slot holding the resume program counter.
pub const REG_PC: usize = 12;
/// Slot (x19) in which a prepared context parks the thread entry function.
pub const REG_ENTRY: usize = 0;
/// Slot (x20) in which a prepared context parks the thread exit function.
pub const REG_EXIT: usize = 1;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

extern "C" {
    /// Records the callee-saved register file, the stack pointer, and the
    /// link register in `regs`, then returns the sentinel zero. A later
    /// [uos_context_restore] on the same buffer makes this call appear to
    /// return a second time with the restorer's value.
    pub fn uos_context_save(regs: *mut u64) -> u64;

    /// Reinstates the register file recorded in `regs` and resumes at its
    /// recorded program counter, delivering `value` as the apparent return
    /// value of the paired [uos_context_save].
    pub fn uos_context_restore(regs: *const u64, value: u64) -> !;

    /// First instruction a spawned thread executes. Expects the entry
    /// function in x19 and the exit function in x20, and routes a returning
    /// entry function into the exit function.
    pub fn uos_thread_trampoline();
}

global_asm!(
    r#"
    .globl uos_context_save
    uos_context_save:
        stp x19, x20, [x0, #0x00]
        stp x21, x22, [x0, #0x10]
        stp x23, x24, [x0, #0x20]
        stp x25, x26, [x0, #0x30]
        stp x27, x28, [x0, #0x40]
        str x29, [x0, #0x50]
        mov x9, sp
        stp x9, x30, [x0, #0x58]
        stp d8, d9, [x0, #0x68]
        stp d10, d11, [x0, #0x78]
        stp d12, d13, [x0, #0x88]
        stp d14, d15, [x0, #0x98]
        mov x0, xzr
        ret

    .globl uos_context_restore
    uos_context_restore:
        ldp x19, x20, [x0, #0x00]
        ldp x21, x22, [x0, #0x10]
        ldp x23, x24, [x0, #0x20]
        ldp x25, x26, [x0, #0x30]
        ldp x27, x28, [x0, #0x40]
        ldr x29, [x0, #0x50]
        ldp x9, x30, [x0, #0x58]
        mov sp, x9
        ldp d8, d9, [x0, #0x68]
        ldp d10, d11, [x0, #0x78]
        ldp d12, d13, [x0, #0x88]
        ldp d14, d15, [x0, #0x98]
        mov x0, x1
        ret

    .globl uos_thread_trampoline
    uos_thread_trampoline:
        blr x19
        blr x20
        brk #0
    "#
);
