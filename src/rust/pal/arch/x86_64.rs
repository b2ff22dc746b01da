// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! x86-64 register file and context-switch routines. The System V ABI makes
//! rbx, rbp, and r12-r15 callee-saved; everything else is dead across the
//! save call by the calling convention, so only those six registers, the
//! stack pointer, and the resume address need to be recorded.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::arch::global_asm;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Number of 64-bit words in the saved register file.
pub const CONTEXT_WORDS: usize = 8;

/// Slot holding the stack pointer.
pub const REG_SP: usize = 6;
/// Slot holding the resume program counter.
pub const REG_PC: usize = 7;
/// Slot (rbx) in which a prepared context parks the thread entry function.
pub const REG_ENTRY: usize = 0;
/// Slot (r12) in which a prepared context parks the thread exit function.
pub const REG_EXIT: usize = 2;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

extern "C" {
    /// Records the callee-saved register file, the post-return stack pointer,
    /// and the return address in `regs`, then returns the sentinel zero. A
    /// later [uos_context_restore] on the same buffer makes this call appear
    /// to return a second time with the restorer's value.
    pub fn uos_context_save(regs: *mut u64) -> u64;

    /// Reinstates the register file recorded in `regs` and resumes at its
    /// recorded program counter, delivering `value` as the apparent return
    /// value of the paired [uos_context_save].
    pub fn uos_context_restore(regs: *const u64, value: u64) -> !;

    /// First instruction a spawned thread executes. Expects the entry
    /// function in rbx and the exit function in r12, realigns the fresh
    /// stack, and routes a returning entry function into the exit function.
    pub fn uos_thread_trampoline();
}

global_asm!(
    r#"
    .globl uos_context_save
    uos_context_save:
        mov [rdi + 0x00], rbx
        mov [rdi + 0x08], rbp
        mov [rdi + 0x10], r12
        mov [rdi + 0x18], r13
        mov [rdi + 0x20], r14
        mov [rdi + 0x28], r15
        lea rax, [rsp + 8]
        mov [rdi + 0x30], rax
        mov rax, [rsp]
        mov [rdi + 0x38], rax
        xor eax, eax
        ret

    .globl uos_context_restore
    uos_context_restore:
        mov rbx, [rdi + 0x00]
        mov rbp, [rdi + 0x08]
        mov r12, [rdi + 0x10]
        mov r13, [rdi + 0x18]
        mov r14, [rdi + 0x20]
        mov r15, [rdi + 0x28]
        mov rsp, [rdi + 0x30]
        mov rax, rsi
        jmp qword ptr [rdi + 0x38]

    .globl uos_thread_trampoline
    uos_thread_trampoline:
        and rsp, -16
        call rbx
        call r12
        ud2
    "#
);
