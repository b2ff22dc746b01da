// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Preemptive user-level threads. Many green threads are multiplexed onto
//! the one OS thread that called [init]; a periodic virtual-time signal
//! preempts the running thread, and terminate/block/sleep yield explicitly.
//! Every entry point holds a scoped signal-mask guard, so scheduler state
//! is never touched concurrently with the timer handler.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod bindings;
mod scheduler;
mod thread;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    pal::linux::{
        arm_virtual_timer,
        enable_preemption,
        install_preempt_handler,
        SignalMaskGuard,
    },
    runtime::{
        fail::{
            fatal_system_error,
            Fail,
        },
        logging,
    },
    uthread::scheduler::Scheduler,
};
use ::std::process;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Capacity of the thread table, the initial thread included.
pub const MAX_THREAD_NUM: usize = 100;

/// Size of a spawned thread's private stack, in bytes.
pub const STACK_SIZE: usize = 4096;

//======================================================================================================================
// Types
//======================================================================================================================

/// Stable thread identifier. Zero names the initial thread.
pub type ThreadId = u32;

/// Entry function of a spawned thread. A thread whose entry function
/// returns is terminated as if it had called [terminate] on itself.
pub type ThreadEntryPoint = extern "C" fn();

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Initializes the thread library: creates the record of the calling
/// thread as thread zero, installs the virtual-time signal handler, and
/// arms the periodic timer with period `quantum_usecs` microseconds.
/// Failing to install the handler or the timer is fatal.
pub fn init(quantum_usecs: i32) -> Result<(), Fail> {
    logging::initialize();
    trace!("init(): quantum_usecs={:?}", quantum_usecs);

    let _guard: SignalMaskGuard = SignalMaskGuard::block();
    if quantum_usecs <= 0 {
        return Err(Fail::invalid_argument("init", "invalid quantum interval value"));
    }
    if scheduler::is_initialized() {
        return Err(Fail::new(libc::EEXIST, "init - library is already initialized"));
    }

    scheduler::set_instance(Scheduler::new(quantum_usecs as i64));
    if let Err(fail) = install_preempt_handler(scheduler::preempt_signal_handler) {
        fatal_system_error(&fail.cause);
    }
    if let Err(fail) = arm_virtual_timer(quantum_usecs as i64) {
        fatal_system_error(&fail.cause);
    }
    Ok(())
}

/// Spawns a new thread that starts in `entry`, returning its identifier:
/// the smallest one currently free.
pub fn spawn(entry: ThreadEntryPoint) -> Result<ThreadId, Fail> {
    let _guard: SignalMaskGuard = SignalMaskGuard::block();
    let scheduler: &mut Scheduler = unsafe { scheduler::instance() }?;
    scheduler.reap_zombie();
    scheduler.spawn(entry, thread_main, thread_exit)
}

/// Terminates a thread. Terminating thread zero ends the whole process
/// with exit status zero. A thread that terminates itself never returns
/// from this call.
pub fn terminate(tid: ThreadId) -> Result<(), Fail> {
    let _guard: SignalMaskGuard = SignalMaskGuard::block();
    let scheduler: &mut Scheduler = unsafe { scheduler::instance() }?;
    scheduler.reap_zombie();
    if tid == 0 {
        trace!("terminate(): main thread, exiting");
        process::exit(0);
    }
    scheduler.terminate(tid)
}

/// Blocks a thread until a matching [resume]. Blocking the running thread
/// yields immediately; blocking an already-blocked thread is a no-op.
pub fn block(tid: ThreadId) -> Result<(), Fail> {
    let _guard: SignalMaskGuard = SignalMaskGuard::block();
    let scheduler: &mut Scheduler = unsafe { scheduler::instance() }?;
    scheduler.reap_zombie();
    scheduler.block(tid)
}

/// Clears a thread's user-blocked flag. The thread becomes runnable once
/// no sleep is pending either; resuming a runnable thread has no effect.
pub fn resume(tid: ThreadId) -> Result<(), Fail> {
    let _guard: SignalMaskGuard = SignalMaskGuard::block();
    let scheduler: &mut Scheduler = unsafe { scheduler::instance() }?;
    scheduler.reap_zombie();
    scheduler.resume(tid)
}

/// Puts the calling thread to sleep for `num_quantums` timer quanta. The
/// initial thread may not sleep.
pub fn sleep(num_quantums: u32) -> Result<(), Fail> {
    let _guard: SignalMaskGuard = SignalMaskGuard::block();
    let scheduler: &mut Scheduler = unsafe { scheduler::instance() }?;
    scheduler.reap_zombie();
    scheduler.sleep(num_quantums)
}

/// Identifier of the calling thread.
pub fn get_tid() -> Result<ThreadId, Fail> {
    let _guard: SignalMaskGuard = SignalMaskGuard::block();
    let scheduler: &mut Scheduler = unsafe { scheduler::instance() }?;
    scheduler.reap_zombie();
    Ok(scheduler.running_tid())
}

/// Quanta elapsed since [init], counting the initial thread's first one.
pub fn get_total_quantums() -> Result<u32, Fail> {
    let _guard: SignalMaskGuard = SignalMaskGuard::block();
    let scheduler: &mut Scheduler = unsafe { scheduler::instance() }?;
    scheduler.reap_zombie();
    Ok(scheduler.total_quantums())
}

/// Quanta consumed by the given thread so far.
pub fn get_quantums(tid: ThreadId) -> Result<u32, Fail> {
    let _guard: SignalMaskGuard = SignalMaskGuard::block();
    let scheduler: &mut Scheduler = unsafe { scheduler::instance() }?;
    scheduler.reap_zombie();
    scheduler.quantums(tid)
}

/// First code a spawned thread runs. The switch that started the thread
/// left the preemption signal blocked, which covers the entry lookup; the
/// shim then opens preemption and dispatches into the user entry.
extern "C" fn thread_main() {
    let entry: ThreadEntryPoint = unsafe { scheduler::instance() }
        .expect("a thread is running, so the library is initialized")
        .running_entry();
    enable_preemption();
    entry();
}

/// Continuation of a thread whose entry function returned: the thread
/// terminates itself.
extern "C" fn thread_exit() {
    let tid: ThreadId = get_tid().unwrap_or(0);
    let _ = terminate(tid);
    unreachable!("terminate of the running thread does not return");
}
