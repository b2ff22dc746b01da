// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::{
    fatal_system_error,
    Fail,
};
use ::libc::c_int;
use ::std::{
    mem,
    ptr,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Signal that drives preemption. ITIMER_VIRTUAL counts down in process
/// virtual time and delivers this signal on expiry.
pub const PREEMPT_SIGNAL: c_int = libc::SIGVTALRM;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Scoped preemption lock. Blocks [PREEMPT_SIGNAL] on construction and
/// unblocks it when dropped, so no context switch can occur while a guard
/// is alive. Every exit path of a scope, normal or abnormal, runs the drop.
pub struct SignalMaskGuard(());

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SignalMaskGuard {
    /// Disables preemption for the lifetime of the returned guard.
    pub fn block() -> Self {
        change_preempt_mask(libc::SIG_BLOCK, "lock - failed to disable context switching");
        Self(())
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Drop for SignalMaskGuard {
    fn drop(&mut self) {
        change_preempt_mask(libc::SIG_UNBLOCK, "lock - failed to reenable context switching");
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Adds or removes [PREEMPT_SIGNAL] from the calling thread's blocked set.
/// A failing sigprocmask leaves the runtime unable to guarantee exclusion,
/// so it is fatal.
fn change_preempt_mask(how: c_int, cause: &str) {
    unsafe {
        let mut sigset: libc::sigset_t = mem::zeroed();
        if libc::sigemptyset(&mut sigset) != 0
            || libc::sigaddset(&mut sigset, PREEMPT_SIGNAL) != 0
            || libc::sigprocmask(how, &sigset, ptr::null_mut()) != 0
        {
            fatal_system_error(cause);
        }
    }
}

/// Opens preemption without a guard. For the start of a fresh thread,
/// which inherits the blocked mask of the switch that launched it and has
/// no guard scope to fall out of.
pub fn enable_preemption() {
    change_preempt_mask(libc::SIG_UNBLOCK, "start - failed to enable context switching");
}

/// Installs `handler` for [PREEMPT_SIGNAL]. The handler's own delivery mask
/// includes the signal, so it never reenters itself.
pub fn install_preempt_handler(handler: extern "C" fn(c_int)) -> Result<(), Fail> {
    unsafe {
        let mut action: libc::sigaction = mem::zeroed();
        action.sa_sigaction = handler as usize;
        if libc::sigemptyset(&mut action.sa_mask) != 0 || libc::sigaddset(&mut action.sa_mask, PREEMPT_SIGNAL) != 0 {
            return Err(Fail::new(libc::EINVAL, "init - failed to build the handler signal mask"));
        }
        if libc::sigaction(PREEMPT_SIGNAL, &action, ptr::null_mut()) != 0 {
            return Err(Fail::new(libc::EAGAIN, "init - failed to setup signal handling"));
        }
    }
    Ok(())
}
