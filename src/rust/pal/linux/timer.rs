// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::std::ptr;

//======================================================================================================================
// Constants
//======================================================================================================================

const USECS_PER_SEC: i64 = 1_000_000;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Arms the periodic virtual-time timer with period `quantum_usecs`. Also
/// used to restart the current period, so a thread switched in after a
/// voluntary block receives a full quantum.
pub fn arm_virtual_timer(quantum_usecs: i64) -> Result<(), Fail> {
    let period: libc::timeval = libc::timeval {
        tv_sec: quantum_usecs / USECS_PER_SEC,
        tv_usec: quantum_usecs % USECS_PER_SEC,
    };
    let timer: libc::itimerval = libc::itimerval {
        it_interval: period,
        it_value: period,
    };

    if unsafe { libc::setitimer(libc::ITIMER_VIRTUAL, &timer, ptr::null_mut()) } != 0 {
        return Err(Fail::new(libc::EAGAIN, "init - timer setup failed"));
    }
    Ok(())
}
