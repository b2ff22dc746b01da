// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::libc::c_int;
use ::std::{
    error,
    fmt,
    process,
};

//==============================================================================
// Structures
//==============================================================================

/// Failure
///
/// Carried by every fallible operation in the crate. The errno mirrors the
/// code that the C-ABI layer reports to callers; the cause is the single
/// diagnostic line written to the error channel.
#[derive(Clone)]
pub struct Fail {
    /// Error code.
    pub errno: c_int,
    /// Cause.
    pub cause: String,
}

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate Functions for Failures
impl Fail {
    /// Creates a new Failure
    pub fn new(errno: i32, cause: &str) -> Self {
        Self {
            errno,
            cause: cause.to_string(),
        }
    }

    /// Creates a Failure flagging an invalid argument to `op`.
    pub fn invalid_argument(op: &str, cause: &str) -> Self {
        Self::new(libc::EINVAL, &format!("{} - {}", op, cause))
    }

    /// Creates a Failure flagging an unknown thread id passed to `op`.
    pub fn no_such_thread(op: &str) -> Self {
        Self::new(libc::ESRCH, &format!("{} - thread id not found", op))
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

/// Display Trait Implementation for Failures
impl fmt::Display for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {:?}: {:?}", self.errno, self.cause)
    }
}

/// Debug Trait Implementation for Failures
impl fmt::Debug for Fail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {:?}: {:?}", self.errno, self.cause)
    }
}

/// Error Trait Implementation for Failures
impl error::Error for Fail {}

//==============================================================================
// Standalone Functions
//==============================================================================

/// Reports an unrecoverable OS-primitive failure and terminates the process.
/// Reserved for system-call failures (signal install, timer arming, mask
/// manipulation) that leave the runtime in an unusable state.
pub fn fatal_system_error(cause: &str) -> ! {
    eprintln!("system error: {}", cause);
    process::exit(1);
}
