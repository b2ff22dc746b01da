// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Architecture-specific half of the machine-context primitive: the
//! callee-saved register file layout and the assembly save/restore/start
//! routines. Everything above this module is architecture-neutral.

//======================================================================================================================
// Exports
//======================================================================================================================

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        pub use self::x86_64::*;
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        pub use self::aarch64::*;
    } else {
        compile_error!("no machine-context support for this architecture");
    }
}
