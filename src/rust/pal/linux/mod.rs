// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod signals;
pub mod timer;

pub use signals::{
    enable_preemption,
    install_preempt_handler,
    SignalMaskGuard,
    PREEMPT_SIGNAL,
};
pub use timer::arm_virtual_timer;
