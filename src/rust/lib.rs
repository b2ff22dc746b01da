// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! uos is a user-level operating-system runtime. It bundles three
//! subsystems that share one plumbing layer:
//!
//! - [`uthread`]: a preemptive green-thread library that multiplexes many
//!   cooperatively-context-switched threads onto a single OS thread, driven
//!   by a periodic virtual-time signal.
//! - [`vmem`]: a hierarchical virtual-memory translator with demand paging
//!   and cyclical-distance replacement over a small physical frame pool.
//! - [`mapred`]: a bounded MapReduce engine coordinating OS worker threads
//!   through a bit-packed atomic stage counter.

#![cfg_attr(feature = "strict", deny(clippy::all))]

mod collections;
mod pal;

pub mod mapred;
pub mod runtime;
pub mod uthread;
pub mod vmem;

#[macro_use]
extern crate log;

pub use crate::{
    mapred::{
        start_map_reduce_job,
        Job,
        JobState,
        MapReduceClient,
        Stage,
    },
    runtime::fail::Fail,
    uthread::{
        ThreadEntryPoint,
        ThreadId,
    },
    vmem::{
        AddressSpace,
        Word,
    },
};

/// Ensures that two expressions are equal. On mismatch, bails out of the
/// enclosing test with an [anyhow::Error] describing both values.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    ::anyhow::bail!(
                        "ensure_eq failed: `(left == right)`\n  left: `{:?}`,\n right: `{:?}`",
                        &*left_val,
                        &*right_val
                    );
                }
            },
        }
    };
}

/// Ensures that two expressions are not equal. On match, bails out of the
/// enclosing test with an [anyhow::Error] describing both values.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    ::anyhow::bail!(
                        "ensure_neq failed: `(left != right)`\n  left: `{:?}`,\n right: `{:?}`",
                        &*left_val,
                        &*right_val
                    );
                }
            },
        }
    };
}
