// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! C entry points for the thread library. Fixed names and signatures for
//! ABI compatibility: results become return codes, and every caller-misuse
//! failure writes one diagnostic line to the error channel.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::fail::Fail,
    uthread,
    uthread::{
        ThreadEntryPoint,
        ThreadId,
    },
};
use ::libc::c_int;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Reports a caller-misuse failure on the error channel and returns the
/// failure return code.
fn report_library_error(fail: &Fail) -> c_int {
    eprintln!("thread library error: {}", fail.cause);
    -1
}

#[no_mangle]
pub extern "C" fn uthread_init(quantum_usecs: c_int) -> c_int {
    match uthread::init(quantum_usecs) {
        Ok(()) => 0,
        Err(fail) => report_library_error(&fail),
    }
}

#[no_mangle]
pub extern "C" fn uthread_spawn(entry_point: Option<ThreadEntryPoint>) -> c_int {
    let entry_point: ThreadEntryPoint = match entry_point {
        Some(entry_point) => entry_point,
        None => return report_library_error(&Fail::invalid_argument("spawn", "invalid entry point")),
    };
    match uthread::spawn(entry_point) {
        Ok(tid) => tid as c_int,
        Err(fail) => report_library_error(&fail),
    }
}

#[no_mangle]
pub extern "C" fn uthread_terminate(tid: c_int) -> c_int {
    if tid < 0 {
        return report_library_error(&Fail::no_such_thread("terminate"));
    }
    match uthread::terminate(tid as ThreadId) {
        Ok(()) => 0,
        Err(fail) => report_library_error(&fail),
    }
}

#[no_mangle]
pub extern "C" fn uthread_block(tid: c_int) -> c_int {
    if tid < 0 {
        return report_library_error(&Fail::no_such_thread("block"));
    }
    match uthread::block(tid as ThreadId) {
        Ok(()) => 0,
        Err(fail) => report_library_error(&fail),
    }
}

#[no_mangle]
pub extern "C" fn uthread_resume(tid: c_int) -> c_int {
    if tid < 0 {
        return report_library_error(&Fail::no_such_thread("resume"));
    }
    match uthread::resume(tid as ThreadId) {
        Ok(()) => 0,
        Err(fail) => report_library_error(&fail),
    }
}

#[no_mangle]
pub extern "C" fn uthread_sleep(num_quantums: c_int) -> c_int {
    if num_quantums < 0 {
        return report_library_error(&Fail::invalid_argument("sleep", "invalid number of quantums"));
    }
    match uthread::sleep(num_quantums as u32) {
        Ok(()) => 0,
        Err(fail) => report_library_error(&fail),
    }
}

#[no_mangle]
pub extern "C" fn uthread_get_tid() -> c_int {
    match uthread::get_tid() {
        Ok(tid) => tid as c_int,
        Err(fail) => report_library_error(&fail),
    }
}

#[no_mangle]
pub extern "C" fn uthread_get_total_quantums() -> c_int {
    match uthread::get_total_quantums() {
        Ok(total) => total as c_int,
        Err(fail) => report_library_error(&fail),
    }
}

#[no_mangle]
pub extern "C" fn uthread_get_quantums(tid: c_int) -> c_int {
    if tid < 0 {
        return report_library_error(&Fail::no_such_thread("get_quantums"));
    }
    match uthread::get_quantums(tid as ThreadId) {
        Ok(quantums) => quantums as c_int,
        Err(fail) => report_library_error(&fail),
    }
}
