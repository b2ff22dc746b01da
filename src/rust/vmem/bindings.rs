// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! C entry points for the virtual-memory library, operating on one
//! process-wide address space. Success returns 1, failure returns 0.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::logging,
    vmem::{
        physical::Word,
        translator::AddressSpace,
    },
};
use ::libc::c_int;
use ::std::ptr;

//======================================================================================================================
// Static Variables
//======================================================================================================================

/// The process-wide address space behind the C surface.
static mut ADDRESS_SPACE: Option<AddressSpace> = None;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

unsafe fn instance() -> Option<&'static mut AddressSpace> {
    (*ptr::addr_of_mut!(ADDRESS_SPACE)).as_mut()
}

#[no_mangle]
pub extern "C" fn VMinitialize() {
    logging::initialize();
    trace!("VMinitialize()");

    let space: &mut AddressSpace = unsafe {
        match instance() {
            Some(space) => space,
            None => {
                *ptr::addr_of_mut!(ADDRESS_SPACE) = Some(AddressSpace::new());
                instance().expect("address space was just installed")
            },
        }
    };
    space.initialize();
}

#[no_mangle]
pub extern "C" fn VMread(virtual_address: u64, value: *mut Word) -> c_int {
    if value.is_null() {
        return 0;
    }
    let space: &mut AddressSpace = match unsafe { instance() } {
        Some(space) => space,
        None => return 0,
    };
    match space.read(virtual_address) {
        Ok(word) => {
            unsafe { *value = word };
            1
        },
        Err(fail) => {
            warn!("VMread() failed: {:?}", fail);
            0
        },
    }
}

#[no_mangle]
pub extern "C" fn VMwrite(virtual_address: u64, value: Word) -> c_int {
    let space: &mut AddressSpace = match unsafe { instance() } {
        Some(space) => space,
        None => return 0,
    };
    match space.write(virtual_address, value) {
        Ok(()) => 1,
        Err(fail) => {
            warn!("VMwrite() failed: {:?}", fail);
            0
        },
    }
}
