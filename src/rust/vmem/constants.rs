// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Width constants fixing the shape of the address space at compile time.
//! The page-index bits split into TABLES_DEPTH equal slices of OFFSET_WIDTH
//! bits, one per level of the page-table tree.

//======================================================================================================================
// Constants
//======================================================================================================================

/// Number of bits in a virtual address.
pub const VIRTUAL_ADDRESS_WIDTH: u64 = 20;

/// Number of low bits selecting a word within a page.
pub const OFFSET_WIDTH: u64 = 5;

/// Number of page-table levels between the root and a data page.
pub const TABLES_DEPTH: u64 = (VIRTUAL_ADDRESS_WIDTH - OFFSET_WIDTH) / OFFSET_WIDTH;

/// Number of physical frames. Frame zero is permanently the root table.
pub const NUM_FRAMES: u64 = 6;

/// Number of words in a page (and in a frame).
pub const PAGE_SIZE: u64 = 1 << OFFSET_WIDTH;

/// Number of pages in the virtual address space.
pub const NUM_PAGES: u64 = 1 << (VIRTUAL_ADDRESS_WIDTH - OFFSET_WIDTH);
