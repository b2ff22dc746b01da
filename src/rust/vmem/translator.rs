// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The address translator. Virtual addresses walk a TABLES_DEPTH-deep tree
//! of page-table frames rooted at frame zero; missing links fault in fresh
//! frames chosen by one depth-first survey of the tree itself, so the
//! translator needs no per-frame metadata outside the frames it manages.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::fail::Fail,
    vmem::{
        constants::{
            NUM_FRAMES,
            NUM_PAGES,
            OFFSET_WIDTH,
            PAGE_SIZE,
            TABLES_DEPTH,
            VIRTUAL_ADDRESS_WIDTH,
        },
        physical::{
            PhysicalMemory,
            Word,
        },
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// The translator over one physical memory.
pub struct AddressSpace {
    memory: PhysicalMemory,
}

/// Reference to a page-table slot: the frame holding the table and the word
/// index within it.
#[derive(Clone, Copy, Debug)]
struct SlotRef {
    frame: u64,
    slot: u64,
}

/// Everything one depth-first traversal of the tree learns about where the
/// next frame should come from.
#[derive(Default)]
struct Survey {
    /// Largest frame index reachable from the root.
    max_frame: u64,
    /// First page-table frame found with all words zero, and the slot that
    /// links it. The host page table of the ongoing allocation never
    /// qualifies.
    empty_table: Option<(u64, SlotRef)>,
    /// Resident page cyclically farthest from the target page: distance,
    /// holding frame, page number, and the leaf slot that links it.
    victim: Option<(u64, u64, u64, SlotRef)>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Address Spaces
impl AddressSpace {
    /// Creates an address space over fresh, zeroed physical memory.
    pub fn new() -> Self {
        Self {
            memory: PhysicalMemory::new(),
        }
    }

    /// Clears the root page table. Physical memory outside frame zero is
    /// left as is; nothing references it anymore.
    pub fn initialize(&mut self) {
        self.zero_frame(0);
    }

    /// Reads the word at virtual address `va`, faulting the page in if
    /// needed. Fails without side effects if `va` is out of range.
    pub fn read(&mut self, va: u64) -> Result<Word, Fail> {
        let addr: u64 = self.translate(va)?;
        Ok(self.memory.read(addr))
    }

    /// Writes `value` at virtual address `va`, faulting the page in if
    /// needed. Fails without side effects if `va` is out of range.
    pub fn write(&mut self, va: u64, value: Word) -> Result<(), Fail> {
        let addr: u64 = self.translate(va)?;
        self.memory.write(addr, value);
        Ok(())
    }

    /// Read-only view of the underlying physical memory, for workload
    /// inspection.
    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    /// Resolves a virtual address to a physical word address, materializing
    /// any missing page-table links and restoring the page from the backing
    /// store when the walk allocated.
    fn translate(&mut self, va: u64) -> Result<u64, Fail> {
        if va >= (1 << VIRTUAL_ADDRESS_WIDTH) {
            return Err(Fail::new(libc::EFAULT, "virtual address is out of range"));
        }

        let page: u64 = va >> OFFSET_WIDTH;
        let mut frame: u64 = 0;
        let mut faulted: bool = false;
        for depth in 0..TABLES_DEPTH {
            let slot: u64 = index_at_depth(page, depth);
            let entry: u64 = self.memory.read(frame * PAGE_SIZE + slot) as u64;
            if entry != 0 {
                frame = entry;
                continue;
            }
            faulted = true;
            let fresh: u64 = self.allocate_frame(frame, page);
            self.memory.write(frame * PAGE_SIZE + slot, fresh as Word);
            frame = fresh;
        }

        if faulted {
            self.memory.restore(frame, page);
        }
        Ok(frame * PAGE_SIZE + (va & (PAGE_SIZE - 1)))
    }

    /// Picks the frame that will host a new table or page, using one survey
    /// of the tree. In order of preference: recycle an unused page table,
    /// grow past the highest frame in use, or evict the resident page
    /// cyclically farthest from `target_page`. The returned frame is zeroed
    /// and unreferenced.
    fn allocate_frame(&mut self, host_table: u64, target_page: u64) -> u64 {
        let mut survey: Survey = Survey::default();
        self.survey(0, 0, 0, None, host_table, target_page, &mut survey);

        if let Some((frame, link)) = survey.empty_table {
            // Already all zero; just unlink it from its parent.
            self.memory.write(link.frame * PAGE_SIZE + link.slot, 0);
            return frame;
        }

        // The survey visits frames in increasing index order, so any hole
        // below the maximum would have surfaced as an empty table above.
        let next: u64 = survey.max_frame + 1;
        if next < NUM_FRAMES {
            self.zero_frame(next);
            return next;
        }

        let (_, frame, page, link) = survey.victim.expect("frame pool exhausted with no resident page");
        self.memory.evict(frame, page);
        self.memory.write(link.frame * PAGE_SIZE + link.slot, 0);
        self.zero_frame(frame);
        frame
    }

    /// Depth-first walk over the page-table frame `frame` sitting at
    /// `depth`, under the partial page number `page_prefix`. Accumulates
    /// the allocation candidates into `survey`. Only frames reached at the
    /// leaf level are ranked for eviction; interior tables never are.
    #[allow(clippy::too_many_arguments)]
    fn survey(
        &self,
        frame: u64,
        depth: u64,
        page_prefix: u64,
        link: Option<SlotRef>,
        host_table: u64,
        target_page: u64,
        survey: &mut Survey,
    ) {
        let mut has_children: bool = false;
        for slot in 0..PAGE_SIZE {
            let entry: u64 = self.memory.read(frame * PAGE_SIZE + slot) as u64;
            if entry == 0 {
                continue;
            }
            has_children = true;
            survey.max_frame = survey.max_frame.max(entry);

            let child_page: u64 = (page_prefix << OFFSET_WIDTH) | slot;
            let child_link: SlotRef = SlotRef { frame, slot };
            if depth + 1 == TABLES_DEPTH {
                let distance: u64 = cyclical_distance(child_page, target_page);
                let closer: bool = match survey.victim {
                    Some((best, _, _, _)) => distance > best,
                    None => true,
                };
                if closer {
                    survey.victim = Some((distance, entry, child_page, child_link));
                }
            } else {
                self.survey(entry, depth + 1, child_page, Some(child_link), host_table, target_page, survey);
            }
        }

        // An unused table is recyclable unless the ongoing allocation is
        // about to write its result into this very frame.
        if !has_children && frame != host_table && survey.empty_table.is_none() {
            if let Some(link) = link {
                survey.empty_table = Some((frame, link));
            }
        }
    }

    fn zero_frame(&mut self, frame: u64) {
        for slot in 0..PAGE_SIZE {
            self.memory.write(frame * PAGE_SIZE + slot, 0);
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Index into the page-table level at `depth` for `page`: the depth-th
/// OFFSET_WIDTH-bit slice of the page number, counted from the top.
fn index_at_depth(page: u64, depth: u64) -> u64 {
    (page >> (OFFSET_WIDTH * (TABLES_DEPTH - 1 - depth))) & (PAGE_SIZE - 1)
}

/// Distance between two pages on the page-number circle.
fn cyclical_distance(page: u64, target: u64) -> u64 {
    let linear: u64 = page.abs_diff(target);
    linear.min(NUM_PAGES - linear)
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        cyclical_distance,
        index_at_depth,
        AddressSpace,
    };
    use crate::vmem::constants::{
        NUM_FRAMES,
        NUM_PAGES,
        OFFSET_WIDTH,
        PAGE_SIZE,
        TABLES_DEPTH,
        VIRTUAL_ADDRESS_WIDTH,
    };
    use ::anyhow::Result;
    use ::std::collections::HashSet;

    /// Walks the page-table tree and checks the structural invariants:
    /// every entry points into 1..NUM_FRAMES and no frame is referenced by
    /// more than one slot.
    fn check_tree(space: &AddressSpace) -> Result<()> {
        let mut referenced: HashSet<u64> = HashSet::new();
        let mut pending: Vec<(u64, u64)> = vec![(0, 0)];
        while let Some((frame, depth)) = pending.pop() {
            if depth == TABLES_DEPTH {
                continue;
            }
            for slot in 0..PAGE_SIZE {
                let entry: u64 = space.memory().read(frame * PAGE_SIZE + slot) as u64;
                if entry == 0 {
                    continue;
                }
                crate::ensure_eq!(entry < NUM_FRAMES, true);
                crate::ensure_eq!(referenced.insert(entry), true);
                pending.push((entry, depth + 1));
            }
        }
        Ok(())
    }

    /// Tests the page-index arithmetic on a hand-worked address.
    #[test]
    fn index_slices_cover_the_page_number() -> Result<()> {
        // Page 0b01101_00010_00111, top slice first.
        let page: u64 = (0b01101 << (2 * OFFSET_WIDTH)) | (0b00010 << OFFSET_WIDTH) | 0b00111;

        crate::ensure_eq!(index_at_depth(page, 0), 0b01101);
        crate::ensure_eq!(index_at_depth(page, 1), 0b00010);
        crate::ensure_eq!(index_at_depth(page, 2), 0b00111);
        Ok(())
    }

    /// Tests the distance metric, both arcs of the circle.
    #[test]
    fn cyclical_distance_takes_shorter_arc() -> Result<()> {
        crate::ensure_eq!(cyclical_distance(3, 10), 7);
        crate::ensure_eq!(cyclical_distance(10, 3), 7);
        crate::ensure_eq!(cyclical_distance(NUM_PAGES - 1, 0), 1);
        crate::ensure_eq!(cyclical_distance(0, NUM_PAGES - 1), 1);
        crate::ensure_eq!(cyclical_distance(42, 42), 0);
        Ok(())
    }

    /// Tests read-your-writes while the working set fits the frame pool:
    /// no eviction may occur.
    #[test]
    fn resident_pages_need_no_eviction() -> Result<()> {
        let mut space: AddressSpace = AddressSpace::new();
        space.initialize();

        // Pages 0 and 1 share every page-table level, so the whole working
        // set needs five of the six frames.
        space.write(0, 11).unwrap();
        space.write(PAGE_SIZE, 22).unwrap();

        crate::ensure_eq!(space.read(0).unwrap(), 11);
        crate::ensure_eq!(space.read(PAGE_SIZE).unwrap(), 22);
        crate::ensure_eq!(space.memory().evictions(), 0);
        check_tree(&space)
    }

    /// Tests if an out-of-range address fails without touching state.
    #[test]
    fn out_of_range_address_is_rejected() -> Result<()> {
        let mut space: AddressSpace = AddressSpace::new();
        space.initialize();

        space.write(1, 7).unwrap();
        let evictions_before: u64 = space.memory().evictions();

        crate::ensure_eq!(space.read(1 << VIRTUAL_ADDRESS_WIDTH).is_err(), true);
        crate::ensure_eq!(space.write(u64::MAX, 1).is_err(), true);

        crate::ensure_eq!(space.read(1).unwrap(), 7);
        crate::ensure_eq!(space.memory().evictions(), evictions_before);
        Ok(())
    }

    /// Tests the backing-store round trip: pages pushed out by pool
    /// pressure still read back their last written value.
    #[test]
    fn evicted_pages_round_trip() -> Result<()> {
        let mut space: AddressSpace = AddressSpace::new();
        space.initialize();

        space.write(0, 1).unwrap();
        space.write(1 << 14, 2).unwrap();

        // Distant pages, one per leaf subtree, to churn the pool.
        for step in 0..8 {
            let va: u64 = (100 + 7 * step) << OFFSET_WIDTH;
            space.write(va, step as i32).unwrap();
            check_tree(&space)?;
        }
        crate::ensure_eq!(space.memory().evictions() >= 2, true);

        crate::ensure_eq!(space.read(0).unwrap(), 1);
        crate::ensure_eq!(space.read(1 << 14).unwrap(), 2);
        check_tree(&space)
    }
}
