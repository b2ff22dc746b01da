// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::sync::atomic::{
    AtomicU64,
    Ordering,
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// Bit position of the stage field.
const STAGE_SHIFT: u32 = 62;

/// Bit position of the total field.
const TOTAL_SHIFT: u32 = 31;

/// Mask of one 31-bit field.
const FIELD_MASK: u64 = (1 << 31) - 1;

//======================================================================================================================
// Enumerations
//======================================================================================================================

/// Stage of a MapReduce job, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Undefined = 0,
    Map = 1,
    Shuffle = 2,
    Reduce = 3,
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Observable state of a job: its stage and how far along it is.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JobState {
    pub stage: Stage,
    /// Completion of the stage, in [0, 100].
    pub percentage: f32,
}

/// Progress of a whole job packed into one atomic 64-bit word, layout
/// (stage:2 | total:31 | processed:31) from the most-significant end.
/// Packing the three fields together makes stage transitions and progress
/// reads single wait-free operations.
pub struct StageCounter(AtomicU64);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Stage Counters
impl StageCounter {
    /// Creates a counter reading Undefined with nothing to process.
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Enters `stage` with `total` items to process and none processed yet.
    pub fn begin(&self, stage: Stage, total: u64) {
        debug_assert!(total <= FIELD_MASK);
        self.0.store(((stage as u64) << STAGE_SHIFT) | ((total & FIELD_MASK) << TOTAL_SHIFT), Ordering::SeqCst);
    }

    /// Claims the next unprocessed item of the current stage. Returns its
    /// index, or None once the stage is exhausted. Claims past exhaustion
    /// leave the processed field past the total; readers clamp.
    pub fn claim(&self) -> Option<u64> {
        let old: u64 = self.0.fetch_add(1, Ordering::SeqCst);
        let processed: u64 = old & FIELD_MASK;
        let total: u64 = (old >> TOTAL_SHIFT) & FIELD_MASK;
        if processed < total {
            Some(processed)
        } else {
            None
        }
    }

    /// Credits `count` items as processed. Used by the shuffle walker,
    /// which moves whole key groups at a time.
    pub fn add_processed(&self, count: u64) {
        self.0.fetch_add(count, Ordering::SeqCst);
    }

    /// Decodes the packed word into (stage, total, processed).
    pub fn load(&self) -> (Stage, u64, u64) {
        let bits: u64 = self.0.load(Ordering::SeqCst);
        let stage: Stage = match bits >> STAGE_SHIFT {
            0 => Stage::Undefined,
            1 => Stage::Map,
            2 => Stage::Shuffle,
            _ => Stage::Reduce,
        };
        (stage, (bits >> TOTAL_SHIFT) & FIELD_MASK, bits & FIELD_MASK)
    }

    /// Snapshots the observable job state, clamping the processed count to
    /// the total.
    pub fn state(&self) -> JobState {
        let (stage, total, processed): (Stage, u64, u64) = self.load();
        let percentage: f32 = if total == 0 {
            0.0
        } else {
            100.0 * (processed.min(total) as f32) / (total as f32)
        };
        JobState { stage, percentage }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for StageCounter {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        Stage,
        StageCounter,
    };
    use ::anyhow::Result;

    /// Tests if begin and load round-trip all three fields.
    #[test]
    fn begin_load_round_trip() -> Result<()> {
        let counter: StageCounter = StageCounter::new();
        crate::ensure_eq!(counter.load(), (Stage::Undefined, 0, 0));

        counter.begin(Stage::Map, 1234);
        crate::ensure_eq!(counter.load(), (Stage::Map, 1234, 0));

        counter.begin(Stage::Reduce, (1 << 31) - 1);
        crate::ensure_eq!(counter.load(), (Stage::Reduce, (1 << 31) - 1, 0));
        Ok(())
    }

    /// Tests if claim hands out each index once and then refuses.
    #[test]
    fn claim_exhausts_exactly_total() -> Result<()> {
        let counter: StageCounter = StageCounter::new();
        counter.begin(Stage::Map, 3);

        crate::ensure_eq!(counter.claim(), Some(0));
        crate::ensure_eq!(counter.claim(), Some(1));
        crate::ensure_eq!(counter.claim(), Some(2));
        crate::ensure_eq!(counter.claim(), None);
        crate::ensure_eq!(counter.claim(), None);
        Ok(())
    }

    /// Tests if the observable state clamps claim overshoot to 100%.
    #[test]
    fn state_clamps_overshoot() -> Result<()> {
        let counter: StageCounter = StageCounter::new();
        counter.begin(Stage::Reduce, 2);

        for _ in 0..5 {
            counter.claim();
        }
        let state = counter.state();
        crate::ensure_eq!(state.stage, Stage::Reduce);
        crate::ensure_eq!(state.percentage, 100.0);
        Ok(())
    }

    /// Tests the zero-total edge: no claims succeed and progress reads 0%.
    #[test]
    fn empty_stage_yields_no_claims() -> Result<()> {
        let counter: StageCounter = StageCounter::new();
        counter.begin(Stage::Map, 0);

        crate::ensure_eq!(counter.claim(), None);
        crate::ensure_eq!(counter.state().percentage, 0.0);
        Ok(())
    }
}
