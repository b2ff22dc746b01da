// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! A bounded MapReduce engine. A job runs a client's `map` and `reduce`
//! over N OS worker threads in four stages, Map, Sort, Shuffle (one worker),
//! and Reduce, with overall progress packed into one atomic stage counter
//! for wait-free observation.

//======================================================================================================================
// Exports
//======================================================================================================================

mod client;
mod semaphore;
mod stage;
mod worker;

pub use client::{
    IntermediateEmitter,
    MapReduceClient,
    OutputEmitter,
};
pub use stage::{
    JobState,
    Stage,
};

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    mapred::{
        semaphore::Semaphore,
        stage::StageCounter,
    },
    runtime::{
        fail::Fail,
        logging,
    },
};
use ::std::{
    collections::VecDeque,
    mem,
    sync::{
        atomic::AtomicBool,
        Arc,
        Barrier,
        Mutex,
    },
    thread,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// State shared by every worker of one job.
pub(crate) struct JobRuntime<C: MapReduceClient> {
    /// The client's map and reduce functions.
    pub client: C,
    /// Immutable input records.
    pub input: Vec<(C::InputKey, C::InputValue)>,
    /// Output records, appended under this mutex by emit calls from reduce.
    pub output: Mutex<Vec<(C::OutputKey, C::OutputValue)>>,
    /// One intermediate vector per worker. Owned by its worker through map
    /// and sort, by the shuffle winner afterwards.
    pub intermediates: Vec<Mutex<Vec<(C::IntermediateKey, C::IntermediateValue)>>>,
    /// Key groups produced by the shuffle, consumed under this mutex
    /// during reduce.
    pub shuffle_queue: Mutex<VecDeque<Vec<(C::IntermediateKey, C::IntermediateValue)>>>,
    /// Packed (stage, total, processed) progress word.
    pub stage: StageCounter,
    /// Shuffle-assignment flag; the one worker whose compare-and-set wins
    /// runs the shuffle.
    pub shuffle_claimed: AtomicBool,
    /// Post-sort rendezvous of all workers.
    pub barrier: Barrier,
    /// Parks the shuffle losers until the winner finishes; released as a
    /// chain.
    pub shuffle_sem: Semaphore,
}

/// Handle to a running MapReduce job.
pub struct Job<C: MapReduceClient> {
    runtime: Arc<JobRuntime<C>>,
    workers: Vec<thread::JoinHandle<()>>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Jobs
impl<C: MapReduceClient> Job<C> {
    /// Snapshots the job's stage and completion percentage. Wait-free; may
    /// be called while the job runs.
    pub fn state(&self) -> JobState {
        self.runtime.stage.state()
    }

    /// Blocks until every worker has finished. Idempotent.
    pub fn wait(&mut self) {
        for worker in self.workers.drain(..) {
            worker.join().expect("worker thread panicked");
        }
    }

    /// Waits for the job and hands back its output vector.
    pub fn into_output(mut self) -> Vec<(C::OutputKey, C::OutputValue)> {
        self.wait();
        match Arc::try_unwrap(self.runtime) {
            Ok(runtime) => runtime.output.into_inner().expect("output vector poisoned"),
            // A leaked clone keeps the runtime alive; take the records out.
            Err(runtime) => mem::take(&mut *runtime.output.lock().expect("output vector poisoned")),
        }
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Starts a MapReduce job over `input` with `num_workers` worker threads
/// and returns its handle. The job begins in the Map stage immediately.
pub fn start_map_reduce_job<C: MapReduceClient>(
    client: C,
    input: Vec<(C::InputKey, C::InputValue)>,
    num_workers: usize,
) -> Result<Job<C>, Fail> {
    logging::initialize();
    trace!("start_map_reduce_job(): records={:?} workers={:?}", input.len(), num_workers);

    if num_workers == 0 {
        return Err(Fail::invalid_argument("startMapReduceJob", "need at least one worker"));
    }

    let total_records: u64 = input.len() as u64;
    let runtime: Arc<JobRuntime<C>> = Arc::new(JobRuntime {
        client,
        input,
        output: Mutex::new(Vec::new()),
        intermediates: (0..num_workers).map(|_| Mutex::new(Vec::new())).collect(),
        shuffle_queue: Mutex::new(VecDeque::new()),
        stage: StageCounter::new(),
        shuffle_claimed: AtomicBool::new(false),
        barrier: Barrier::new(num_workers),
        shuffle_sem: Semaphore::new(0),
    });
    runtime.stage.begin(Stage::Map, total_records);

    let mut workers: Vec<thread::JoinHandle<()>> = Vec::with_capacity(num_workers);
    for worker_id in 0..num_workers {
        let runtime: Arc<JobRuntime<C>> = runtime.clone();
        let handle: thread::JoinHandle<()> = thread::Builder::new()
            .name(format!("mapred-worker-{}", worker_id))
            .spawn(move || worker::worker_main(runtime, worker_id))
            .map_err(|_| Fail::new(libc::EAGAIN, "startMapReduceJob - failed to spawn a worker thread"))?;
        workers.push(handle);
    }

    Ok(Job { runtime, workers })
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::{
        start_map_reduce_job,
        IntermediateEmitter,
        Job,
        MapReduceClient,
        OutputEmitter,
        Stage,
    };
    use ::anyhow::Result;

    /// Character counting: every occurrence of a character in any input
    /// string becomes an intermediate pair, reduce sums them.
    struct CharCount;

    impl MapReduceClient for CharCount {
        type InputKey = ();
        type InputValue = String;
        type IntermediateKey = char;
        type IntermediateValue = u64;
        type OutputKey = char;
        type OutputValue = u64;

        fn map(&self, _key: &(), value: &String, emitter: &IntermediateEmitter<'_, Self>) {
            for character in value.chars() {
                emitter.emit(character, 1);
            }
        }

        fn reduce(&self, group: Vec<(char, u64)>, emitter: &OutputEmitter<'_, Self>) {
            let key: char = group[0].0;
            let count: u64 = group.iter().map(|(_, count)| count).sum();
            emitter.emit(key, count);
        }
    }

    fn run_char_count(num_workers: usize) -> Result<()> {
        let input: Vec<((), String)> = ["aab", "bca", "c"]
            .iter()
            .map(|record| ((), record.to_string()))
            .collect();

        let job: Job<CharCount> = start_map_reduce_job(CharCount, input, num_workers).unwrap();
        let mut output: Vec<(char, u64)> = job.into_output();
        output.sort();

        crate::ensure_eq!(output, vec![('a', 3), ('b', 2), ('c', 2)]);
        Ok(())
    }

    /// Tests the whole pipeline with a single worker, which also runs the
    /// shuffle itself.
    #[test]
    fn char_count_single_worker() -> Result<()> {
        run_char_count(1)
    }

    /// Tests the pipeline with more workers than records.
    #[test]
    fn char_count_more_workers_than_records() -> Result<()> {
        run_char_count(8)
    }

    /// Tests if a finished job reports the Reduce stage fully processed.
    #[test]
    fn finished_job_reads_reduce_at_100() -> Result<()> {
        let input: Vec<((), String)> = vec![((), "xyz".to_string())];
        let mut job: Job<CharCount> = start_map_reduce_job(CharCount, input, 2).unwrap();
        job.wait();

        let state = job.state();
        crate::ensure_eq!(state.stage, Stage::Reduce);
        crate::ensure_eq!(state.percentage, 100.0);
        Ok(())
    }

    /// Tests if a zero-worker job is rejected.
    #[test]
    fn zero_workers_is_rejected() -> Result<()> {
        crate::ensure_eq!(start_map_reduce_job(CharCount, Vec::new(), 0).is_err(), true);
        Ok(())
    }
}
