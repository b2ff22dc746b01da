// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The worker loop: Map, local sort, barrier, single-worker Shuffle, and
//! Reduce. Workers pace themselves through the packed stage counter; the
//! only inter-worker hand-offs are the barrier after sorting and the
//! semaphore chain out of the shuffle.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::mapred::{
    client::{
        IntermediateEmitter,
        MapReduceClient,
        OutputEmitter,
    },
    stage::Stage,
    JobRuntime,
};
use ::std::sync::{
    atomic::Ordering,
    Arc,
    MutexGuard,
};

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Body of one worker thread.
pub fn worker_main<C: MapReduceClient>(job: Arc<JobRuntime<C>>, worker_id: usize) {
    trace!("worker_main(): worker_id={:?} starting", worker_id);

    // Map: claim input records until the stage is exhausted.
    let emitter: IntermediateEmitter<'_, C> = IntermediateEmitter::new(&job.intermediates[worker_id]);
    while let Some(index) = job.stage.claim() {
        let (key, value) = &job.input[index as usize];
        job.client.map(key, value, &emitter);
    }

    // Sort the worker's own intermediate vector by key.
    {
        let mut vec = job.intermediates[worker_id].lock().expect("intermediate vector poisoned");
        vec.sort_by(|left, right| left.0.cmp(&right.0));
    }

    // All workers synchronize, then exactly one wins the shuffle.
    job.barrier.wait();
    if job
        .shuffle_claimed
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
    {
        trace!("worker_main(): worker_id={:?} shuffling", worker_id);
        shuffle(&job);
        job.shuffle_sem.post();
    } else {
        // Chain release: each waking worker frees the next.
        job.shuffle_sem.wait();
        job.shuffle_sem.post();
    }

    // Reduce: claim key groups until the stage is exhausted.
    let emitter: OutputEmitter<'_, C> = OutputEmitter::new(&job.output);
    while job.stage.claim().is_some() {
        let group = job.shuffle_queue.lock().expect("shuffle queue poisoned").pop_front();
        if let Some(group) = group {
            job.client.reduce(group, &emitter);
        }
    }

    trace!("worker_main(): worker_id={:?} done", worker_id);
}

/// The shuffle, run by the single winning worker while everyone else is
/// parked on the semaphore. Repeatedly pops every occurrence of the maximal
/// back-element key across all sorted intermediate vectors into one group.
fn shuffle<C: MapReduceClient>(job: &JobRuntime<C>) {
    let mut vecs: Vec<MutexGuard<'_, Vec<(C::IntermediateKey, C::IntermediateValue)>>> = job
        .intermediates
        .iter()
        .map(|vec| vec.lock().expect("intermediate vector poisoned"))
        .collect();

    let total_pairs: u64 = vecs.iter().map(|vec| vec.len() as u64).sum();
    job.stage.begin(Stage::Shuffle, total_pairs);

    let mut queue = job.shuffle_queue.lock().expect("shuffle queue poisoned");
    loop {
        // The vectors are sorted ascending, so each back element is its
        // vector's maximum.
        let mut max_key: Option<C::IntermediateKey> = None;
        for vec in vecs.iter() {
            if let Some((key, _)) = vec.last() {
                let replace: bool = match &max_key {
                    Some(best) => key > best,
                    None => true,
                };
                if replace {
                    max_key = Some(key.clone());
                }
            }
        }
        let max_key: C::IntermediateKey = match max_key {
            Some(key) => key,
            None => break,
        };

        let mut group: Vec<(C::IntermediateKey, C::IntermediateValue)> = Vec::new();
        for vec in vecs.iter_mut() {
            while matches!(vec.last(), Some((key, _)) if *key == max_key) {
                group.push(vec.pop().expect("non-empty vector has a back element"));
            }
        }
        job.stage.add_processed(group.len() as u64);
        queue.push_back(group);
    }

    let total_groups: u64 = queue.len() as u64;
    drop(queue);
    drop(vecs);
    job.stage.begin(Stage::Reduce, total_groups);
}
