// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::sync::Mutex;

//======================================================================================================================
// Traits
//======================================================================================================================

/// The client side of a MapReduce job: the key-value types of every stage
/// and the two user functions. `map` runs concurrently on all workers, each
/// emitting into its own intermediate vector; `reduce` receives one whole
/// key group at a time.
pub trait MapReduceClient: Send + Sync + 'static {
    type InputKey: Send + Sync + 'static;
    type InputValue: Send + Sync + 'static;
    type IntermediateKey: Ord + Clone + Send + 'static;
    type IntermediateValue: Send + 'static;
    type OutputKey: Send + 'static;
    type OutputValue: Send + 'static;

    /// Processes one input record, emitting intermediate pairs.
    fn map(&self, key: &Self::InputKey, value: &Self::InputValue, emitter: &IntermediateEmitter<'_, Self>);

    /// Processes one group of intermediate pairs sharing a key, emitting
    /// output pairs.
    fn reduce(
        &self,
        group: Vec<(Self::IntermediateKey, Self::IntermediateValue)>,
        emitter: &OutputEmitter<'_, Self>,
    );
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Emit target handed to `map`: the calling worker's own intermediate
/// vector. The mutex is uncontended during the map stage; it exists so the
/// shuffle worker may later take the vectors over.
pub struct IntermediateEmitter<'a, C: MapReduceClient + ?Sized> {
    vec: &'a Mutex<Vec<(C::IntermediateKey, C::IntermediateValue)>>,
}

/// Emit target handed to `reduce`: the job's shared output vector.
pub struct OutputEmitter<'a, C: MapReduceClient + ?Sized> {
    output: &'a Mutex<Vec<(C::OutputKey, C::OutputValue)>>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<'a, C: MapReduceClient + ?Sized> IntermediateEmitter<'a, C> {
    pub(crate) fn new(vec: &'a Mutex<Vec<(C::IntermediateKey, C::IntermediateValue)>>) -> Self {
        Self { vec }
    }

    /// Appends one intermediate pair to the worker's vector.
    pub fn emit(&self, key: C::IntermediateKey, value: C::IntermediateValue) {
        self.vec.lock().expect("intermediate vector poisoned").push((key, value));
    }
}

impl<'a, C: MapReduceClient + ?Sized> OutputEmitter<'a, C> {
    pub(crate) fn new(output: &'a Mutex<Vec<(C::OutputKey, C::OutputValue)>>) -> Self {
        Self { output }
    }

    /// Appends one output pair to the job's output vector.
    pub fn emit(&self, key: C::OutputKey, value: C::OutputValue) {
        self.output.lock().expect("output vector poisoned").push((key, value));
    }
}
