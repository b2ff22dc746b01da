// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The green-thread scheduler: thread table, ready FIFO, sleep bookkeeping,
//! free-id heap, and the context-switch engine. There is no scheduler loop;
//! switching is driven by the virtual-time signal and by explicit yields
//! from terminate, block, and sleep.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    collections::id_heap::IdHeap,
    pal::{
        linux,
        CONTEXT_RESUMED,
        CONTEXT_SAVED,
    },
    runtime::fail::{
        fatal_system_error,
        Fail,
    },
    uthread::{
        thread::{
            Thread,
            ThreadState,
        },
        ThreadEntryPoint,
        ThreadId,
        MAX_THREAD_NUM,
    },
};
use ::libc::c_int;
use ::std::{
    array,
    collections::VecDeque,
    ptr,
};

//======================================================================================================================
// Enumerations
//======================================================================================================================

/// Reason for a context switch. Decides what happens to the outgoing
/// thread: re-enqueued, left out of the FIFO, or unlinked for deletion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchIntent {
    /// Quantum expired; the outgoing thread goes to the FIFO tail.
    Preempt,
    /// The outgoing thread blocked or went to sleep.
    Block,
    /// The outgoing thread terminated itself.
    Terminate,
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Process-wide green-thread scheduler state. All access happens either
/// with the preemption signal masked or from the signal handler itself,
/// which runs only while the mask is not held.
pub struct Scheduler {
    /// Timer period, in microseconds.
    quantum_usecs: i64,
    /// Quanta elapsed since init, counting the initial thread's first.
    total_quantums: u32,
    /// Identifier of the one Running thread.
    running: ThreadId,
    /// Thread table, keyed by id.
    threads: [Option<Box<Thread>>; MAX_THREAD_NUM],
    /// Runnable, non-running threads in FIFO order. Pre-sized so the signal
    /// handler never grows it.
    ready: VecDeque<ThreadId>,
    /// Free identifiers, smallest first.
    free_ids: IdHeap,
    /// Record of a self-terminated thread whose stack was still live at
    /// switch time. Dropped at the next entry-point prologue, never from
    /// the signal handler.
    zombie: Option<Box<Thread>>,
}

//======================================================================================================================
// Static Variables
//======================================================================================================================

/// The one scheduler instance of this process. A plain static cell rather
/// than a checked cell: a thread that switches out mid-call would hold a
/// RefCell borrow across quanta and poison every later entry point.
static mut SCHEDULER: Option<Scheduler> = None;

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for the Scheduler
impl Scheduler {
    /// Creates scheduler state with the initial thread installed as Running
    /// and every other identifier free.
    pub fn new(quantum_usecs: i64) -> Self {
        let mut threads: [Option<Box<Thread>>; MAX_THREAD_NUM] = array::from_fn(|_| None);
        threads[0] = Some(Box::new(Thread::new_initial()));
        Self {
            quantum_usecs,
            total_quantums: 1,
            running: 0,
            threads,
            ready: VecDeque::with_capacity(MAX_THREAD_NUM),
            free_ids: IdHeap::new(1..MAX_THREAD_NUM as u32),
            zombie: None,
        }
    }

    /// Drops the parked record of a self-terminated thread, if any. Called
    /// at the head of every entry point, before the free-id heap is
    /// consulted, so a reused id never aliases a live stack.
    pub fn reap_zombie(&mut self) {
        if let Some(zombie) = self.zombie.take() {
            trace!("reap_zombie(): tid={:?}", zombie.id);
        }
    }

    /// Spawns a new thread on the smallest free identifier and enqueues it.
    pub fn spawn(
        &mut self,
        entry: ThreadEntryPoint,
        start: extern "C" fn(),
        on_exit: extern "C" fn(),
    ) -> Result<ThreadId, Fail> {
        let tid: ThreadId = match self.free_ids.alloc() {
            Some(tid) => tid,
            None => return Err(Fail::new(libc::EAGAIN, "spawn - maximum number of threads reached")),
        };
        self.threads[tid as usize] = Some(Box::new(Thread::new(tid, entry, start, on_exit)));
        self.ready.push_back(tid);
        trace!("spawn(): tid={:?}", tid);
        Ok(tid)
    }

    /// The user entry function of the running thread. Only spawned threads
    /// run the start shim that asks.
    pub fn running_entry(&self) -> ThreadEntryPoint {
        self.thread(self.running)
            .and_then(|thread| thread.entry)
            .expect("running thread has no entry function")
    }

    /// Terminates a non-initial thread. A Ready thread is unlinked from the
    /// FIFO and deleted; a Blocked thread is deleted in place; the Running
    /// thread is switched out and its record parked for deferred deletion,
    /// in which case this call does not return to it.
    pub fn terminate(&mut self, tid: ThreadId) -> Result<(), Fail> {
        let state: ThreadState = match self.thread(tid) {
            Some(thread) => thread.state,
            None => return Err(Fail::no_such_thread("terminate")),
        };
        trace!("terminate(): tid={:?} state={:?}", tid, state);

        match state {
            ThreadState::Running => {
                // The record and the id are reclaimed inside the switch.
                self.switch_threads(SwitchIntent::Terminate);
            },
            ThreadState::Ready => {
                self.unlink_ready(tid);
                self.threads[tid as usize] = None;
                self.free_ids.release(tid);
            },
            ThreadState::Blocked => {
                self.threads[tid as usize] = None;
                self.free_ids.release(tid);
            },
        }
        Ok(())
    }

    /// Blocks a thread. Blocking the running thread yields; blocking a
    /// Ready thread unlinks it from the FIFO. Idempotent for threads that
    /// are already blocked.
    pub fn block(&mut self, tid: ThreadId) -> Result<(), Fail> {
        if tid == 0 {
            return Err(Fail::invalid_argument("block", "cannot block the main thread"));
        }

        if tid == self.running {
            if let Some(thread) = self.thread_mut(tid) {
                thread.user_blocked = true;
            }
            self.switch_threads(SwitchIntent::Block);
            return Ok(());
        }

        let state: ThreadState = match self.thread(tid) {
            Some(thread) => thread.state,
            None => return Err(Fail::no_such_thread("block")),
        };
        if state == ThreadState::Ready {
            self.unlink_ready(tid);
        }
        let thread: &mut Thread = self.thread_mut(tid).expect("thread vanished while blocking");
        thread.state = ThreadState::Blocked;
        thread.user_blocked = true;
        Ok(())
    }

    /// Clears a thread's user-blocked flag, readying it if no sleep is
    /// pending. Resuming a Ready or Running thread has no effect.
    pub fn resume(&mut self, tid: ThreadId) -> Result<(), Fail> {
        let readied: bool = match self.thread_mut(tid) {
            Some(thread) => {
                thread.user_blocked = false;
                if thread.state == ThreadState::Blocked && thread.is_wakeable() {
                    thread.state = ThreadState::Ready;
                    true
                } else {
                    false
                }
            },
            None => return Err(Fail::no_such_thread("resume")),
        };
        if readied {
            self.ready.push_back(tid);
        }
        Ok(())
    }

    /// Puts the running thread to sleep for `num_quantums` quanta. Sleeping
    /// for zero quanta degenerates to a plain yield.
    pub fn sleep(&mut self, num_quantums: u32) -> Result<(), Fail> {
        if self.running == 0 {
            return Err(Fail::invalid_argument("sleep", "cannot sleep the main thread"));
        }

        let running: ThreadId = self.running;
        if let Some(thread) = self.thread_mut(running) {
            thread.sleep_quanta = num_quantums;
        }
        if num_quantums == 0 {
            self.switch_threads(SwitchIntent::Preempt);
        } else {
            self.switch_threads(SwitchIntent::Block);
        }
        Ok(())
    }

    /// Identifier of the running thread.
    pub fn running_tid(&self) -> ThreadId {
        self.running
    }

    /// Quanta elapsed since init.
    pub fn total_quantums(&self) -> u32 {
        self.total_quantums
    }

    /// Quanta consumed by the given thread.
    pub fn quantums(&self, tid: ThreadId) -> Result<u32, Fail> {
        match self.thread(tid) {
            Some(thread) => Ok(thread.quantums),
            None => Err(Fail::no_such_thread("get_quantums")),
        }
    }

    /// One timer tick: age every sleeper, then preempt the running thread.
    pub fn tick(&mut self) {
        self.wake_sleepers();
        self.switch_threads(SwitchIntent::Preempt);
    }

    /// Decrements every positive sleep counter. A sleeper whose counter
    /// reaches zero becomes Ready unless the user also blocked it, in which
    /// case only an explicit resume may ready it. Iteration in id order is
    /// the tie-breaker for threads waking on the same tick.
    fn wake_sleepers(&mut self) {
        for tid in 0..MAX_THREAD_NUM as ThreadId {
            let woke: bool = match self.thread_mut(tid) {
                Some(thread) if thread.sleep_quanta > 0 => {
                    thread.sleep_quanta -= 1;
                    if thread.is_wakeable() {
                        thread.state = ThreadState::Ready;
                        true
                    } else {
                        false
                    }
                },
                _ => false,
            };
            if woke {
                self.ready.push_back(tid);
            }
        }
    }

    /// The yield procedure. Saves the outgoing thread's context, disposes
    /// of it according to `intent`, and restores the FIFO head. Returns
    /// immediately on the second, post-restore return of the save.
    fn switch_threads(&mut self, intent: SwitchIntent) {
        let prev: ThreadId = self.running;
        let outcome: u64 = match self.thread_mut(prev) {
            Some(thread) => thread.context.save(),
            None => {
                debug_assert!(false, "running thread has no record");
                return;
            },
        };
        if outcome != CONTEXT_SAVED {
            // This thread was just switched back in.
            return;
        }

        match intent {
            SwitchIntent::Preempt => {
                if let Some(thread) = self.thread_mut(prev) {
                    thread.state = ThreadState::Ready;
                }
                self.ready.push_back(prev);
            },
            SwitchIntent::Block => {
                // The incoming thread gets a full quantum.
                self.rearm_timer();
                if let Some(thread) = self.thread_mut(prev) {
                    thread.state = ThreadState::Blocked;
                }
            },
            SwitchIntent::Terminate => {
                self.rearm_timer();
                // The dying stack is still in use: park the record in the
                // zombie slot (a box move relocates only the pointer) and
                // let the next entry-point prologue drop it.
                let record: Box<Thread> = self.threads[prev as usize].take().expect("terminating thread has no record");
                self.free_ids.release(prev);
                self.zombie = Some(record);
            },
        }

        let next: ThreadId = self.ready.pop_front().expect("ready queue is empty on switch");
        self.running = next;
        self.total_quantums += 1;
        let thread: &mut Thread = self.thread_mut(next).expect("chosen thread has no record");
        thread.quantums += 1;
        thread.state = ThreadState::Running;
        thread.context.restore(CONTEXT_RESUMED)
    }

    /// Removes a thread from the ready FIFO, if present.
    fn unlink_ready(&mut self, tid: ThreadId) {
        if let Some(index) = self.ready.iter().position(|&queued| queued == tid) {
            self.ready.remove(index);
        }
    }

    /// Restarts the timer period after a voluntary switch.
    fn rearm_timer(&mut self) {
        if let Err(fail) = linux::arm_virtual_timer(self.quantum_usecs) {
            fatal_system_error(&fail.cause);
        }
    }

    fn thread(&self, tid: ThreadId) -> Option<&Thread> {
        self.threads.get(tid as usize)?.as_deref()
    }

    fn thread_mut(&mut self, tid: ThreadId) -> Option<&mut Thread> {
        self.threads.get_mut(tid as usize)?.as_deref_mut()
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Returns the process-wide scheduler, if init has run.
///
/// # Safety
///
/// The caller must hold the preemption mask, or be the signal handler
/// itself (whose delivery blocks the signal). Handing out `&'static mut`
/// from a static is exactly as unguarded as it looks; the signal mask is
/// the lock.
pub unsafe fn try_instance() -> Option<&'static mut Scheduler> {
    (*ptr::addr_of_mut!(SCHEDULER)).as_mut()
}

/// Like [try_instance], failing with a library error when init never ran.
pub unsafe fn instance() -> Result<&'static mut Scheduler, Fail> {
    try_instance().ok_or_else(|| Fail::new(libc::EPERM, "uthreads - library is not initialized"))
}

/// Installs the process-wide scheduler. Called once, by init.
pub fn set_instance(scheduler: Scheduler) {
    unsafe { *ptr::addr_of_mut!(SCHEDULER) = Some(scheduler) };
}

/// Returns true if init already ran.
pub fn is_initialized() -> bool {
    unsafe { (*ptr::addr_of!(SCHEDULER)).is_some() }
}

/// Handler for the virtual-time signal. Runs with the signal masked by
/// delivery; entry points mask it around every other touch of scheduler
/// state. Nothing in this path allocates, frees, or takes an OS lock.
pub extern "C" fn preempt_signal_handler(_signum: c_int) {
    if let Some(scheduler) = unsafe { try_instance() } {
        scheduler.tick();
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

// Bookkeeping-only tests: nothing here installs the signal handler or the
// timer, and nothing switches contexts, so the scheduler under test is an
// ordinary local value. The switching paths are covered by the harness-less
// integration tests.
#[cfg(test)]
mod tests {
    use super::Scheduler;
    use crate::uthread::{
        thread::ThreadState,
        ThreadId,
        MAX_THREAD_NUM,
    };
    use ::anyhow::Result;

    extern "C" fn noop_entry() {}

    fn test_scheduler() -> Scheduler {
        Scheduler::new(100_000)
    }

    /// Tests the state init leaves behind: thread zero running with one
    /// quantum on the clock, which is also the process total.
    #[test]
    fn initial_thread_owns_first_quantum() -> Result<()> {
        let scheduler: Scheduler = test_scheduler();

        crate::ensure_eq!(scheduler.running_tid(), 0);
        crate::ensure_eq!(scheduler.total_quantums(), 1);
        crate::ensure_eq!(scheduler.quantums(0).unwrap(), 1);
        Ok(())
    }

    /// Tests if spawn hands out the smallest free identifiers in order.
    #[test]
    fn spawn_returns_smallest_free_id() -> Result<()> {
        let mut scheduler: Scheduler = test_scheduler();

        for expected in 1..4 {
            let tid: ThreadId = scheduler.spawn(noop_entry, noop_entry, noop_entry).unwrap();
            crate::ensure_eq!(tid, expected);
        }

        // Free the middle id; the next spawn must reuse it first.
        scheduler.terminate(2)?;
        crate::ensure_eq!(scheduler.spawn(noop_entry, noop_entry, noop_entry).unwrap(), 2);
        crate::ensure_eq!(scheduler.spawn(noop_entry, noop_entry, noop_entry).unwrap(), 4);
        Ok(())
    }

    /// Tests if the thread table rejects growth past its capacity with a
    /// library error and recovers after a terminate.
    #[test]
    fn spawn_fails_when_table_is_full() -> Result<()> {
        let mut scheduler: Scheduler = test_scheduler();

        for _ in 1..MAX_THREAD_NUM {
            scheduler.spawn(noop_entry, noop_entry, noop_entry)?;
        }
        crate::ensure_eq!(scheduler.spawn(noop_entry, noop_entry, noop_entry).is_err(), true);

        scheduler.terminate(7)?;
        crate::ensure_eq!(scheduler.spawn(noop_entry, noop_entry, noop_entry).unwrap(), 7);
        Ok(())
    }

    /// Tests if terminating a Ready thread unlinks it everywhere: unknown
    /// to lookups, id free again.
    #[test]
    fn terminate_ready_thread_round_trips() -> Result<()> {
        let mut scheduler: Scheduler = test_scheduler();

        let tid: ThreadId = scheduler.spawn(noop_entry, noop_entry, noop_entry)?;
        crate::ensure_eq!(scheduler.quantums(tid).unwrap(), 0);

        scheduler.terminate(tid)?;
        crate::ensure_eq!(scheduler.quantums(tid).is_err(), true);
        crate::ensure_eq!(scheduler.terminate(tid).is_err(), true);
        crate::ensure_eq!(scheduler.spawn(noop_entry, noop_entry, noop_entry).unwrap(), tid);
        Ok(())
    }

    /// Tests if blocking a Ready thread parks it and a resume re-enqueues
    /// it, while resuming an unblocked thread is a no-op.
    #[test]
    fn block_and_resume_ready_thread() -> Result<()> {
        let mut scheduler: Scheduler = test_scheduler();

        let first: ThreadId = scheduler.spawn(noop_entry, noop_entry, noop_entry)?;
        let second: ThreadId = scheduler.spawn(noop_entry, noop_entry, noop_entry)?;

        scheduler.block(first)?;
        crate::ensure_eq!(scheduler.thread(first).unwrap().state, ThreadState::Blocked);

        // Resume moves it behind the still-queued second thread.
        scheduler.resume(first)?;
        crate::ensure_eq!(scheduler.thread(first).unwrap().state, ThreadState::Ready);
        crate::ensure_eq!(scheduler.ready.iter().copied().collect::<Vec<_>>(), vec![second, first]);

        // Resuming again must not duplicate the FIFO entry.
        scheduler.resume(first)?;
        crate::ensure_eq!(scheduler.ready.iter().filter(|&&t| t == first).count(), 1);
        Ok(())
    }

    /// Tests if blocking the main thread is rejected.
    #[test]
    fn block_main_thread_is_rejected() -> Result<()> {
        let mut scheduler: Scheduler = test_scheduler();
        crate::ensure_eq!(scheduler.block(0).is_err(), true);
        Ok(())
    }

    /// Tests the sleep tick: counters age in id order, expiry readies a
    /// sleeper only if the user did not also block it.
    #[test]
    fn sleep_tick_honors_user_block() -> Result<()> {
        let mut scheduler: Scheduler = test_scheduler();

        let sleeper: ThreadId = scheduler.spawn(noop_entry, noop_entry, noop_entry)?;
        let blocked_sleeper: ThreadId = scheduler.spawn(noop_entry, noop_entry, noop_entry)?;

        // Simulate two threads that went to sleep two quanta ago, one of
        // which the user has additionally blocked.
        for tid in [sleeper, blocked_sleeper] {
            scheduler.unlink_ready(tid);
            let thread = scheduler.thread_mut(tid).unwrap();
            thread.state = ThreadState::Blocked;
            thread.sleep_quanta = 2;
        }
        scheduler.thread_mut(blocked_sleeper).unwrap().user_blocked = true;

        scheduler.wake_sleepers();
        crate::ensure_eq!(scheduler.ready.contains(&sleeper), false);

        scheduler.wake_sleepers();
        crate::ensure_eq!(scheduler.ready.contains(&sleeper), true);
        crate::ensure_eq!(scheduler.ready.contains(&blocked_sleeper), false);

        // The blocked sleeper needs the explicit resume.
        scheduler.resume(blocked_sleeper)?;
        crate::ensure_eq!(scheduler.ready.contains(&blocked_sleeper), true);
        Ok(())
    }

    /// Tests if resume before sleep expiry leaves the wake-up to the tick.
    #[test]
    fn resume_during_sleep_defers_to_tick() -> Result<()> {
        let mut scheduler: Scheduler = test_scheduler();

        let tid: ThreadId = scheduler.spawn(noop_entry, noop_entry, noop_entry)?;
        scheduler.unlink_ready(tid);
        {
            let thread = scheduler.thread_mut(tid).unwrap();
            thread.state = ThreadState::Blocked;
            thread.sleep_quanta = 1;
            thread.user_blocked = true;
        }

        // Resume clears the flag but must not ready a sleeping thread.
        scheduler.resume(tid)?;
        crate::ensure_eq!(scheduler.ready.contains(&tid), false);

        scheduler.wake_sleepers();
        crate::ensure_eq!(scheduler.ready.contains(&tid), true);
        Ok(())
    }
}
