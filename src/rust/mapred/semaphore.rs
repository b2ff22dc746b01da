// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::sync::{
    Condvar,
    Mutex,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Counting semaphore on top of the host mutex and condition variable; the
/// standard library offers none. Used for the shuffle hand-off, where the
/// winner posts once and every waking worker re-posts for the next.
pub struct Semaphore {
    permits: Mutex<u32>,
    available: Condvar,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Semaphores
impl Semaphore {
    /// Creates a semaphore holding `permits` permits.
    pub fn new(permits: u32) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Releases one permit and wakes one waiter.
    pub fn post(&self) {
        let mut permits = self.permits.lock().expect("semaphore mutex poisoned");
        *permits += 1;
        self.available.notify_one();
    }

    /// Blocks until a permit is available, then takes it.
    pub fn wait(&self) {
        let mut permits = self.permits.lock().expect("semaphore mutex poisoned");
        while *permits == 0 {
            permits = self.available.wait(permits).expect("semaphore mutex poisoned");
        }
        *permits -= 1;
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

#[cfg(test)]
mod tests {
    use super::Semaphore;
    use ::anyhow::Result;
    use ::std::{
        sync::Arc,
        thread,
    };

    /// Tests if pre-posted permits are consumed without blocking.
    #[test]
    fn wait_consumes_posted_permits() -> Result<()> {
        let semaphore: Semaphore = Semaphore::new(2);

        semaphore.wait();
        semaphore.wait();
        semaphore.post();
        semaphore.wait();
        Ok(())
    }

    /// Tests the chain release: one initial post lets every waiter through
    /// as long as each re-posts after waking.
    #[test]
    fn chain_release_frees_all_waiters() -> Result<()> {
        const WAITERS: usize = 4;
        let semaphore: Arc<Semaphore> = Arc::new(Semaphore::new(0));

        let mut waiters: Vec<thread::JoinHandle<()>> = Vec::with_capacity(WAITERS);
        for _ in 0..WAITERS {
            let semaphore: Arc<Semaphore> = semaphore.clone();
            waiters.push(thread::spawn(move || {
                semaphore.wait();
                semaphore.post();
            }));
        }

        semaphore.post();
        for waiter in waiters {
            waiter.join().expect("waiter panicked");
        }

        // The chain leaves exactly one permit behind.
        semaphore.wait();
        Ok(())
    }
}
