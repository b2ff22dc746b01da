// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Sleep scenario: a spawned thread sleeps three quanta and then spins a
//! little before terminating, so the main thread can watch its personal
//! quantum counter hold at one, move to two, and finally vanish.

//==============================================================================
// Imports
//==============================================================================

use ::uos::uthread;

//==============================================================================
// Constants
//==============================================================================

/// Timer period of this scenario, in microseconds.
const QUANTUM_USECS: i32 = 50_000;

/// Quanta the spawned thread sleeps for.
const SLEEP_QUANTA: u32 = 3;

/// Upper bound on the quanta any wait loop below may take; a breach means
/// the scheduler lost the thread.
const PATIENCE: u32 = 200;

//==============================================================================
// Standalone Functions
//==============================================================================

/// Entry of the sleeper: sleep, then stay alive two more quanta so the
/// main thread can observe the post-wake counter, then self-terminate.
extern "C" fn sleeper() {
    uthread::sleep(SLEEP_QUANTA).expect("sleep failed");

    let woke_at: u32 = uthread::get_total_quantums().expect("library is up");
    while uthread::get_total_quantums().expect("library is up") < woke_at + 2 {
        std::hint::spin_loop();
    }

    let tid: u32 = uthread::get_tid().expect("library is up");
    uthread::terminate(tid).expect("self-terminate returned");
}

fn total() -> u32 {
    uthread::get_total_quantums().expect("library is up")
}

fn main() {
    uthread::init(QUANTUM_USECS).expect("init failed");
    assert_eq!(uthread::spawn(sleeper).expect("spawn failed"), 1);

    // Wait for the sleeper's first quantum.
    let deadline: u32 = total() + PATIENCE;
    while uthread::get_quantums(1).expect("sleeper is live") == 0 {
        assert!(total() < deadline, "sleeper never scheduled");
    }
    assert_eq!(uthread::get_quantums(1).expect("sleeper is live"), 1);

    // It sleeps SLEEP_QUANTA quanta: its counter must hold at one for at
    // least that many ticks.
    let slept_at: u32 = total();
    loop {
        match uthread::get_quantums(1) {
            Ok(1) => assert!(total() < slept_at + PATIENCE, "sleeper never woke"),
            Ok(quantums) => {
                assert_eq!(quantums, 2);
                break;
            },
            Err(_) => panic!("sleeper vanished while asleep"),
        }
    }
    assert!(total() - slept_at >= SLEEP_QUANTA, "sleeper ran before its sleep expired");

    // Shortly after waking it terminates itself and is gone.
    let woke_at: u32 = total();
    while uthread::get_quantums(1).is_ok() {
        assert!(total() < woke_at + PATIENCE, "sleeper never terminated");
    }

    uthread::terminate(0).expect("terminate of the main thread returned");
    unreachable!();
}
