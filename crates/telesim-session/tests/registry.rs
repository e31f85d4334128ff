//! Concurrency tests for the session registry.
//!
//! The scheduler and the request handlers hit the registry from different
//! tasks at once; these tests run the same mix on a multi-threaded runtime.

use std::collections::BTreeSet;
use std::sync::Arc;

use telesim_protocol::SessionId;
use telesim_session::SessionRegistry;

// =========================================================================
// Counter monotonicity
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_draws_same_session_have_no_gaps_or_duplicates() {
    let reg = Arc::new(SessionRegistry::new());
    let id = SessionId(1);
    reg.set_running(id);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let reg = Arc::clone(&reg);
        handles.push(tokio::spawn(async move {
            let mut drawn = Vec::with_capacity(250);
            for _ in 0..250 {
                drawn.push(reg.next_counter(id).expect("registered"));
                tokio::task::yield_now().await;
            }
            drawn
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        let drawn = handle.await.expect("task");
        // Each task sees its own draws strictly increasing.
        assert!(drawn.windows(2).all(|w| w[0] < w[1]));
        all.extend(drawn);
    }

    all.sort_unstable();
    let expected: Vec<u32> = (0..2000).collect();
    assert_eq!(all, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_sessions_keep_independent_sequences() {
    let reg = Arc::new(SessionRegistry::new());
    for n in 1..=4 {
        reg.set_running(SessionId(n));
    }

    let mut handles = Vec::new();
    for n in 1..=4u64 {
        let reg = Arc::clone(&reg);
        handles.push(tokio::spawn(async move {
            let mut drawn = Vec::new();
            for _ in 0..100 {
                drawn.push(reg.next_counter(SessionId(n)).expect("registered"));
                tokio::task::yield_now().await;
            }
            drawn
        }));
    }

    for handle in handles {
        let drawn = handle.await.expect("task");
        assert_eq!(drawn, (0..100).collect::<Vec<u32>>());
    }
}

// =========================================================================
// Snapshot consistency
// =========================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_snapshot_never_sees_stopped_or_misses_started() {
    let reg = Arc::new(SessionRegistry::new());

    // A permanently running session plus churn on others.
    let stable = SessionId(1000);
    reg.set_running(stable);

    let churn = {
        let reg = Arc::clone(&reg);
        tokio::spawn(async move {
            for round in 0..200u64 {
                let id = SessionId(round % 10);
                reg.set_running(id);
                tokio::task::yield_now().await;
                reg.stop(id);
            }
        })
    };

    for _ in 0..200 {
        let snap = reg.snapshot_running();
        assert!(snap.contains(&stable));
        tokio::task::yield_now().await;
    }
    churn.await.expect("churn task");

    // Sequential checks around the call boundary.
    let a = SessionId(1);
    let b = SessionId(2);
    reg.set_running(a);
    reg.set_running(b);
    reg.stop(a);
    let snap = reg.snapshot_running();
    assert_eq!(snap, BTreeSet::from([b, stable]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_during_draws_ends_sequence_cleanly() {
    let reg = Arc::new(SessionRegistry::new());
    let id = SessionId(7);
    reg.set_running(id);

    let drawer = {
        let reg = Arc::clone(&reg);
        tokio::spawn(async move {
            let mut drawn = Vec::new();
            while let Ok(n) = reg.next_counter(id) {
                drawn.push(n);
                tokio::task::yield_now().await;
            }
            drawn
        })
    };

    tokio::task::yield_now().await;
    assert!(reg.stop(id));
    let drawn = drawer.await.expect("drawer");

    let expected: Vec<u32> = (0..drawn.len() as u32).collect();
    assert_eq!(drawn, expected);
    assert!(!reg.is_running(id));

    // A restart picks up after the last value handed out.
    assert_eq!(reg.retained_counter(id), Some(drawn.len() as u32));
    reg.set_running(id);
    assert_eq!(reg.next_counter(id).unwrap(), drawn.len() as u32);
}
