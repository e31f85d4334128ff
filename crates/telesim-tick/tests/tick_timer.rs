//! Integration tests for the fixed-interval tick timer.
//!
//! Runs with `start_paused = true`: Tokio's clock only moves when every
//! task is idle (auto-advance) or when a test calls `time::advance`.

use std::time::Duration;

use telesim_tick::{TickConfig, TickPolicy, TickTimer};
use tokio::time::{self, Instant};

fn two_seconds(policy: TickPolicy) -> TickTimer {
    TickTimer::new(TickConfig {
        policy,
        ..TickConfig::with_interval(Duration::from_secs(2))
    })
}

// =========================================================================
// TickConfig
// =========================================================================

#[test]
fn test_default_interval_is_two_seconds() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.interval, Duration::from_secs(2));
    assert_eq!(cfg.policy, TickPolicy::Skip);
}

#[test]
fn test_validated_raises_tiny_interval() {
    let cfg = TickConfig::with_interval(Duration::from_millis(1)).validated();
    assert_eq!(cfg.interval, TickConfig::MIN_INTERVAL);
}

#[test]
fn test_validated_resets_bad_slow_ratio() {
    for ratio in [0.0, -0.5, 1.5, f64::NAN] {
        let cfg = TickConfig {
            slow_tick_ratio: ratio,
            ..TickConfig::default()
        }
        .validated();
        assert_eq!(cfg.slow_tick_ratio, 1.0);
    }
}

// =========================================================================
// Firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_first_tick_fires_after_one_interval() {
    let start = Instant::now();
    let mut timer = TickTimer::with_interval(Duration::from_secs(2));

    let fired = timer.tick().await;
    assert_eq!(fired.tick, 1);
    assert_eq!(fired.late_by, Duration::ZERO);
    assert_eq!(fired.skipped, 0);
    assert_eq!(start.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_ticks_are_numbered_and_evenly_spaced() {
    let start = Instant::now();
    let mut timer = TickTimer::with_interval(Duration::from_secs(2));

    for expected in 1..=3 {
        assert_eq!(timer.tick().await.tick, expected);
    }
    assert_eq!(start.elapsed(), Duration::from_secs(6));
    assert_eq!(timer.tick_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_wait_keeps_schedule() {
    let mut timer = TickTimer::with_interval(Duration::from_secs(2));
    let result = time::timeout(Duration::from_millis(1_900), timer.tick()).await;
    assert!(result.is_err());
    assert_eq!(timer.tick_count(), 0);

    let before = Instant::now();
    assert_eq!(timer.tick().await.tick, 1);
    assert_eq!(before.elapsed(), Duration::from_millis(100));
}

// =========================================================================
// Late ticks
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_skip_policy_reanchors_after_late_tick() {
    let mut timer = two_seconds(TickPolicy::Skip);

    timer.tick().await; // t = 2
    time::advance(Duration::from_secs(7)).await; // t = 9, deadline was 4

    let fired = timer.tick().await;
    assert_eq!(fired.late_by, Duration::from_secs(5));
    assert_eq!(fired.skipped, 2);

    let before = Instant::now();
    let fired = timer.tick().await;
    assert_eq!(fired.skipped, 0);
    assert_eq!(before.elapsed(), Duration::from_secs(2));
    assert_eq!(timer.stats().skipped, 2);
    assert_eq!(timer.stats().late, 1);
}

#[tokio::test(start_paused = true)]
async fn test_delay_policy_keeps_cadence() {
    let mut timer = two_seconds(TickPolicy::Delay);

    timer.tick().await; // t = 2
    time::advance(Duration::from_secs(7)).await; // t = 9

    let fired = timer.tick().await; // deadline 4
    assert_eq!(fired.skipped, 0);
    assert!(fired.late_by > Duration::ZERO);

    // Deadline 6 is already past, so it fires without the clock moving.
    let before = Instant::now();
    assert_eq!(timer.tick().await.tick, 3);
    assert_eq!(before.elapsed(), Duration::ZERO);
}

// =========================================================================
// Work tracking
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_finish_without_tick_is_noop() {
    let mut timer = TickTimer::with_interval(Duration::from_secs(2));
    timer.finish_tick();
    assert_eq!(timer.stats().last_work, Duration::ZERO);
    assert_eq!(timer.stats().slow, 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_work_is_counted() {
    let mut timer = TickTimer::with_interval(Duration::from_secs(2));

    timer.tick().await;
    time::advance(Duration::from_millis(300)).await;
    timer.finish_tick();
    assert_eq!(timer.stats().last_work, Duration::from_millis(300));
    assert_eq!(timer.stats().slow, 0);

    timer.tick().await;
    time::advance(Duration::from_millis(1_200)).await;
    timer.finish_tick();
    assert_eq!(timer.stats().slow, 1);
    assert_eq!(timer.stats().max_work, Duration::from_millis(1_200));
}
