//! Fixed-interval tick timer for Telesim.
//!
//! Drives the generation loop: one tick every `interval` (2 s by default).
//! Late wake-ups are handled according to a [`TickPolicy`], and the time
//! spent working inside each tick is tracked in [`TickStats`].
//!
//! # Integration
//!
//! The timer sits inside the scheduler's `tokio::select!` loop next to a
//! cancellation branch:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         _ = cancel.cancelled() => break,
//!         fired = timer.tick() => {
//!             generate_for_running_sessions(fired.tick).await;
//!             timer.finish_tick();
//!         }
//!     }
//! }
//! ```
//!
//! A tick with nothing to do still consumes its interval; the timer never
//! fires early to make up for idle ticks.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to do when a tick fires late.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Re-anchor the schedule at the late wake-up and count the missed
    /// ticks as skipped.
    #[default]
    Skip,
    /// Keep the original cadence. The next deadline is the previous one
    /// plus the interval, even if that is already in the past.
    Delay,
}

/// Configuration for [`TickTimer`].
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. Default: 2 s.
    pub interval: Duration,
    pub policy: TickPolicy,
    /// Share of the interval a tick's work may take before it is logged
    /// as slow. Default: 0.5.
    pub slow_tick_ratio: f64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            policy: TickPolicy::default(),
            slow_tick_ratio: 0.5,
        }
    }
}

impl TickConfig {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

    /// Shortest interval accepted; anything below is raised to this.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Raises the interval to [`Self::MIN_INTERVAL`] and keeps
    /// `slow_tick_ratio` within `(0.0, 1.0]`.
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                requested_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "tick interval too short, using minimum"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        if !(self.slow_tick_ratio > 0.0 && self.slow_tick_ratio <= 1.0) {
            self.slow_tick_ratio = 1.0;
        }
        self
    }

    fn slow_threshold(&self) -> Duration {
        self.interval.mul_f64(self.slow_tick_ratio)
    }
}

// ---------------------------------------------------------------------------
// Fired ticks and stats
// ---------------------------------------------------------------------------

/// A tick that just fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTick {
    /// Tick number, starting at 1.
    pub tick: u64,
    /// How far past its deadline the tick fired.
    pub late_by: Duration,
    /// Whole intervals dropped to catch up (`Skip` policy only).
    pub skipped: u64,
}

impl FiredTick {
    /// Fired more than a tenth of an interval late.
    pub fn is_late(&self, interval: Duration) -> bool {
        self.late_by > interval / 10
    }
}

/// Counters kept across the life of a [`TickTimer`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickStats {
    pub fired: u64,
    pub late: u64,
    pub skipped: u64,
    /// Ticks whose work went past the slow threshold.
    pub slow: u64,
    pub last_work: Duration,
    pub max_work: Duration,
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// Fixed-interval tick timer. One per scheduler loop.
pub struct TickTimer {
    config: TickConfig,
    deadline: Instant,
    /// Start of the tick currently being worked on.
    working_since: Option<Instant>,
    stats: TickStats,
}

impl TickTimer {
    /// Creates a timer whose first tick fires one interval from now.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        debug!(
            interval_ms = config.interval.as_millis() as u64,
            policy = ?config.policy,
            "tick timer ready"
        );
        Self {
            deadline: Instant::now() + config.interval,
            config,
            working_since: None,
            stats: TickStats::default(),
        }
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self::new(TickConfig::with_interval(interval))
    }

    /// Waits for the next tick.
    ///
    /// Cancel-safe: the deadline only moves once the sleep completes, so a
    /// dropped `tick()` future leaves the schedule as it was.
    pub async fn tick(&mut self) -> FiredTick {
        time::sleep_until(self.deadline).await;

        let now = Instant::now();
        let interval = self.config.interval;
        let late_by = now.saturating_duration_since(self.deadline);
        self.stats.fired += 1;
        self.working_since = Some(now);

        let mut fired = FiredTick {
            tick: self.stats.fired,
            late_by,
            skipped: 0,
        };
        let late = fired.is_late(interval);
        if late {
            self.stats.late += 1;
        }

        self.deadline = match self.config.policy {
            TickPolicy::Skip => {
                if late {
                    fired.skipped = (late_by.as_nanos() / interval.as_nanos()) as u64;
                    self.stats.skipped += fired.skipped;
                    warn!(
                        tick = fired.tick,
                        skipped = fired.skipped,
                        late_ms = late_by.as_millis() as u64,
                        "tick fired late, re-anchoring"
                    );
                }
                now + interval
            }
            TickPolicy::Delay => {
                if late {
                    warn!(
                        tick = fired.tick,
                        late_ms = late_by.as_millis() as u64,
                        "tick fired late, catching up"
                    );
                }
                self.deadline + interval
            }
        };

        trace!(tick = fired.tick, late, "tick");
        fired
    }

    /// Marks the current tick's work as done and records how long it took.
    /// Does nothing if no tick is in progress.
    pub fn finish_tick(&mut self) {
        let Some(since) = self.working_since.take() else {
            return;
        };
        let work = since.elapsed();
        self.stats.last_work = work;
        self.stats.max_work = self.stats.max_work.max(work);

        if work >= self.config.slow_threshold() {
            self.stats.slow += 1;
            warn!(
                tick = self.stats.fired,
                work_ms = work.as_millis() as u64,
                interval_ms = self.config.interval.as_millis() as u64,
                "slow tick"
            );
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.stats.fired
    }

    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }
}
