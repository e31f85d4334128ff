//! The generation loop.
//!
//! Every tick the scheduler snapshots the running sessions and, for each
//! one, pings storage, generates a packet, appends it, and publishes it
//! to the session's group. Sessions run concurrently within a tick and
//! are all awaited before the next one, so one session's packets are
//! always written and published in counter order.
//!
//! A failing session never affects the others. Transient storage
//! failures put the session on an exponential backoff measured in ticks:
//!
//! ```text
//! consecutive failures k:   1   2   3   4   5 ...
//! next attempt after:       1   2   4   8  16 (capped by max_backoff_ticks)
//! ```
//!
//! Other storage errors are logged and retried on the next tick, except a
//! session whose record is gone from storage, which stops generating.

use std::collections::HashMap;

use futures_util::future::join_all;
use telesim_protocol::{Packet, SessionId, TelemetryEvent};
use telesim_session::SessionError;
use telesim_store::{Storage, StorageError};
use telesim_tick::TickTimer;
use tokio_util::sync::CancellationToken;

use crate::{Engine, TelesimError};

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Packets persisted (and handed to the hub).
    pub generated: usize,
    /// Sessions whose step failed this tick.
    pub failed: usize,
    /// Sessions skipped because they are backing off.
    pub deferred: usize,
}

#[derive(Debug, Clone, Copy)]
struct Backoff {
    failures: u32,
    retry_at: u64,
}

enum StepOutcome {
    Published(Packet),
    /// The session left the registry between snapshot and counter draw.
    Vanished,
}

/// Periodic generation loop over an [`Engine`].
pub struct Scheduler<S: Storage> {
    engine: Engine<S>,
    backoff: HashMap<SessionId, Backoff>,
    tick: u64,
}

impl<S: Storage> Scheduler<S> {
    pub fn new(engine: Engine<S>) -> Self {
        Self {
            engine,
            backoff: HashMap::new(),
            tick: 0,
        }
    }

    /// Runs ticks until `cancel` fires, then stops generation for every
    /// session still registered so their end times are written.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut timer = TickTimer::new(self.engine.config().tick.clone());
        tracing::info!(
            interval_ms = timer.interval().as_millis() as u64,
            "scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                fired = timer.tick() => {
                    let report = self.run_tick().await;
                    timer.finish_tick();
                    if report.generated + report.failed + report.deferred > 0 {
                        tracing::debug!(
                            tick = fired.tick,
                            generated = report.generated,
                            failed = report.failed,
                            deferred = report.deferred,
                            "tick complete"
                        );
                    }
                }
            }
        }

        let stopped = self.shutdown().await;
        tracing::info!(
            ticks = self.tick,
            stopped_sessions = stopped,
            "scheduler stopped"
        );
    }

    /// Runs one generation pass over the running sessions.
    pub async fn run_tick(&mut self) -> TickReport {
        self.tick = self.engine.record_tick();
        let tick = self.tick;
        let running = self.engine.registry().snapshot_running();

        self.backoff.retain(|id, _| running.contains(id));

        let mut report = TickReport {
            tick,
            ..TickReport::default()
        };
        let mut due = Vec::with_capacity(running.len());
        for session_id in running {
            match self.backoff.get(&session_id) {
                Some(b) if b.retry_at > tick => report.deferred += 1,
                _ => due.push(session_id),
            }
        }

        let engine = &self.engine;
        let results = join_all(
            due.iter()
                .map(|&session_id| async move { (session_id, step(engine, session_id).await) }),
        )
        .await;

        for (session_id, result) in results {
            match result {
                Ok(StepOutcome::Published(packet)) => {
                    report.generated += 1;
                    if self.backoff.remove(&session_id).is_some() {
                        tracing::info!(%session_id, counter = packet.counter, "storage recovered");
                    }
                }
                Ok(StepOutcome::Vanished) => {}
                Err(TelesimError::Storage(StorageError::SessionNotFound(_))) => {
                    report.failed += 1;
                    self.retire(session_id).await;
                }
                Err(TelesimError::Storage(e)) if e.is_transient() => {
                    report.failed += 1;
                    self.record_failure(session_id, tick, &e.to_string());
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(%session_id, tick, error = %e, "packet generation failed");
                }
            }
        }

        report
    }

    /// Stops generation for every registered session. Returns how many
    /// were stopped.
    pub async fn shutdown(&mut self) -> usize {
        let mut stopped = 0;
        for session_id in self.engine.registry().ids() {
            match self.engine.stop_generation(session_id).await {
                Ok(true) => stopped += 1,
                Ok(false) => {}
                Err(e) => {
                    stopped += 1;
                    tracing::error!(%session_id, error = %e, "end time not written during shutdown");
                }
            }
        }
        self.backoff.clear();
        stopped
    }

    /// Takes a session whose record has vanished from storage out of
    /// generation for good and tells its group.
    async fn retire(&mut self, session_id: SessionId) {
        self.backoff.remove(&session_id);
        if !self.engine.registry().forget(session_id) {
            return;
        }
        tracing::warn!(%session_id, "session missing from storage, generation stopped");
        if let Err(e) = self
            .engine
            .hub()
            .publish(TelemetryEvent::GenerationStopped { session_id })
            .await
        {
            tracing::warn!(%session_id, error = %e, "could not publish stop notification");
        }
    }

    fn record_failure(&mut self, session_id: SessionId, tick: u64, error: &str) {
        let max = u64::from(self.engine.config().max_backoff_ticks.max(1));
        let entry = self.backoff.entry(session_id).or_insert(Backoff {
            failures: 0,
            retry_at: tick,
        });
        entry.failures = entry.failures.saturating_add(1);
        let delay = 1u64
            .checked_shl(entry.failures - 1)
            .unwrap_or(u64::MAX)
            .min(max);
        entry.retry_at = tick + delay;
        tracing::error!(
            %session_id,
            tick,
            failures = entry.failures,
            retry_at = entry.retry_at,
            %error,
            "storage failure, packet dropped"
        );
    }
}

/// One session's share of a tick: ping, generate, append, publish.
///
/// A failed ping returns before a counter is drawn. A failed append
/// drops the packet; its counter value stays consumed.
async fn step<S: Storage>(
    engine: &Engine<S>,
    session_id: SessionId,
) -> Result<StepOutcome, TelesimError> {
    engine.storage().ping().await?;

    let packet = match engine.generator().generate(engine.registry(), session_id) {
        Ok(packet) => packet,
        Err(SessionError::NotRegistered(_)) => return Ok(StepOutcome::Vanished),
        Err(e) => return Err(e.into()),
    };

    let stored = engine.storage().append_packet(packet).await?;
    tracing::trace!(
        %session_id,
        counter = stored.counter,
        crc16 = stored.crc16,
        "packet stored"
    );

    if let Err(e) = engine
        .hub()
        .publish(TelemetryEvent::NewPacket {
            packet: stored.clone(),
        })
        .await
    {
        tracing::warn!(%session_id, counter = stored.counter, error = %e, "packet not broadcast");
    }
    Ok(StepOutcome::Published(stored))
}
