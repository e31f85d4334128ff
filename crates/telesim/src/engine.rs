//! The engine handle shared by the scheduler and the request handlers.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use telesim_hub::BroadcastHub;
use telesim_session::SessionRegistry;
use telesim_store::Storage;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::generator::{Clock, PacketGenerator, PhaseSource, RandomPhase, SystemClock};
use crate::scheduler::Scheduler;
use crate::EngineConfig;

pub(crate) struct EngineInner<S: Storage> {
    pub(crate) storage: S,
    pub(crate) registry: SessionRegistry,
    pub(crate) hub: BroadcastHub,
    pub(crate) generator: PacketGenerator,
    pub(crate) config: EngineConfig,
    pub(crate) ticks: AtomicU64,
    pub(crate) started: Instant,
}

/// Session-scoped generation and broadcast engine.
///
/// Cheap to clone: every clone shares the same registry, hub and storage.
/// Lifecycle operations live in [`lifecycle`](crate::lifecycle); the
/// periodic generation loop is a [`Scheduler`].
pub struct Engine<S: Storage> {
    pub(crate) inner: Arc<EngineInner<S>>,
}

impl<S: Storage> Clone for Engine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Storage> Engine<S> {
    pub fn builder(storage: S) -> EngineBuilder<S> {
        EngineBuilder::new(storage)
    }

    pub fn storage(&self) -> &S {
        &self.inner.storage
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.inner.hub
    }

    pub fn generator(&self) -> &PacketGenerator {
        &self.inner.generator
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Ticks completed by this engine's scheduler.
    pub fn ticks(&self) -> u64 {
        self.inner.ticks.load(Ordering::Relaxed)
    }

    pub(crate) fn record_tick(&self) -> u64 {
        self.inner.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Spawns the scheduler loop. It runs until `cancel` fires, then stops
    /// generation for every session still registered.
    pub fn spawn_scheduler(&self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Scheduler::new(self.clone()).run(cancel))
    }
}

/// Builder for [`Engine`].
///
/// `build()` spawns the broadcast hub unless one was supplied, so it must
/// run inside a Tokio runtime.
pub struct EngineBuilder<S: Storage> {
    storage: S,
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    phase: Arc<dyn PhaseSource>,
    hub: Option<BroadcastHub>,
}

impl<S: Storage> EngineBuilder<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            config: EngineConfig::default(),
            clock: Arc::new(SystemClock),
            phase: Arc::new(RandomPhase),
            hub: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn phase_source(mut self, phase: Arc<dyn PhaseSource>) -> Self {
        self.phase = phase;
        self
    }

    /// Uses an existing hub instead of spawning a new one.
    pub fn hub(mut self, hub: BroadcastHub) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn build(self) -> Engine<S> {
        let hub = self
            .hub
            .unwrap_or_else(|| BroadcastHub::spawn(self.config.hub_channel_size));
        tracing::debug!(
            tick_ms = self.config.tick.interval.as_millis() as u64,
            max_backoff_ticks = self.config.max_backoff_ticks,
            "engine built"
        );
        Engine {
            inner: Arc::new(EngineInner {
                storage: self.storage,
                registry: SessionRegistry::new(),
                hub,
                generator: PacketGenerator::new(self.clock, self.phase),
                config: self.config,
                ticks: AtomicU64::new(0),
                started: Instant::now(),
            }),
        }
    }
}
