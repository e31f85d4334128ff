//! Engine configuration.

use std::time::Duration;

use telesim_hub::DEFAULT_CHANNEL_SIZE;
use telesim_session::NamePolicy;
use telesim_tick::TickConfig;

/// Settings for an [`Engine`](crate::Engine).
///
/// Start from `EngineConfig::default()` and override what you need:
///
/// ```rust
/// use std::time::Duration;
/// use telesim::EngineConfig;
///
/// let config = EngineConfig::default()
///     .with_tick_interval(Duration::from_millis(500))
///     .with_max_backoff_ticks(8);
/// assert_eq!(config.tick.interval, Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Scheduler timing. Default interval: 2 s.
    pub tick: TickConfig,
    /// How session names are defaulted and validated.
    pub names: NamePolicy,
    /// Upper bound, in ticks, on the retry delay for a session whose
    /// storage calls keep failing. Default: 16.
    pub max_backoff_ticks: u32,
    /// Capacity of the hub's command queue.
    pub hub_channel_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick: TickConfig::default(),
            names: NamePolicy::default(),
            max_backoff_ticks: 16,
            hub_channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}

impl EngineConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick.interval = interval;
        self
    }

    pub fn with_tick_config(mut self, tick: TickConfig) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_default_session_name(mut self, name: impl Into<String>) -> Self {
        self.names.default_name = name.into();
        self
    }

    pub fn with_max_backoff_ticks(mut self, ticks: u32) -> Self {
        self.max_backoff_ticks = ticks.max(1);
        self
    }

    pub fn with_hub_channel_size(mut self, size: usize) -> Self {
        self.hub_channel_size = size;
        self
    }
}
