//! Packet generation: one framed sample per session per tick.
//!
//! Time and randomness come from injected sources so tests can pin both.

use std::f64::consts::TAU;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use telesim_protocol::{Packet, SessionId};
use telesim_session::{SessionError, SessionRegistry};

/// Wall-clock source.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Source of the phase angle a payload is derived from.
pub trait PhaseSource: Send + Sync + 'static {
    /// An angle in `[0, 2π)`.
    fn phase(&self) -> f64;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: chrono::TimeDelta) {
        *self.now.lock() += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Uniform phase from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPhase;

impl PhaseSource for RandomPhase {
    fn phase(&self) -> f64 {
        rand::rng().random_range(0.0..TAU)
    }
}

/// Always returns the same phase.
#[derive(Debug, Clone, Copy)]
pub struct FixedPhase(pub f64);

impl PhaseSource for FixedPhase {
    fn phase(&self) -> f64 {
        self.0
    }
}

/// Fractional Unix seconds, microsecond resolution.
pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// Builds framed packets.
///
/// Each packet is an independent draw: `payload = sin(phase)` for a fresh
/// phase, so consecutive payloads do not form a continuous waveform.
#[derive(Clone)]
pub struct PacketGenerator {
    clock: Arc<dyn Clock>,
    phase: Arc<dyn PhaseSource>,
}

impl Default for PacketGenerator {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock), Arc::new(RandomPhase))
    }
}

impl PacketGenerator {
    pub fn new(clock: Arc<dyn Clock>, phase: Arc<dyn PhaseSource>) -> Self {
        Self { clock, phase }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Frames the next packet for `session_id`, drawing its counter from
    /// `registry`.
    ///
    /// # Errors
    /// Whatever [`SessionRegistry::next_counter`] returns: the session is
    /// no longer registered, or its counter is exhausted.
    pub fn generate(
        &self,
        registry: &SessionRegistry,
        session_id: SessionId,
    ) -> Result<Packet, SessionError> {
        let timestamp = unix_seconds(self.clock.now());
        let payload = self.phase.phase().sin();
        let counter = registry.next_counter(session_id)?;
        Ok(Packet::frame(session_id, counter, payload, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use chrono::TimeZone;

    use super::*;

    fn generator_at(secs: i64, phase: f64) -> PacketGenerator {
        let clock = ManualClock::new(Utc.timestamp_opt(secs, 0).unwrap());
        PacketGenerator::new(Arc::new(clock), Arc::new(FixedPhase(phase)))
    }

    #[test]
    fn test_generate_frames_packet() {
        let registry = SessionRegistry::new();
        registry.set_running(SessionId(1));
        let generator = generator_at(1_700_000_000, FRAC_PI_2);

        let packet = generator.generate(&registry, SessionId(1)).unwrap();
        assert_eq!(packet.counter, 0);
        assert_eq!(packet.payload, 1.0);
        assert_eq!(packet.timestamp, 1_700_000_000.0);
        assert!(packet.id.is_none());
        assert!(packet.verify());
    }

    #[test]
    fn test_generate_advances_counter() {
        let registry = SessionRegistry::new();
        registry.set_running(SessionId(1));
        let generator = generator_at(0, 0.0);

        let counters: Vec<u32> = (0..3)
            .map(|_| generator.generate(&registry, SessionId(1)).unwrap().counter)
            .collect();
        assert_eq!(counters, [0, 1, 2]);
    }

    #[test]
    fn test_generate_unregistered_session() {
        let registry = SessionRegistry::new();
        let generator = generator_at(0, 0.0);
        assert!(matches!(
            generator.generate(&registry, SessionId(9)),
            Err(SessionError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_random_phase_payload_in_range() {
        let registry = SessionRegistry::new();
        registry.set_running(SessionId(1));
        let generator = PacketGenerator::default();
        for _ in 0..500 {
            let packet = generator.generate(&registry, SessionId(1)).unwrap();
            assert!((-1.0..=1.0).contains(&packet.payload));
        }
    }

    #[test]
    fn test_unix_seconds_keeps_microseconds() {
        let at = Utc.timestamp_opt(1_748_275_967, 250_000_000).unwrap();
        assert_eq!(unix_seconds(at), 1_748_275_967.25);
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(Utc.timestamp_opt(10, 0).unwrap());
        clock.advance(chrono::TimeDelta::seconds(2));
        assert_eq!(clock.now().timestamp(), 12);
    }
}
