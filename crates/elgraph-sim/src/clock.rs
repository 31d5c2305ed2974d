use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

/// Ranges from which per-replica clocks are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Base timestamp in milliseconds.
    pub base_millis: i64,
    /// Wall time that passes per simulation round.
    pub tick_millis: i64,
    /// Maximum absolute drift in parts-per-million.
    pub max_abs_drift_ppm: i32,
    /// Maximum absolute constant offset in milliseconds.
    pub max_abs_skew_millis: i64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            base_millis: 1_700_000_000_000,
            tick_millis: 100,
            max_abs_drift_ppm: 100,
            max_abs_skew_millis: 25,
        }
    }
}

/// Clock parameters assigned to one replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockSpec {
    pub base_millis: i64,
    pub tick_millis: i64,
    pub drift_ppm: i32,
    pub skew_millis: i64,
}

impl ClockSpec {
    /// Draw drift and skew for one replica within `config`'s bounds.
    pub fn assign(config: &ClockConfig, rng: &mut DeterministicRng) -> Self {
        let drift = rng.next_signed(i64::from(config.max_abs_drift_ppm));
        Self {
            base_millis: config.base_millis,
            tick_millis: config.tick_millis,
            drift_ppm: i32::try_from(drift).unwrap_or(0),
            skew_millis: rng.next_signed(config.max_abs_skew_millis),
        }
    }
}

/// Wall clock with drift, skew, and freeze controls.
///
/// This is the wall time a replica *believes* it is. Replicas never issue a
/// stamp behind one they already issued, so a frozen or skewed reading only
/// shifts where their stamps land relative to other replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedClock {
    spec: ClockSpec,
    frozen_at: Option<i64>,
}

impl SimulatedClock {
    #[must_use]
    pub const fn new(spec: ClockSpec) -> Self {
        Self {
            spec,
            frozen_at: None,
        }
    }

    #[must_use]
    pub const fn spec(&self) -> ClockSpec {
        self.spec
    }

    /// Wall time in milliseconds at `round`.
    #[must_use]
    pub fn now_millis(&self, round: u64) -> i64 {
        if let Some(frozen) = self.frozen_at {
            return frozen;
        }

        let round_i64 = i64::try_from(round).unwrap_or(i64::MAX);
        let progress = self.spec.tick_millis.saturating_mul(round_i64);
        let drift = progress
            .saturating_mul(i64::from(self.spec.drift_ppm))
            .saturating_div(1_000_000);

        self.spec
            .base_millis
            .saturating_add(self.spec.skew_millis)
            .saturating_add(progress)
            .saturating_add(drift)
    }

    /// Wall time at `round` as a UTC instant. Out-of-range readings clamp to
    /// the Unix epoch.
    #[must_use]
    pub fn now(&self, round: u64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_millis(round)).unwrap_or_default()
    }

    /// Stop the clock at its reading for `round`.
    pub fn freeze(&mut self, round: u64) {
        self.frozen_at = Some(self.now_millis(round));
    }

    pub const fn unfreeze(&mut self) {
        self.frozen_at = None;
    }

    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.frozen_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(drift_ppm: i32, skew_millis: i64) -> ClockSpec {
        ClockSpec {
            base_millis: 1_000_000,
            tick_millis: 100,
            drift_ppm,
            skew_millis,
        }
    }

    #[test]
    fn advances_by_tick() {
        let clock = SimulatedClock::new(spec(0, 0));
        assert_eq!(clock.now_millis(0), 1_000_000);
        assert_eq!(clock.now_millis(10), 1_001_000);
    }

    #[test]
    fn skew_and_drift_apply() {
        let clock = SimulatedClock::new(spec(100_000, -50));
        // 10 rounds * 100ms = 1000ms progress, +10% drift, -50ms skew.
        assert_eq!(clock.now_millis(10), 1_000_000 - 50 + 1_000 + 100);
    }

    #[test]
    fn freeze_holds_reading() {
        let mut clock = SimulatedClock::new(spec(0, 0));
        clock.freeze(3);
        assert!(clock.is_frozen());
        assert_eq!(clock.now_millis(50), 1_000_300);
        clock.unfreeze();
        assert_eq!(clock.now_millis(50), 1_005_000);
    }

    #[test]
    fn now_converts_to_utc() {
        let clock = SimulatedClock::new(spec(0, 0));
        assert_eq!(clock.now(0).timestamp_millis(), 1_000_000);
    }

    #[test]
    fn assigned_specs_respect_bounds() {
        let config = ClockConfig::default();
        let mut rng = DeterministicRng::new(11);
        for _ in 0..100 {
            let spec = ClockSpec::assign(&config, &mut rng);
            assert!(spec.drift_ppm.abs() <= config.max_abs_drift_ppm);
            assert!(spec.skew_millis.abs() <= config.max_abs_skew_millis);
            assert_eq!(spec.tick_millis, config.tick_millis);
        }
    }
}
