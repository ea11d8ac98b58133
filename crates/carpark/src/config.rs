//! Lot configuration.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Parkers and pickers started when not overridden.
pub const DEFAULT_WORKERS: usize = 3;

/// Upper bound of the random pause before each attempt.
pub const DEFAULT_MAX_PAUSE_MS: u64 = 1_000;

/// Interval between consistency reports.
pub const DEFAULT_MONITOR_PERIOD: Duration = Duration::from_secs(2);

/// Random pause a worker takes before each fill or take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            min_ms: 0,
            max_ms: DEFAULT_MAX_PAUSE_MS,
        }
    }
}

impl Pacing {
    /// No pause at all. Used by bounded runs and tests.
    pub const fn immediate() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }

    pub const fn between(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn is_immediate(&self) -> bool {
        self.max_ms == 0
    }

    /// Draw a pause uniformly from `[min_ms, max_ms]`.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        if self.min_ms >= self.max_ms {
            return Duration::from_millis(self.max_ms);
        }
        Duration::from_millis(rng.random_range(self.min_ms..=self.max_ms))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_ms > self.max_ms {
            return Err(ConfigError::InvertedPacing {
                min_ms: self.min_ms,
                max_ms: self.max_ms,
            });
        }
        Ok(())
    }
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_monitor_period_ms() -> Option<u64> {
    Some(DEFAULT_MONITOR_PERIOD.as_millis() as u64)
}

/// Everything needed to start a [`Lot`](crate::Lot).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotConfig {
    /// Number of parking spaces.
    pub capacity: usize,
    #[serde(default = "default_workers")]
    pub parkers: usize,
    #[serde(default = "default_workers")]
    pub pickers: usize,
    #[serde(default)]
    pub pacing: Pacing,
    /// `None` runs without a consistency monitor.
    #[serde(default = "default_monitor_period_ms")]
    pub monitor_period_ms: Option<u64>,
    /// Fills (or takes) each worker performs before stopping on its own.
    /// `None` runs until shutdown.
    #[serde(default)]
    pub ops_per_worker: Option<u64>,
}

impl LotConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            parkers: DEFAULT_WORKERS,
            pickers: DEFAULT_WORKERS,
            pacing: Pacing::default(),
            monitor_period_ms: default_monitor_period_ms(),
            ops_per_worker: None,
        }
    }

    pub fn with_parkers(mut self, parkers: usize) -> Self {
        self.parkers = parkers;
        self
    }

    pub fn with_pickers(mut self, pickers: usize) -> Self {
        self.pickers = pickers;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_monitor_period(mut self, period: Duration) -> Self {
        self.monitor_period_ms = Some(period.as_millis() as u64);
        self
    }

    pub fn without_monitor(mut self) -> Self {
        self.monitor_period_ms = None;
        self
    }

    pub fn with_ops_per_worker(mut self, ops: u64) -> Self {
        self.ops_per_worker = Some(ops);
        self
    }

    pub fn monitor_period(&self) -> Option<Duration> {
        self.monitor_period_ms.map(Duration::from_millis)
    }

    /// Threads that must meet at the start barrier: every worker plus the monitor.
    pub fn thread_count(&self) -> usize {
        self.parkers + self.pickers + usize::from(self.monitor_period_ms.is_some())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity(self.capacity));
        }
        if self.parkers == 0 {
            return Err(ConfigError::NoParkers);
        }
        if self.pickers == 0 {
            return Err(ConfigError::NoPickers);
        }
        if self.monitor_period_ms == Some(0) {
            return Err(ConfigError::ZeroPeriod);
        }
        // A bounded run only drains when both sides do the same total work.
        if self.ops_per_worker.is_some() && self.parkers != self.pickers {
            return Err(ConfigError::UnbalancedBudget {
                parkers: self.parkers,
                pickers: self.pickers,
            });
        }
        self.pacing.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_run() {
        let config = LotConfig::new(8);
        assert_eq!(config.parkers, 3);
        assert_eq!(config.pickers, 3);
        assert_eq!(config.monitor_period(), Some(Duration::from_secs(2)));
        assert_eq!(config.pacing, Pacing::between(0, 1_000));
        assert_eq!(config.thread_count(), 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn thread_count_excludes_disabled_monitor() {
        let config = LotConfig::new(1)
            .with_parkers(1)
            .with_pickers(2)
            .without_monitor();
        assert_eq!(config.thread_count(), 3);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert_eq!(
            LotConfig::new(0).validate(),
            Err(ConfigError::ZeroCapacity(0))
        );
        assert_eq!(
            LotConfig::new(1).with_parkers(0).validate(),
            Err(ConfigError::NoParkers)
        );
        assert_eq!(
            LotConfig::new(1).with_pickers(0).validate(),
            Err(ConfigError::NoPickers)
        );
        assert_eq!(
            LotConfig::new(1)
                .with_monitor_period(Duration::ZERO)
                .validate(),
            Err(ConfigError::ZeroPeriod)
        );
        assert_eq!(
            LotConfig::new(1).with_pacing(Pacing::between(5, 1)).validate(),
            Err(ConfigError::InvertedPacing { min_ms: 5, max_ms: 1 })
        );
        assert_eq!(
            LotConfig::new(1)
                .with_parkers(2)
                .with_ops_per_worker(10)
                .validate(),
            Err(ConfigError::UnbalancedBudget {
                parkers: 2,
                pickers: 3
            })
        );
    }

    #[test]
    fn pacing_draw_stays_in_range() {
        let pacing = Pacing::between(10, 20);
        let mut rng = rand::rng();
        for _ in 0..100 {
            let pause = pacing.draw(&mut rng);
            assert!(pause >= Duration::from_millis(10));
            assert!(pause <= Duration::from_millis(20));
        }
        assert_eq!(Pacing::immediate().draw(&mut rng), Duration::ZERO);
        assert!(Pacing::immediate().is_immediate());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: LotConfig = serde_json::from_str(r#"{"capacity": 4}"#).unwrap();
        assert_eq!(config, LotConfig::new(4));

        let config: LotConfig =
            serde_json::from_str(r#"{"capacity": 4, "monitor_period_ms": null}"#).unwrap();
        assert_eq!(config.monitor_period(), None);
    }

    #[test]
    fn serializes_effective_config() {
        let config = LotConfig::new(5)
            .with_pacing(Pacing::between(0, 250))
            .with_ops_per_worker(100);
        insta::assert_json_snapshot!(config, @r###"
        {
          "capacity": 5,
          "parkers": 3,
          "pickers": 3,
          "pacing": {
            "min_ms": 0,
            "max_ms": 250
          },
          "monitor_period_ms": 2000,
          "ops_per_worker": 100
        }
        "###);
    }
}
