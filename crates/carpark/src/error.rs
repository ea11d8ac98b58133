//! Error types for the parking lot.

use thiserror::Error;

/// Invalid lot configuration. Detected before any thread is created.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("capacity must be a positive integer, got {0}")]
    ZeroCapacity(usize),

    #[error("at least one parker is required")]
    NoParkers,

    #[error("at least one picker is required")]
    NoPickers,

    #[error("pause range is inverted: min {min_ms}ms > max {max_ms}ms")]
    InvertedPacing { min_ms: u64, max_ms: u64 },

    #[error("monitor period must be non-zero")]
    ZeroPeriod,

    #[error("bounded runs need as many pickers as parkers (got {parkers} parkers, {pickers} pickers)")]
    UnbalancedBudget { parkers: usize, pickers: usize },
}

/// Errors returned by [`SlotPool`](crate::SlotPool) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    /// The pool was closed while waiting, or before the call.
    #[error("pool is closed")]
    Closed,

    /// A thread panicked while holding the pool lock.
    #[error("pool lock poisoned by a panicking thread")]
    Poisoned,
}

/// Top-level errors for building and running a lot.
#[derive(Debug, Error)]
pub enum LotError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Backing storage for the ring could not be reserved.
    #[error("failed to allocate storage for {capacity} slots")]
    Allocation { capacity: usize },

    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("thread '{name}' panicked")]
    WorkerPanicked { name: String },

    /// The monitor saw `produced != consumed + occupied`.
    #[error(
        "invariant violated: produced {produced} != consumed {consumed} + occupied {occupied}"
    )]
    InvariantViolation {
        produced: u64,
        consumed: u64,
        occupied: usize,
    },
}

impl LotError {
    pub fn spawn(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            name: name.into(),
            source,
        }
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }
}

pub type Result<T> = std::result::Result<T, LotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_into_lot_error() {
        let err: LotError = ConfigError::ZeroCapacity(0).into();
        assert!(matches!(err, LotError::Config(ConfigError::ZeroCapacity(0))));
        assert_eq!(
            err.to_string(),
            "invalid configuration: capacity must be a positive integer, got 0"
        );
    }

    #[test]
    fn invariant_violation_message_shows_both_sides() {
        let err = LotError::InvariantViolation {
            produced: 10,
            consumed: 4,
            occupied: 5,
        };
        assert!(err.is_invariant_violation());
        assert_eq!(
            err.to_string(),
            "invariant violated: produced 10 != consumed 4 + occupied 5"
        );
    }

    #[test]
    fn spawn_error_keeps_source() {
        let err = LotError::spawn("parker-0", std::io::Error::other("no threads left"));
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_invariant_violation());
    }
}
