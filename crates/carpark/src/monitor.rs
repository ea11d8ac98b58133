//! Consistency monitor.
//!
//! Periodically snapshots the pool and checks that every car ever parked is
//! either still parked or was picked up: `produced == consumed + occupied`.
//! A violation means the locking discipline is broken, so the monitor reports
//! it, halts the lot and exits with [`LotError::InvariantViolation`].

use std::fmt;
use std::sync::{Arc, mpsc};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::barrier::StartBarrier;
use crate::error::LotError;
use crate::pool::{PoolSnapshot, SlotPool};
use crate::shutdown::Shutdown;

/// One periodic check: both sides of the invariant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub sequence: u64,
    pub capacity: usize,
    pub produced: u64,
    pub consumed: u64,
    pub occupied: usize,
}

impl ConsistencyReport {
    pub fn from_snapshot(sequence: u64, snapshot: &PoolSnapshot) -> Self {
        Self {
            sequence,
            capacity: snapshot.capacity,
            produced: snapshot.produced,
            consumed: snapshot.consumed,
            occupied: snapshot.occupied,
        }
    }

    /// Left-hand side: cars ever parked.
    pub fn lhs(&self) -> u64 {
        self.produced
    }

    /// Right-hand side: cars ever picked plus cars currently parked.
    pub fn rhs(&self) -> u64 {
        self.consumed + self.occupied as u64
    }

    pub fn holds(&self) -> bool {
        self.lhs() == self.rhs() && self.occupied <= self.capacity
    }

    pub fn verify(&self) -> Result<(), LotError> {
        if self.holds() {
            Ok(())
        } else {
            Err(LotError::InvariantViolation {
                produced: self.produced,
                consumed: self.consumed,
                occupied: self.occupied,
            })
        }
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cars in: {}, cars out + parked: {} ({} + {}) [{}]",
            self.lhs(),
            self.rhs(),
            self.consumed,
            self.occupied,
            if self.holds() { "consistent" } else { "VIOLATED" }
        )
    }
}

/// Destination for periodic reports.
pub trait ReportSink: Send + 'static {
    fn publish(&mut self, report: &ConsistencyReport);
}

/// Logs every report through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn publish(&mut self, report: &ConsistencyReport) {
        if report.holds() {
            tracing::info!(
                sequence = report.sequence,
                produced = report.lhs(),
                consumed_plus_occupied = report.rhs(),
                occupied = report.occupied,
                capacity = report.capacity,
                "{report}"
            );
        } else {
            tracing::error!(
                sequence = report.sequence,
                produced = report.lhs(),
                consumed_plus_occupied = report.rhs(),
                occupied = report.occupied,
                capacity = report.capacity,
                "{report}"
            );
        }
    }
}

impl ReportSink for mpsc::Sender<ConsistencyReport> {
    fn publish(&mut self, report: &ConsistencyReport) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.send(*report);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub reports: u64,
}

pub struct ConsistencyMonitor<S> {
    pool: Arc<SlotPool>,
    shutdown: Arc<Shutdown>,
    period: Duration,
    sink: S,
    reports: u64,
}

impl<S: ReportSink> ConsistencyMonitor<S> {
    pub fn new(pool: Arc<SlotPool>, shutdown: Arc<Shutdown>, period: Duration, sink: S) -> Self {
        Self {
            pool,
            shutdown,
            period,
            sink,
            reports: 0,
        }
    }

    /// Take one snapshot, publish it, and verify it.
    pub fn check(&mut self) -> Result<ConsistencyReport, LotError> {
        let report = ConsistencyReport::from_snapshot(self.reports, &self.pool.snapshot());
        self.reports += 1;
        self.sink.publish(&report);
        report.verify()?;
        Ok(report)
    }

    /// Wait at `barrier`, then check every `period` until shutdown.
    pub fn run(mut self, barrier: &StartBarrier) -> Result<MonitorStats, LotError> {
        if barrier.wait().is_err() {
            return Ok(self.stats());
        }
        tracing::debug!(period = ?self.period, "Consistency monitor started");

        while self.shutdown.sleep(self.period) {
            if let Err(e) = self.check() {
                tracing::error!(error = %e, "Consistency check failed - halting lot");
                self.shutdown.trigger();
                self.pool.close();
                return Err(e);
            }
        }

        tracing::debug!(reports = self.reports, "Consistency monitor stopped");
        Ok(self.stats())
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            reports: self.reports,
        }
    }
}
