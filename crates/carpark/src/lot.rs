//! Lot driver: builds the pool, spawns parkers, pickers and the monitor, and
//! collects their results.
//!
//! All threads meet at one [`StartBarrier`] sized from the config, so nobody
//! parks or picks a car before the whole population exists. A lot runs until
//! [`LotHandle::shutdown`] is called, or, for bounded configs, until every
//! worker has spent its operation budget.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde::Serialize;

use crate::barrier::StartBarrier;
use crate::config::LotConfig;
use crate::error::{LotError, Result};
use crate::monitor::{ConsistencyMonitor, MonitorStats, ReportSink, TracingSink};
use crate::pool::{PoolSnapshot, SlotPool};
use crate::shutdown::Shutdown;
use crate::worker::{Role, WorkerContext, WorkerStats, run_worker};

/// Final state of a joined lot.
#[derive(Debug, Clone, Serialize)]
pub struct LotSummary {
    pub pool: PoolSnapshot,
    pub workers: Vec<WorkerStats>,
    pub reports: u64,
}

impl LotSummary {
    pub fn operations(&self, role: Role) -> u64 {
        self.workers
            .iter()
            .filter(|w| w.role == role)
            .map(|w| w.operations)
            .sum()
    }
}

/// Cloneable handle for stopping a running lot from another thread.
#[derive(Debug, Clone)]
pub struct LotHandle {
    pool: Arc<SlotPool>,
    shutdown: Arc<Shutdown>,
}

impl LotHandle {
    /// Stop every thread: interrupt pauses, wake blocked waiters, stop the monitor.
    pub fn shutdown(&self) {
        if self.shutdown.trigger() {
            tracing::info!("Shutting down lot");
        }
        self.pool.close();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_triggered()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }
}

type MonitorHandle = JoinHandle<Result<MonitorStats>>;

/// A running lot.
pub struct Lot {
    config: LotConfig,
    handle: LotHandle,
    barrier: Arc<StartBarrier>,
    workers: Vec<(String, JoinHandle<WorkerStats>)>,
    monitor: Option<MonitorHandle>,
}

impl Lot {
    /// Start a lot that logs consistency reports through `tracing`.
    pub fn start(config: LotConfig) -> Result<Self> {
        Self::start_with_sink(config, TracingSink)
    }

    /// Start a lot publishing consistency reports to `sink`.
    ///
    /// Configuration and allocation errors are returned before any thread
    /// exists. If a later spawn fails, the threads already started are
    /// released from the barrier and joined before the error is returned.
    pub fn start_with_sink<S: ReportSink>(config: LotConfig, sink: S) -> Result<Self> {
        config.validate()?;
        let pool = Arc::new(SlotPool::new(config.capacity)?);
        let shutdown = Arc::new(Shutdown::new());
        let barrier = Arc::new(StartBarrier::new(config.thread_count()));

        tracing::info!(
            capacity = config.capacity,
            parkers = config.parkers,
            pickers = config.pickers,
            threads = config.thread_count(),
            "Starting lot"
        );

        let mut lot = Self {
            handle: LotHandle { pool, shutdown },
            barrier,
            workers: Vec::with_capacity(config.parkers + config.pickers),
            monitor: None,
            config,
        };

        if let Err(e) = lot.spawn_all(sink) {
            tracing::error!(error = %e, "Failed to start lot - releasing spawned threads");
            lot.barrier.abort();
            lot.handle.shutdown();
            lot.join_spawned();
            return Err(e);
        }

        Ok(lot)
    }

    fn spawn_all<S: ReportSink>(&mut self, sink: S) -> Result<()> {
        // Interleave parkers and pickers: parker-0, picker-0, parker-1, ...
        let rounds = self.config.parkers.max(self.config.pickers);
        for index in 0..rounds {
            if index < self.config.parkers {
                self.spawn_worker(Role::Parker, index)?;
            }
            if index < self.config.pickers {
                self.spawn_worker(Role::Picker, index)?;
            }
        }

        if let Some(period) = self.config.monitor_period() {
            let monitor = ConsistencyMonitor::new(
                Arc::clone(&self.handle.pool),
                Arc::clone(&self.handle.shutdown),
                period,
                sink,
            );
            let barrier = Arc::clone(&self.barrier);
            let handle = thread::Builder::new()
                .name("monitor".to_string())
                .spawn(move || monitor.run(&barrier))
                .map_err(|e| LotError::spawn("monitor", e))?;
            self.monitor = Some(handle);
        }

        Ok(())
    }

    fn spawn_worker(&mut self, role: Role, index: usize) -> Result<()> {
        let name = role.thread_name(index);
        let ctx = WorkerContext {
            role,
            index,
            pool: Arc::clone(&self.handle.pool),
            barrier: Arc::clone(&self.barrier),
            shutdown: Arc::clone(&self.handle.shutdown),
            pacing: self.config.pacing,
            budget: self.config.ops_per_worker,
        };
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(ctx))
            .map_err(|e| LotError::spawn(name.clone(), e))?;
        self.workers.push((name, handle));
        Ok(())
    }

    fn join_spawned(&mut self) {
        for (name, handle) in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!(thread = %name, "Thread panicked during aborted start");
            }
        }
        if let Some(handle) = self.monitor.take() {
            let _ = handle.join();
        }
    }

    pub fn handle(&self) -> LotHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &LotConfig {
        &self.config
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        self.handle.snapshot()
    }

    /// Wait for every worker, then stop and join the monitor.
    ///
    /// Blocks until the workers stop: either their budgets run out or some
    /// [`LotHandle`] shuts the lot down. An invariant violation reported by
    /// the monitor takes precedence over other errors.
    pub fn join(mut self) -> Result<LotSummary> {
        let mut workers = Vec::with_capacity(self.workers.len());
        let mut failure: Option<LotError> = None;

        for (name, handle) in std::mem::take(&mut self.workers) {
            match handle.join() {
                Ok(stats) => workers.push(stats),
                Err(_) => {
                    tracing::error!(thread = %name, "Worker thread panicked");
                    self.handle.shutdown();
                    if failure.is_none() {
                        failure = Some(LotError::WorkerPanicked { name });
                    }
                }
            }
        }

        // Workers are done; stop the monitor.
        self.handle.shutdown();

        let mut reports = 0;
        if let Some(handle) = self.monitor.take() {
            match handle.join() {
                Ok(Ok(stats)) => reports = stats.reports,
                Ok(Err(e)) => failure = Some(e),
                Err(_) => {
                    tracing::error!("Monitor thread panicked");
                    if failure.is_none() {
                        failure = Some(LotError::WorkerPanicked {
                            name: "monitor".to_string(),
                        });
                    }
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let summary = LotSummary {
            pool: self.handle.snapshot(),
            workers,
            reports,
        };
        tracing::info!(
            produced = summary.pool.produced,
            consumed = summary.pool.consumed,
            occupied = summary.pool.occupied,
            high_water = summary.pool.high_water,
            reports,
            "Lot stopped"
        );
        Ok(summary)
    }
}

impl Drop for Lot {
    fn drop(&mut self) {
        // Dropped without join: stop the threads so they do not outlive us blocked.
        if !self.workers.is_empty() || self.monitor.is_some() {
            tracing::warn!("Lot dropped without join - shutting down");
            self.barrier.abort();
            self.handle.shutdown();
        }
    }
}
