//! Parker and picker threads.
//!
//! Each worker waits at the start barrier, then loops: random pause, one fill
//! (parker) or take (picker), repeat. Blocking on a full or empty lot happens
//! inside [`SlotPool`]; the worker never touches ring state directly.

use std::fmt;
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::barrier::StartBarrier;
use crate::config::Pacing;
use crate::error::PoolError;
use crate::pool::SlotPool;
use crate::ring::Car;
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Producer: parks cars.
    Parker,
    /// Consumer: picks cars up.
    Picker,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parker => "parker",
            Self::Picker => "picker",
        }
    }

    pub fn thread_name(&self, index: usize) -> String {
        format!("{}-{index}", self.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker lifecycle. Blocked states are entered inside the pool's wait loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    WaitingToStart,
    Sleeping,
    /// Parker waiting for a free space.
    BlockedOnCapacity,
    /// Picker waiting for a parked car.
    BlockedOnEmpty,
    Active,
    Stopped,
}

impl WorkerState {
    /// The state a worker of `role` is in while its pool call may block.
    pub fn blocked(role: Role) -> Self {
        match role {
            Role::Parker => Self::BlockedOnCapacity,
            Role::Picker => Self::BlockedOnEmpty,
        }
    }
}

/// Why a worker left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Shutdown,
    BudgetExhausted,
    BarrierAborted,
    PoolClosed,
    PoolPoisoned,
}

/// What a worker did over its lifetime, returned when its thread exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub role: Role,
    pub index: usize,
    pub operations: u64,
    pub stop: StopReason,
}

/// Everything a worker thread needs; moved into the thread on spawn.
pub struct WorkerContext {
    pub role: Role,
    pub index: usize,
    pub pool: Arc<SlotPool>,
    pub barrier: Arc<StartBarrier>,
    pub shutdown: Arc<Shutdown>,
    pub pacing: Pacing,
    pub budget: Option<u64>,
}

/// Closes the pool and triggers shutdown if the worker unwinds, so a panic
/// never leaves the other threads parked on a condition nobody will signal.
struct HaltOnPanic {
    pool: Arc<SlotPool>,
    shutdown: Arc<Shutdown>,
}

impl Drop for HaltOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!("Worker panicked - halting lot");
            self.shutdown.trigger();
            self.pool.close();
        }
    }
}

fn transition(role: Role, index: usize, state: WorkerState) {
    tracing::trace!(%role, index, ?state, "Worker state");
}

/// Run one worker to completion.
pub fn run_worker(ctx: WorkerContext) -> WorkerStats {
    let WorkerContext {
        role,
        index,
        pool,
        barrier,
        shutdown,
        pacing,
        budget,
    } = ctx;

    let _guard = HaltOnPanic {
        pool: Arc::clone(&pool),
        shutdown: Arc::clone(&shutdown),
    };
    let mut rng = rand::rng();
    let mut operations = 0u64;

    let stats = |operations: u64, stop: StopReason| {
        transition(role, index, WorkerState::Stopped);
        tracing::debug!(%role, index, operations, ?stop, "Worker stopped");
        WorkerStats {
            role,
            index,
            operations,
            stop,
        }
    };

    transition(role, index, WorkerState::WaitingToStart);
    if barrier.wait().is_err() {
        return stats(operations, StopReason::BarrierAborted);
    }

    loop {
        if budget.is_some_and(|budget| operations >= budget) {
            return stats(operations, StopReason::BudgetExhausted);
        }

        transition(role, index, WorkerState::Sleeping);
        if !shutdown.sleep(pacing.draw(&mut rng)) {
            return stats(operations, StopReason::Shutdown);
        }

        transition(role, index, WorkerState::blocked(role));
        let result = match role {
            Role::Parker => pool.fill_one(Car::new(index, operations)).map(|produced| {
                tracing::trace!(%role, index, produced, "Parked car");
            }),
            Role::Picker => pool.take_one().map(|car| {
                tracing::trace!(%role, index, %car, "Picked car");
            }),
        };

        match result {
            Ok(()) => {
                transition(role, index, WorkerState::Active);
                operations += 1;
            }
            Err(PoolError::Closed) => return stats(operations, StopReason::PoolClosed),
            Err(PoolError::Poisoned) => {
                tracing::error!(%role, index, "Pool lock poisoned - worker stopping");
                return stats(operations, StopReason::PoolPoisoned);
            }
        }
    }
}
