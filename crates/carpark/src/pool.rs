//! Synchronized pool: the slot ring behind one mutex and two condition variables.
//!
//! Every read or write of ring state, cursors and counters happens under the
//! single `state` lock, so `produced == consumed + occupied` holds whenever the
//! lock is free. Parkers wait on `space_available` while the ring is full;
//! pickers wait on `item_available` while it is empty. Each successful fill or
//! take wakes exactly one waiter of the opposite kind.

use std::sync::{Condvar, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::{LotError, PoolError};
use crate::ring::{Car, SlotRing};

#[derive(Debug)]
struct PoolState {
    ring: SlotRing,
    produced: u64,
    consumed: u64,
    waiting_parkers: usize,
    waiting_pickers: usize,
    high_water: usize,
    closed: bool,
}

/// Point-in-time copy of the pool counters, taken under the lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub capacity: usize,
    pub produced: u64,
    pub consumed: u64,
    pub occupied: usize,
    /// Parkers currently blocked on a full lot.
    pub waiting_parkers: usize,
    /// Pickers currently blocked on an empty lot.
    pub waiting_pickers: usize,
    /// Highest occupancy ever observed.
    pub high_water: usize,
    pub closed: bool,
}

impl PoolSnapshot {
    pub fn is_consistent(&self) -> bool {
        self.produced == self.consumed + self.occupied as u64 && self.occupied <= self.capacity
    }
}

/// Fixed-capacity parking pool shared by parker and picker threads.
///
/// Only `fill_one`, `take_one`, `snapshot` and `close` are exposed; the ring
/// itself never leaves the lock.
#[derive(Debug)]
pub struct SlotPool {
    capacity: usize,
    state: Mutex<PoolState>,
    space_available: Condvar,
    item_available: Condvar,
}

impl SlotPool {
    /// Build a pool with `capacity` empty spaces.
    pub fn new(capacity: usize) -> Result<Self, LotError> {
        let ring = SlotRing::with_capacity(capacity)?;
        Ok(Self {
            capacity,
            state: Mutex::new(PoolState {
                ring,
                produced: 0,
                consumed: 0,
                waiting_parkers: 0,
                waiting_pickers: 0,
                high_water: 0,
                closed: false,
            }),
            space_available: Condvar::new(),
            item_available: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> Result<MutexGuard<'_, PoolState>, PoolError> {
        self.state.lock().map_err(|_| PoolError::Poisoned)
    }

    /// Lock state with poison recovery. Only for read-only diagnostics.
    fn lock_or_recover(&self) -> MutexGuard<'_, PoolState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("Pool mutex poisoned - reading recovered state");
                poisoned.into_inner()
            }
        }
    }

    /// Park one car, blocking while the lot is full.
    ///
    /// Returns the new total of cars ever parked. Fails with
    /// [`PoolError::Closed`] if the pool is closed before a space frees up.
    pub fn fill_one(&self, car: Car) -> Result<u64, PoolError> {
        let mut state = self.lock()?;

        if state.ring.is_full() && !state.closed {
            state.waiting_parkers += 1;
            tracing::trace!(%car, waiting = state.waiting_parkers, "Lot full, waiting for space");
            state = self
                .space_available
                .wait_while(state, |s| s.ring.is_full() && !s.closed)
                .map_err(|_| PoolError::Poisoned)?;
            state.waiting_parkers -= 1;
        }

        if state.closed {
            return Err(PoolError::Closed);
        }

        state.ring.write(car);
        state.produced += 1;
        state.high_water = state.high_water.max(state.ring.occupied());
        let produced = state.produced;

        self.item_available.notify_one();
        Ok(produced)
    }

    /// Pick one car, blocking while the lot is empty.
    pub fn take_one(&self) -> Result<Car, PoolError> {
        let mut state = self.lock()?;

        if state.ring.is_empty() && !state.closed {
            state.waiting_pickers += 1;
            tracing::trace!(waiting = state.waiting_pickers, "Lot empty, waiting for a car");
            state = self
                .item_available
                .wait_while(state, |s| s.ring.is_empty() && !s.closed)
                .map_err(|_| PoolError::Poisoned)?;
            state.waiting_pickers -= 1;
        }

        if state.closed {
            return Err(PoolError::Closed);
        }

        let car = state.ring.read();
        state.consumed += 1;

        self.space_available.notify_one();
        Ok(car)
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.lock_or_recover();
        PoolSnapshot {
            capacity: self.capacity,
            produced: state.produced,
            consumed: state.consumed,
            occupied: state.ring.occupied(),
            waiting_parkers: state.waiting_parkers,
            waiting_pickers: state.waiting_pickers,
            high_water: state.high_water,
            closed: state.closed,
        }
    }

    /// Close the pool and wake every blocked parker and picker.
    ///
    /// Waiters return [`PoolError::Closed`]; later calls fail immediately.
    /// Cars still parked stay counted in `occupied`.
    pub fn close(&self) {
        let mut state = self.lock_or_recover();
        if !state.closed {
            state.closed = true;
            tracing::debug!(
                waiting_parkers = state.waiting_parkers,
                waiting_pickers = state.waiting_pickers,
                "Pool closed"
            );
        }
        self.space_available.notify_all();
        self.item_available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock_or_recover().closed
    }
}
