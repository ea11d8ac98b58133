//! Shutdown signal shared by every thread of a lot.
//!
//! Workers and the monitor pause through [`Shutdown::sleep`], so triggering
//! the signal cuts their pauses short instead of waiting them out.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Shutdown {
    triggered: Mutex<bool>,
    cv: Condvar,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.triggered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Trigger shutdown and wake every sleeper. Returns `false` if it was
    /// already triggered.
    pub fn trigger(&self) -> bool {
        let mut triggered = self.lock();
        if *triggered {
            return false;
        }
        *triggered = true;
        self.cv.notify_all();
        true
    }

    pub fn is_triggered(&self) -> bool {
        *self.lock()
    }

    /// Sleep for `duration` unless shutdown is triggered first.
    ///
    /// Returns `true` if the full pause elapsed, `false` on shutdown.
    pub fn sleep(&self, duration: Duration) -> bool {
        let triggered = self.lock();
        if duration.is_zero() {
            return !*triggered;
        }
        let (triggered, _) = self
            .cv
            .wait_timeout_while(triggered, duration, |t| !*t)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        !*triggered
    }

    /// Block until shutdown is triggered.
    pub fn wait(&self) {
        let triggered = self.lock();
        let _triggered = self
            .cv
            .wait_while(triggered, |t| !*t)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
    }
}
