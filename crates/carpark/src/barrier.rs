//! One-shot start barrier.
//!
//! Holds every parker, picker and the monitor until the whole population has
//! arrived, then releases them together. Unlike `std::sync::Barrier` it can be
//! aborted, so a lot that fails to spawn its last thread does not strand the
//! ones already waiting.

use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("start barrier aborted before all threads arrived")]
pub struct BarrierAborted;

/// Returned to each thread released by the barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierRelease {
    position: usize,
    expected: usize,
}

impl BarrierRelease {
    /// Zero-based arrival order.
    pub fn position(&self) -> usize {
        self.position
    }

    /// True for the last thread to arrive, whose arrival opened the barrier.
    pub fn is_leader(&self) -> bool {
        self.position + 1 == self.expected
    }
}

#[derive(Debug)]
struct BarrierState {
    arrived: usize,
    open: bool,
    aborted: bool,
}

#[derive(Debug)]
pub struct StartBarrier {
    expected: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl StartBarrier {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            state: Mutex::new(BarrierState {
                arrived: 0,
                open: expected == 0,
                aborted: false,
            }),
            released: Condvar::new(),
        }
    }

    // The state is only ever mutated by simple field writes, so a poisoned
    // guard is still coherent.
    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Block until `expected` threads have called `wait`.
    pub fn wait(&self) -> Result<BarrierRelease, BarrierAborted> {
        let mut state = self.lock();
        if state.aborted {
            return Err(BarrierAborted);
        }

        let position = state.arrived;
        state.arrived += 1;

        if state.arrived >= self.expected {
            state.open = true;
            tracing::debug!(arrived = state.arrived, "Start barrier released");
            self.released.notify_all();
        } else {
            tracing::trace!(
                arrived = state.arrived,
                expected = self.expected,
                "Waiting at start barrier"
            );
            state = self
                .released
                .wait_while(state, |s| !s.open && !s.aborted)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }

        if state.aborted && !state.open {
            return Err(BarrierAborted);
        }

        Ok(BarrierRelease {
            position,
            expected: self.expected,
        })
    }

    /// Release every waiter with [`BarrierAborted`]. No-op once open.
    pub fn abort(&self) {
        let mut state = self.lock();
        if state.open {
            return;
        }
        state.aborted = true;
        tracing::warn!(
            arrived = state.arrived,
            expected = self.expected,
            "Start barrier aborted"
        );
        self.released.notify_all();
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn arrived(&self) -> usize {
        self.lock().arrived
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn releases_only_when_everyone_arrived() {
        const THREADS: usize = 6;
        let barrier = Arc::new(StartBarrier::new(THREADS));
        let acted = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let barrier = Arc::clone(&barrier);
                let acted = Arc::clone(&acted);
                thread::spawn(move || {
                    // Stagger arrivals so an early release would be visible.
                    thread::sleep(Duration::from_millis(5 * i as u64));
                    assert!(
                        !acted.load(Ordering::SeqCst),
                        "a thread acted before thread {i} reached the barrier"
                    );
                    let release = barrier.wait().unwrap();
                    acted.store(true, Ordering::SeqCst);
                    release
                })
            })
            .collect();

        let releases: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(barrier.is_open());
        assert_eq!(barrier.arrived(), THREADS);
        assert_eq!(releases.iter().filter(|r| r.is_leader()).count(), 1);
        let mut positions: Vec<_> = releases.iter().map(|r| r.position()).collect();
        positions.sort_unstable();
        assert_eq!(positions, (0..THREADS).collect::<Vec<_>>());
    }

    #[test]
    fn nobody_passes_while_one_is_missing() {
        let barrier = Arc::new(StartBarrier::new(3));
        let passed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let passed = Arc::clone(&passed);
                thread::spawn(move || {
                    barrier.wait().unwrap();
                    passed.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        while barrier.arrived() < 2 {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(passed.load(Ordering::SeqCst), 0);
        assert!(!barrier.is_open());

        assert!(barrier.wait().unwrap().is_leader());
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(passed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn abort_releases_waiters_with_error() {
        let barrier = Arc::new(StartBarrier::new(3));
        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait())
        };

        while barrier.arrived() < 1 {
            thread::yield_now();
        }
        barrier.abort();

        assert_eq!(waiter.join().unwrap(), Err(BarrierAborted));
        assert_eq!(barrier.wait(), Err(BarrierAborted));
        assert!(!barrier.is_open());
    }

    #[test]
    fn abort_after_open_is_ignored() {
        let barrier = StartBarrier::new(1);
        assert!(barrier.wait().unwrap().is_leader());
        barrier.abort();
        assert!(barrier.is_open());
    }
}
