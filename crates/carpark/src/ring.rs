//! Fixed-size circular array of parking spaces.
//!
//! The ring has no synchronization of its own. [`SlotPool`](crate::SlotPool)
//! is its only owner and every access happens under the pool lock.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, LotError};

/// One parked car: which parker brought it in and that parker's serial number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Car {
    pub parker: usize,
    pub serial: u64,
}

impl Car {
    pub fn new(parker: usize, serial: u64) -> Self {
        Self { parker, serial }
    }
}

impl fmt::Display for Car {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "car#{}.{}", self.parker, self.serial)
    }
}

#[derive(Debug)]
pub(crate) struct SlotRing {
    spaces: Vec<Option<Car>>,
    occupied: usize,
    write_cursor: usize,
    read_cursor: usize,
}

impl SlotRing {
    /// Allocate `capacity` empty spaces.
    ///
    /// Storage is reserved fallibly so an oversized lot is reported as
    /// [`LotError::Allocation`] instead of aborting the process.
    pub fn with_capacity(capacity: usize) -> Result<Self, LotError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity(capacity).into());
        }

        let mut spaces = Vec::new();
        spaces
            .try_reserve_exact(capacity)
            .map_err(|_| LotError::Allocation { capacity })?;
        spaces.resize(capacity, None);

        Ok(Self {
            spaces,
            occupied: 0,
            write_cursor: 0,
            read_cursor: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.spaces.len()
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    pub fn is_full(&self) -> bool {
        self.occupied == self.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    #[cfg(test)]
    pub fn write_cursor(&self) -> usize {
        self.write_cursor
    }

    #[cfg(test)]
    pub fn read_cursor(&self) -> usize {
        self.read_cursor
    }

    /// Park a car at the write cursor.
    ///
    /// # Panics
    ///
    /// Panics if the ring is full. Reaching this means the caller skipped the
    /// capacity wait, which is a synchronization bug.
    pub fn write(&mut self, car: Car) {
        assert!(
            self.occupied < self.capacity(),
            "overfill: write into full ring (occupied {} of {})",
            self.occupied,
            self.capacity()
        );
        let space = &mut self.spaces[self.write_cursor];
        assert!(space.is_none(), "overfill: space {} already holds a car", self.write_cursor);
        *space = Some(car);
        self.write_cursor = (self.write_cursor + 1) % self.capacity();
        self.occupied += 1;
    }

    /// Pick the car at the read cursor, clearing its space.
    ///
    /// # Panics
    ///
    /// Panics if the ring is empty.
    pub fn read(&mut self) -> Car {
        assert!(self.occupied > 0, "underdrain: read from empty ring");
        let Some(car) = self.spaces[self.read_cursor].take() else {
            panic!("underdrain: space {} is empty", self.read_cursor);
        };
        self.read_cursor = (self.read_cursor + 1) % self.capacity();
        self.occupied -= 1;
        car
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_ring_is_empty() {
        let ring = SlotRing::with_capacity(4).unwrap();
        assert_eq!(ring.capacity(), 4);
        assert_eq!(ring.occupied(), 0);
        assert!(ring.is_empty());
        assert!(!ring.is_full());
        assert_eq!(ring.write_cursor(), 0);
        assert_eq!(ring.read_cursor(), 0);
    }

    #[test]
    fn zero_capacity_is_a_config_error() {
        let err = SlotRing::with_capacity(0).unwrap_err();
        assert!(matches!(err, LotError::Config(ConfigError::ZeroCapacity(0))));
    }

    #[test]
    fn oversized_ring_reports_allocation_failure() {
        let err = SlotRing::with_capacity(usize::MAX).unwrap_err();
        assert!(matches!(err, LotError::Allocation { capacity } if capacity == usize::MAX));
    }

    #[test]
    fn write_cursor_wraps_after_capacity_fills() {
        let mut ring = SlotRing::with_capacity(3).unwrap();
        let start = ring.write_cursor();
        for serial in 0..3 {
            ring.write(Car::new(0, serial));
        }
        assert_eq!(ring.write_cursor(), start);
        assert_eq!(ring.occupied(), 3);
        assert!(ring.is_full());
    }

    #[test]
    fn reads_come_out_in_fill_order_across_wraparound() {
        let mut ring = SlotRing::with_capacity(2).unwrap();
        ring.write(Car::new(0, 0));
        ring.write(Car::new(0, 1));
        assert_eq!(ring.read(), Car::new(0, 0));
        ring.write(Car::new(1, 0));
        assert_eq!(ring.write_cursor(), 1);
        assert_eq!(ring.read(), Car::new(0, 1));
        assert_eq!(ring.read(), Car::new(1, 0));
        assert_eq!(ring.read_cursor(), 1);
        assert!(ring.is_empty());
    }

    #[test]
    #[should_panic(expected = "overfill")]
    fn write_into_full_ring_panics() {
        let mut ring = SlotRing::with_capacity(1).unwrap();
        ring.write(Car::new(0, 0));
        ring.write(Car::new(0, 1));
    }

    #[test]
    #[should_panic(expected = "underdrain")]
    fn read_from_empty_ring_panics() {
        let mut ring = SlotRing::with_capacity(1).unwrap();
        ring.read();
    }

    #[test]
    fn car_display() {
        assert_eq!(Car::new(2, 17).to_string(), "car#2.17");
    }
}
