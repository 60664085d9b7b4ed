//! Last-write-wins shared cells.
//!
//! Writers overwrite, readers copy the latest value out.  Cloning a cell
//! hands out another handle to the same slot.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Lock-free `f64` slot.  Empty until the first `store`.
#[derive(Debug, Clone)]
pub struct ScalarCell {
    bits: Arc<AtomicU64>,
}

impl ScalarCell {
    pub fn new() -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(f64::NAN.to_bits())),
        }
    }

    pub fn with_value(value: f64) -> Self {
        let cell = Self::new();
        cell.store(value);
        cell
    }

    pub fn store(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    /// Latest stored value, `None` if nothing (or NaN) was stored.
    pub fn load(&self) -> Option<f64> {
        let v = f64::from_bits(self.bits.load(Ordering::Acquire));
        if v.is_nan() { None } else { Some(v) }
    }

    pub fn load_or(&self, default: f64) -> f64 {
        self.load().unwrap_or(default)
    }

    pub fn clear(&self) {
        self.bits.store(f64::NAN.to_bits(), Ordering::Release);
    }
}

impl Default for ScalarCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared slot for a whole sample struct.
///
/// The lock is held only for the copy in or out, never across a tick.
#[derive(Debug)]
pub struct SensorCell<T> {
    slot: Arc<RwLock<T>>,
}

impl<T> Clone for SensorCell<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone> SensorCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            slot: Arc::new(RwLock::new(initial)),
        }
    }

    /// Overwrite the cell.
    pub fn publish(&self, value: T) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Copy of the most recently published value.
    pub fn latest(&self) -> T {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the value with `T::default()` and return what was there.
    pub fn take(&self) -> T
    where
        T: Default,
    {
        std::mem::take(&mut *self.slot.write().unwrap_or_else(PoisonError::into_inner))
    }
}

impl<T: Clone + Default> Default for SensorCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
