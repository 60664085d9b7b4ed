//! Exponential moving average.
//!
//! ```text
//! value' = value + α * (sample − value)
//! ```
//!
//! The first sample initializes the value directly.
//!
//! # Example
//!
//! ```rust
//! use puckbot_perception::filter::SmoothedScalar;
//!
//! let mut ema = SmoothedScalar::new(0.5);
//! assert_eq!(ema.update(4.0), 4.0);
//! assert_eq!(ema.update(2.0), 3.0);
//! ```

/// Single-pole low-pass filter over a scalar stream.
#[derive(Debug, Clone)]
pub struct SmoothedScalar {
    alpha: f64,
    value: Option<f64>,
}

impl SmoothedScalar {
    /// Create an empty filter.  `alpha` is clamped to `(0, 1]`; `1.0`
    /// passes samples through unchanged.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(f64::MIN_POSITIVE, 1.0),
            value: None,
        }
    }

    /// Feed one sample and return the new smoothed value.
    pub fn update(&mut self, sample: f64) -> f64 {
        let next = match self.value {
            None => sample,
            Some(prev) => prev + self.alpha * (sample - prev),
        };
        self.value = Some(next);
        next
    }

    /// Current smoothed value, `None` before the first sample.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_initializes_value() {
        let mut ema = SmoothedScalar::new(0.1);
        assert!(ema.value().is_none());
        assert_eq!(ema.update(3.3), 3.3);
        assert_eq!(ema.value(), Some(3.3));
    }

    #[test]
    fn subsequent_samples_move_by_alpha() {
        let mut ema = SmoothedScalar::new(0.1);
        ema.update(3.0);
        // 3.0 + 0.1 * (4.0 - 3.0) = 3.1
        assert!((ema.update(4.0) - 3.1).abs() < 1e-12);
        // 3.1 + 0.1 * (4.0 - 3.1) = 3.19
        assert!((ema.update(4.0) - 3.19).abs() < 1e-12);
    }

    #[test]
    fn alpha_one_passes_through() {
        let mut ema = SmoothedScalar::new(1.0);
        ema.update(1.0);
        assert_eq!(ema.update(7.5), 7.5);
    }

    #[test]
    fn alpha_clamped_to_open_unit_interval() {
        assert_eq!(SmoothedScalar::new(5.0).alpha(), 1.0);
        assert!(SmoothedScalar::new(-1.0).alpha() > 0.0);
    }

    #[test]
    fn reset_forgets_history() {
        let mut ema = SmoothedScalar::new(0.5);
        ema.update(10.0);
        ema.reset();
        assert_eq!(ema.update(2.0), 2.0);
    }
}
