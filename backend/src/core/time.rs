//! Simulated time
//!
//! The simulation runs in continuous time measured in years since the
//! session start. Annual boundaries drive periodic bookkeeping events and
//! discounting converts accrued costs and QALYs to present value.

use serde::{Deserialize, Serialize};

/// Simulation clock bounded by a horizon
///
/// # Example
/// ```
/// use hemsim_core::SimClock;
///
/// let clock = SimClock::new(20.0, 0.03);
/// assert_eq!(clock.next_annual_boundary(0.0), Some(1.0));
/// assert_eq!(clock.next_annual_boundary(2.5), Some(3.0));
/// assert_eq!(clock.next_annual_boundary(19.2), None);
/// assert_eq!(clock.year_index(4.999), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimClock {
    /// Simulated duration in years
    horizon: f64,

    /// Continuous annual discount rate
    discount_rate: f64,
}

impl SimClock {
    /// Create a new clock
    ///
    /// # Panics
    /// Panics if the horizon is not positive and finite. Configuration
    /// validation rejects such horizons before a clock is ever built.
    pub fn new(horizon: f64, discount_rate: f64) -> Self {
        assert!(
            horizon.is_finite() && horizon > 0.0,
            "horizon must be positive"
        );
        Self {
            horizon,
            discount_rate: discount_rate.max(0.0),
        }
    }

    /// Simulated duration in years
    pub fn horizon(&self) -> f64 {
        self.horizon
    }

    /// Continuous discount rate
    pub fn discount_rate(&self) -> f64 {
        self.discount_rate
    }

    /// Number of whole years covered by the horizon (last partial year included)
    pub fn num_years(&self) -> usize {
        self.horizon.ceil() as usize
    }

    /// Zero-based simulation year containing `t`
    pub fn year_index(&self, t: f64) -> usize {
        if t <= 0.0 {
            0
        } else {
            (t.floor() as usize).min(self.num_years().saturating_sub(1))
        }
    }

    /// First integer year strictly after `t`, if it lies before the horizon
    pub fn next_annual_boundary(&self, t: f64) -> Option<f64> {
        let next = t.floor() + 1.0;
        if next < self.horizon {
            Some(next)
        } else {
            None
        }
    }

    /// Discount factor for a one-off amount at time `t`
    pub fn discount_factor(&self, t: f64) -> f64 {
        (-self.discount_rate * t).exp()
    }

    /// Present value of a unit rate flowing over `[from, to]`
    ///
    /// Equals `to - from` when the discount rate is zero.
    pub fn discounted_duration(&self, from: f64, to: f64) -> f64 {
        if to <= from {
            return 0.0;
        }
        if self.discount_rate == 0.0 {
            to - from
        } else {
            (self.discount_factor(from) - self.discount_factor(to)) / self.discount_rate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "horizon must be positive")]
    fn test_zero_horizon_panics() {
        SimClock::new(0.0, 0.03);
    }

    #[test]
    fn test_undiscounted_duration_is_plain_length() {
        let clock = SimClock::new(10.0, 0.0);
        assert_eq!(clock.discounted_duration(1.0, 3.5), 2.5);
    }

    #[test]
    fn test_discounted_duration_smaller_than_length() {
        let clock = SimClock::new(10.0, 0.03);
        let pv = clock.discounted_duration(0.0, 5.0);
        assert!(pv < 5.0 && pv > 4.0, "pv = {}", pv);
    }

    #[test]
    fn test_fractional_horizon_years() {
        let clock = SimClock::new(2.5, 0.0);
        assert_eq!(clock.num_years(), 3);
        assert_eq!(clock.year_index(2.4), 2);
        assert_eq!(clock.next_annual_boundary(1.2), Some(2.0));
        assert_eq!(clock.next_annual_boundary(2.0), None);
    }
}
