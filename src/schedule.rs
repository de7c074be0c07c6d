//! # Schedules
//!
//! Deterministic functions from a training step to a hyperparameter value.
//! The training loop queries one schedule for the exploration rate and the
//! optimizer spec carries another for the learning rate.
//!
//! ```rust
//! use pixel_dqn::schedule::{PiecewiseSchedule, Schedule};
//!
//! let epsilon = Schedule::Piecewise(
//!     PiecewiseSchedule::new(vec![(0, 1.0), (100, 0.1)], 0.01).unwrap(),
//! );
//! assert_eq!(epsilon.value_at(0), 1.0);
//! assert_eq!(epsilon.value_at(101), 0.01);
//! ```

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

use crate::error::{DqnError, Result};

/// Step-indexed scalar schedule
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Schedule {
    /// Same value at every step
    Constant { value: f64 },

    /// Linear interpolation from `initial` to `final_value` over
    /// `schedule_timesteps`, then `final_value` forever
    Linear {
        schedule_timesteps: u64,
        initial: f64,
        final_value: f64,
    },

    /// Piecewise-linear interpolation between breakpoints
    Piecewise(PiecewiseSchedule),
}

impl Schedule {
    /// Get the value for a given step
    pub fn value_at(&self, step: i64) -> f64 {
        match self {
            Schedule::Constant { value } => *value,

            Schedule::Linear { schedule_timesteps, initial, final_value } => {
                if *schedule_timesteps == 0 {
                    return *final_value;
                }
                let fraction = (step.max(0) as f64 / *schedule_timesteps as f64).min(1.0);
                initial + fraction * (final_value - initial)
            }

            Schedule::Piecewise(schedule) => schedule.value_at(step),
        }
    }

    /// Create a constant schedule
    pub fn constant(value: f64) -> Self {
        Schedule::Constant { value }
    }

    /// Create a linear schedule
    pub fn linear(schedule_timesteps: u64, initial: f64, final_value: f64) -> Result<Self> {
        if schedule_timesteps == 0 {
            return Err(DqnError::configuration(
                "schedule_timesteps",
                "must be greater than 0",
            ));
        }
        if !initial.is_finite() || !final_value.is_finite() {
            return Err(DqnError::configuration(
                "linear schedule",
                "values must be finite",
            ));
        }
        Ok(Schedule::Linear {
            schedule_timesteps,
            initial,
            final_value,
        })
    }

    /// Create a piecewise schedule, validating the breakpoints
    pub fn piecewise(endpoints: Vec<(i64, f64)>, outside_value: f64) -> Result<Self> {
        Ok(Schedule::Piecewise(PiecewiseSchedule::new(endpoints, outside_value)?))
    }
}

/// Breakpoint table with linear interpolation and an outside fallback.
///
/// Thresholds are strictly increasing; this is checked on construction and
/// on deserialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPiecewise", into = "RawPiecewise")]
pub struct PiecewiseSchedule {
    endpoints: Vec<(i64, f64)>,
    outside_value: f64,
}

impl PiecewiseSchedule {
    pub fn new(endpoints: Vec<(i64, f64)>, outside_value: f64) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(DqnError::configuration(
                "endpoints",
                "at least one breakpoint is required",
            ));
        }
        for pair in endpoints.windows(2) {
            if pair[1].0 <= pair[0].0 {
                return Err(DqnError::configuration(
                    "endpoints".to_string(),
                    format!(
                        "thresholds must be strictly increasing, got {} after {}",
                        pair[1].0, pair[0].0
                    ),
                ));
            }
        }
        if endpoints.iter().any(|(_, v)| !v.is_finite()) || !outside_value.is_finite() {
            return Err(DqnError::configuration(
                "endpoints",
                "values must be finite",
            ));
        }
        Ok(PiecewiseSchedule { endpoints, outside_value })
    }

    pub fn value_at(&self, step: i64) -> f64 {
        for pair in self.endpoints.windows(2) {
            let (l_t, l) = pair[0];
            let (r_t, r) = pair[1];
            if l_t <= step && step < r_t {
                let alpha = (step - l_t) as f64 / (r_t - l_t) as f64;
                return l + alpha * (r - l);
            }
        }
        // The last breakpoint is inclusive.
        match self.endpoints.last() {
            Some(&(t, v)) if t == step => v,
            _ => self.outside_value,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawPiecewise {
    endpoints: Vec<(i64, f64)>,
    outside_value: f64,
}

impl TryFrom<RawPiecewise> for PiecewiseSchedule {
    type Error = DqnError;

    fn try_from(raw: RawPiecewise) -> Result<Self> {
        PiecewiseSchedule::new(raw.endpoints, raw.outside_value)
    }
}

impl From<PiecewiseSchedule> for RawPiecewise {
    fn from(schedule: PiecewiseSchedule) -> Self {
        RawPiecewise {
            endpoints: schedule.endpoints,
            outside_value: schedule.outside_value,
        }
    }
}
