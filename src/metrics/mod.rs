//! Training metrics: bounded histories of optimizer statistics and episode
//! outcomes, exportable as JSON.

pub mod tracker;

pub use tracker::{MetricsTracker, TrainingMetrics};
