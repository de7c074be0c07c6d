//! Temporal-difference losses.
//!
//! Losses act on the Q-value of the action actually taken, so predictions and
//! targets are both `[batch]` vectors.

mod huber;

pub use huber::HuberLoss;
