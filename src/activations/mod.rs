//! # Activation Functions
//!
//! The Q-networks in this crate only need two activations: ReLU for hidden
//! layers and the identity for value heads.

pub mod functions;

pub use functions::Activation;
