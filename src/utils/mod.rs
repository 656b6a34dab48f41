//! Utility modules for the ranking service
//!
//! Identifier encoding and the injectable sources of randomness used by the
//! service. Both generators can be swapped for deterministic versions in tests.

pub mod ids;
pub mod random;

pub use ids::{blob_key, decode, encode};
pub use random::{IdGenerator, Shuffler};
