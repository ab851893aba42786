//! Core primitives.
//!
//! Small, dependency-light building blocks shared by the simulation.

pub mod vec2;
pub mod hash;

// Re-export core types
pub use vec2::Vec2;
pub use hash::{compute_state_hash, StateHash, StateHasher};
