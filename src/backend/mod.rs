//! Backend abstraction layer.
//!
//! Provides the traits every backend implements and the null backend used
//! for tests and headless runs.

pub mod null;
pub mod traits;
pub mod types;

pub use null::*;
pub use traits::*;
pub use types::*;
