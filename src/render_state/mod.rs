//! Render state and the state-diffing cache.

mod cache;
mod global;
mod state;

pub use cache::*;
pub use global::*;
pub use state::*;
