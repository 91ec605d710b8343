//! Vertex layouts and vertex data.

mod data;
mod layout;

pub use data::*;
pub use layout::*;
