//! Resource management.
//!
//! Shaders, programs and textures are created through deduplicating
//! managers and made valid lazily on the thread owning the backend.

mod file;
mod program;
mod resource;
mod shader;
mod texture;

pub use file::*;
pub use program::*;
pub use resource::*;
pub use shader::*;
pub use texture::*;
