//! Render Core - backend-agnostic GPU resource and render-state layer.
//!
//! The core keeps a shadow copy of the backend pipeline state and forwards
//! only the fields a draw call actually changes. Shaders, programs and
//! textures are created through deduplicating managers and become valid
//! lazily, exactly once, on the thread that owns the backend context.
//!
//! # Features
//! - Render state cache issuing minimal state deltas
//! - Lockable buffers with host shadow copies for write-only device memory
//! - Staged shader loading and relinkable programs
//! - Resource thread with futures for work submitted from other threads
//! - Null backend recording every call, for tests and headless runs

pub mod backend;
pub mod buffer;
pub mod draw_command;
pub mod error;
pub mod logging;
pub mod render_state;
pub mod renderer;
pub mod resources;
pub mod server;
pub mod uniform;
pub mod vertex;
pub mod viewport;

pub use backend::{BackendType, NullBackend, RenderBackend, RenderStateHooks};
pub use buffer::{Buffer, BufferGuard, LockOption, UsageHint};
pub use draw_command::{DrawCommand, DrawCommandList};
pub use error::{RenderError, RenderResult};
pub use render_state::{GlobalRenderState, RenderState, RenderStateCache};
pub use renderer::Renderer;
pub use server::{Future, RenderServer};
pub use uniform::UniformValue;

/// Configuration for the render core.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Which backend to use.
    pub backend: BackendType,
    /// Log every backend call at trace level.
    pub trace_api: bool,
    /// Attach host shadow copies to vertex buffers.
    pub vertex_shadow_buffer: bool,
    /// Attach host shadow copies to index buffers.
    pub index_shadow_buffer: bool,
    /// Number of texture units a draw command may use.
    pub max_texture_units: u32,
    /// Name of the resource thread.
    pub resource_thread_name: String,
    /// Log filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Null,
            trace_api: false,
            vertex_shadow_buffer: true,
            index_shadow_buffer: false,
            max_texture_units: 16,
            resource_thread_name: "render-resources".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl RenderConfig {
    /// Log every backend call at trace level.
    pub fn with_trace_api(mut self, trace_api: bool) -> Self {
        self.trace_api = trace_api;
        self
    }

    /// Choose which buffers get host shadow copies.
    pub fn with_shadow_buffers(mut self, vertex: bool, index: bool) -> Self {
        self.vertex_shadow_buffer = vertex;
        self.index_shadow_buffer = index;
        self
    }

    pub fn with_max_texture_units(mut self, units: u32) -> Self {
        self.max_texture_units = units;
        self
    }

    pub fn with_resource_thread_name(mut self, name: impl Into<String>) -> Self {
        self.resource_thread_name = name.into();
        self
    }

    /// Create the configured backend.
    pub fn create_backend(&self) -> NullBackend {
        match self.backend {
            BackendType::Null => NullBackend::new().with_trace_api(self.trace_api),
        }
    }
}
