//! Backend abstraction traits.
//!
//! [`RenderStateHooks`] is the pipeline-state half of a backend and is only
//! ever driven by [`crate::render_state::RenderStateCache`]. [`RenderBackend`]
//! adds resource creation and draw submission.

use crate::backend::types::*;
use crate::buffer::{BufferKind, BufferStorage};
use crate::render_state::StateChange;
use crate::resources::{Image, Program, Texture};
use crate::uniform::{UniformInfo, UniformValue};
use crate::vertex::VertexData;

/// Per-field state hooks. Each returns `false` if the backend rejected
/// the new value, in which case the cache keeps the old one.
pub trait RenderStateHooks {
    /// Apply one fixed-function field.
    fn state_changed(&mut self, change: StateChange) -> bool;

    /// Bind `program`, or unbind with `None`.
    fn program_changed(&mut self, program: Option<&Program>) -> bool;

    /// Bind `data`, or unbind with `None`.
    fn vertex_data_changed(&mut self, data: Option<&VertexData>, bind_for_drawing: bool) -> bool;

    /// Enable `texture` on `unit`, or disable the unit.
    fn texture_changed(&mut self, unit: u32, texture: Option<&Texture>, enable: bool) -> bool;

    /// Assign a uniform of the bound `program`.
    fn uniform_changed(
        &mut self,
        program: &Program,
        uniform: &UniformInfo,
        value: &UniformValue,
    ) -> bool;

    /// Set the viewport rectangle.
    fn viewport_changed(&mut self, viewport: ViewportRect) -> bool;
}

/// A complete rendering backend.
///
/// All methods must be called from the thread owning the backend context.
pub trait RenderBackend: RenderStateHooks {
    /// Get the backend type.
    fn backend_type(&self) -> BackendType;

    /// Create a shader object, `None` if the backend handed out no handle.
    fn create_shader(&mut self, ty: ShaderType) -> Option<ShaderHandle>;

    /// Compile `source`, returning the compiler log on failure.
    fn compile_shader(&mut self, shader: ShaderHandle, source: &str) -> Result<(), String>;

    /// Destroy a shader object.
    fn destroy_shader(&mut self, shader: ShaderHandle);

    /// Create a program object.
    fn create_program(&mut self) -> Option<ProgramHandle>;

    /// Link `shaders` into `program`, returning its active uniforms or the
    /// linker log.
    fn link_program(
        &mut self,
        program: ProgramHandle,
        shaders: &[ShaderHandle],
    ) -> Result<Vec<UniformInfo>, String>;

    /// Destroy a program object.
    fn destroy_program(&mut self, program: ProgramHandle);

    /// Upload `image` into a new texture.
    fn create_texture(&mut self, image: &Image, param: &TextureParameter) -> Option<TextureHandle>;

    /// Destroy a texture.
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Create device storage for a vertex or index buffer.
    fn create_buffer_storage(&mut self, kind: BufferKind) -> Box<dyn BufferStorage>;

    /// Draw the currently bound vertex data.
    fn draw(&mut self, data: &VertexData) -> bool;
}
