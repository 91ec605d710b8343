//! Renderer tying a backend to the state cache and resource managers.

use crate::backend::{RenderBackend, ShaderType, TextureParameter};
use crate::draw_command::DrawCommand;
use crate::error::RenderResult;
use crate::render_state::{GlobalRenderState, RenderStateCache};
use crate::resources::{
    FileRef, Image, Program, ProgramManager, Shader, ShaderManager, ShaderStatus, Texture, TextureManager,
};
use crate::vertex::{VertexData, VertexDataId, VertexDataParameter, VertexType};
use crate::viewport::{Viewport, ViewportListener};
use crate::RenderConfig;
use std::sync::Arc;

/// Owns one backend context and everything created on it.
///
/// A renderer lives on the thread owning the backend, usually as the
/// context of a [`RenderServer`](crate::server::RenderServer).
pub struct Renderer<B: RenderBackend> {
    config: RenderConfig,
    backend: B,
    cache: RenderStateCache,
    global: GlobalRenderState,
    shaders: ShaderManager,
    programs: ProgramManager,
    textures: TextureManager,
    next_vertex_data: u64,
}

impl<B: RenderBackend> Renderer<B> {
    /// Renderer drawing through `backend`. Call [`init_state`](Self::init_state) before the first draw.
    pub fn new(config: RenderConfig, backend: B) -> Self {
        log::info!("creating renderer with {:?} backend", backend.backend_type());
        Self {
            config,
            backend,
            cache: RenderStateCache::new(),
            global: GlobalRenderState::new(),
            shaders: ShaderManager::new(),
            programs: ProgramManager::new(),
            textures: TextureManager::new(),
            next_vertex_data: 0,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Shadow copy of the backend state.
    pub fn state_cache(&self) -> &RenderStateCache {
        &self.cache
    }

    /// Uniform variables applied to every draw before the command's own.
    pub fn global_state(&self) -> &GlobalRenderState {
        &self.global
    }

    pub fn global_state_mut(&mut self) -> &mut GlobalRenderState {
        &mut self.global
    }

    /// Synchronize backend and cache with the default render state.
    pub fn init_state(&mut self) -> bool {
        self.cache.init_state(&mut self.backend)
    }

    /// Forget the cached state, forcing a full update on the next draw.
    pub fn reset(&mut self) {
        self.cache.reset();
    }

    /// Get the shader of `file`, loading it up to `requested`.
    pub fn create_shader(&mut self, ty: ShaderType, file: FileRef, requested: ShaderStatus) -> RenderResult<Arc<Shader>> {
        self.shaders.create(&mut self.backend, ty, file, requested)
    }

    /// Unregister `shader`; programs using it must be relinked.
    pub fn remove_shader(&mut self, shader: &Shader) -> bool {
        let programs = self.programs.shader_removed(shader);
        if programs > 0 {
            log::debug!("shader '{}' removed from {programs} programs", shader.path());
        }
        self.shaders.remove(&mut self.backend, shader)
    }

    /// Get the program linking `shaders`, created unlinked.
    pub fn create_program(&mut self, shaders: Vec<Arc<Shader>>) -> Arc<Program> {
        self.programs.create(shaders)
    }

    /// Compile and link `program` now instead of at its first draw.
    pub fn make_program_valid(&mut self, program: &Program) -> RenderResult<()> {
        self.programs.make_valid(&mut self.backend, &self.shaders, program)
    }

    /// Destroy `program` and forget its cached and global uniforms.
    pub fn remove_program(&mut self, program: &Program) -> bool {
        self.cache.reset_uniforms(program.id());
        self.global.remove_program(program.id());
        self.programs.remove(&mut self.backend, program)
    }

    /// Get the texture of `file` sampled with `param`.
    pub fn create_texture(&mut self, file: FileRef, param: TextureParameter) -> Arc<Texture> {
        self.textures.create(file, param)
    }

    pub fn create_texture_from_image(&mut self, image: Image, param: TextureParameter) -> Arc<Texture> {
        self.textures.create_from_image(image, param)
    }

    /// Upload `texture` now instead of at its first draw.
    pub fn make_texture_valid(&mut self, texture: &Texture) -> RenderResult<()> {
        self.textures.make_valid(&mut self.backend, texture)
    }

    /// Allocation parameters for `V` using the configured shadow buffer
    /// defaults.
    pub fn vertex_data_parameter<V: VertexType>(&self, num_vertices: usize, num_indices: usize) -> VertexDataParameter {
        VertexDataParameter::new::<V>(num_vertices, num_indices)
            .with_shadow_buffers(self.config.vertex_shadow_buffer, self.config.index_shadow_buffer)
    }

    /// Allocate vertex and index storage described by `param`.
    pub fn create_vertex_data(&mut self, param: &VertexDataParameter) -> Arc<VertexData> {
        self.next_vertex_data += 1;
        Arc::new(VertexData::new(
            VertexDataId(self.next_vertex_data),
            &mut self.backend,
            param,
        ))
    }

    /// Draw `command`.
    ///
    /// Its program and textures are made valid first; failures there are
    /// returned as errors. `Ok(false)` means the draw was skipped because
    /// the backend rejected part of the state or a texture unit is out of
    /// range.
    pub fn draw(&mut self, command: &DrawCommand) -> RenderResult<bool> {
        let state = command.render_state();
        if let Some(unit) = state.texture_units().find(|&unit| unit >= self.config.max_texture_units) {
            log::warn!(
                "skipping draw, texture unit {unit} exceeds {} units",
                self.config.max_texture_units
            );
            return Ok(false);
        }
        if let Some(program) = state.program() {
            self.programs.make_valid(&mut self.backend, &self.shaders, &program)?;
        }
        for unit in state.texture_units() {
            if let Some(texture) = state.texture(unit) {
                self.textures.make_valid(&mut self.backend, &texture)?;
            }
        }
        Ok(self.cache.draw_with_globals(&mut self.backend, Some(&self.global), command))
    }

    /// Draw `commands` in order, returning how many were drawn.
    ///
    /// A skipped command does not stop the list; an error does.
    pub fn draw_list<'a>(&mut self, commands: impl IntoIterator<Item = &'a DrawCommand>) -> RenderResult<usize> {
        let mut drawn = 0;
        for command in commands {
            if self.draw(command)? {
                drawn += 1;
            }
        }
        log::trace!("drew {drawn} commands");
        Ok(drawn)
    }

    /// Release every resource created through this renderer.
    pub fn clear(&mut self) {
        self.cache.reset();
        self.global.reset();
        self.programs.clear(&mut self.backend);
        self.shaders.clear(&mut self.backend);
        self.textures.clear(&mut self.backend);
    }
}

impl<B: RenderBackend + Send> ViewportListener for Renderer<B> {
    fn viewport_geometry_changed(&mut self, viewport: &Viewport) {
        if !self.cache.set_viewport(&mut self.backend, viewport.rect()) {
            log::warn!("backend rejected viewport {}", viewport.rect());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, NullBackend, ViewportRect};
    use crate::error::RenderError;
    use crate::resources::{MemoryFile, Resource};
    use crate::uniform::UniformValue;
    use crate::vertex::Vertex3D;
    use glam::Mat4;
    use parking_lot::Mutex;

    const VERTEX: &str = "uniform mat4 u_model_matrix;\nvoid main() {}\n";
    const FRAGMENT: &str = "uniform sampler2D tex0_diffuse;\nuniform float u_alpha;\nvoid main() {}\n";

    fn renderer() -> Renderer<NullBackend> {
        let mut renderer = Renderer::new(RenderConfig::default(), NullBackend::new());
        renderer.init_state();
        renderer.backend_mut().clear_calls();
        renderer
    }

    fn program(renderer: &mut Renderer<NullBackend>) -> Arc<Program> {
        let vertex = renderer
            .create_shader(ShaderType::Vertex, MemoryFile::new("a.vert", VERTEX), ShaderStatus::OnDisk)
            .unwrap();
        let fragment = renderer
            .create_shader(ShaderType::Fragment, MemoryFile::new("a.frag", FRAGMENT), ShaderStatus::OnDisk)
            .unwrap();
        renderer.create_program(vec![vertex, fragment])
    }

    fn triangle(renderer: &mut Renderer<NullBackend>) -> Arc<VertexData> {
        let param = renderer.vertex_data_parameter::<Vertex3D>(3, 0);
        renderer.create_vertex_data(&param)
    }

    #[test]
    fn draw_validates_program_and_sets_uniforms() {
        let mut renderer = renderer();
        let program = program(&mut renderer);
        let data = triangle(&mut renderer);

        let mut command = DrawCommand::new(&program, &data);
        command.set_uniform_variable("u_alpha", 0.5f32);
        command.set_uniform_variable("u_unknown", 1i32);
        command.set_model_matrix(Mat4::from_scale(glam::Vec3::splat(2.0)));

        assert!(renderer.draw(&command).unwrap());
        assert!(program.is_valid());

        let calls = renderer.backend().calls();
        assert!(calls.contains(&BackendCall::ProgramChanged(Some(program.id()))));
        assert!(calls.contains(&BackendCall::UniformChanged(
            program.id(),
            "u_alpha".into(),
            UniformValue::Float(0.5)
        )));
        assert!(calls.contains(&BackendCall::UniformChanged(
            program.id(),
            "u_model_matrix".into(),
            UniformValue::Mat4(Mat4::from_scale(glam::Vec3::splat(2.0)))
        )));
        assert_eq!(calls.last(), Some(&BackendCall::Draw(data.id(), 3)));
    }

    #[test]
    fn global_uniforms_precede_command_uniforms() {
        let mut renderer = renderer();
        let program = program(&mut renderer);
        let data = triangle(&mut renderer);
        renderer.global_state_mut().set_shared_uniform_variable("u_alpha", 0.25f32);
        renderer.global_state_mut().set_shared_uniform_variable("u_not_declared", 1i32);

        let plain = DrawCommand::new(&program, &data);
        assert!(renderer.draw(&plain).unwrap());
        let alpha = |value: f32| BackendCall::UniformChanged(program.id(), "u_alpha".into(), UniformValue::Float(value));
        assert!(renderer.backend().calls().contains(&alpha(0.25)));

        let mut own = DrawCommand::new(&program, &data);
        own.set_uniform_variable("u_alpha", 0.75f32);
        renderer.backend_mut().clear_calls();
        assert!(renderer.draw(&own).unwrap());
        let uniforms = renderer.backend().count(|call| matches!(call, BackendCall::UniformChanged(..)));
        assert_eq!(uniforms, 1);
        assert!(renderer.backend().calls().contains(&alpha(0.75)));

        renderer
            .global_state_mut()
            .set_per_program_uniform_variable(&program, "u_alpha", 0.5f32);
        renderer.backend_mut().clear_calls();
        assert!(renderer.draw(&plain).unwrap());
        assert!(renderer.backend().calls().contains(&alpha(0.5)));
    }

    #[test]
    fn draw_list_counts_drawn_commands() {
        let mut renderer = renderer();
        let program = program(&mut renderer);
        let data = triangle(&mut renderer);
        let texture = renderer.create_texture_from_image(Image::solid_color([0; 4], "black"), TextureParameter::default());

        let mut list = crate::draw_command::DrawCommandList::new();
        list.insert(DrawCommand::new(&program, &data));
        let mut out_of_range = DrawCommand::new(&program, &data);
        out_of_range.set_texture(renderer.config().max_texture_units, &texture);
        list.insert(out_of_range);
        list.insert(DrawCommand::new(&program, &data));

        assert_eq!(renderer.draw_list(&list).unwrap(), 2);
        assert_eq!(renderer.backend().count(|call| matches!(call, BackendCall::Draw(..))), 2);
        assert_eq!(renderer.draw_list(&crate::draw_command::DrawCommandList::new()).unwrap(), 0);
    }

    #[test]
    fn redrawing_skips_unchanged_state() {
        let mut renderer = renderer();
        let program = program(&mut renderer);
        let data = triangle(&mut renderer);
        let mut command = DrawCommand::new(&program, &data);
        command.set_uniform_variable("u_alpha", 0.5f32);

        assert!(renderer.draw(&command).unwrap());
        renderer.backend_mut().clear_calls();
        assert!(renderer.draw(&command).unwrap());
        assert_eq!(renderer.backend().calls(), &[BackendCall::Draw(data.id(), 3)]);
    }

    #[test]
    fn texture_binds_sampler_uniform() {
        let mut renderer = renderer();
        let program = program(&mut renderer);
        let data = triangle(&mut renderer);
        let texture = renderer.create_texture_from_image(crate::resources::Image::white(), TextureParameter::default());

        let mut command = DrawCommand::new(&program, &data);
        command.set_texture(0, &texture);
        assert!(renderer.draw(&command).unwrap());
        assert!(texture.is_valid());

        let calls = renderer.backend().calls();
        assert!(calls.contains(&BackendCall::TextureChanged(0, Some(texture.id()), true)));
        assert!(calls.contains(&BackendCall::UniformChanged(
            program.id(),
            "tex0_diffuse".into(),
            UniformValue::Int(0)
        )));
    }

    #[test]
    fn out_of_range_texture_unit_skips_draw() {
        let mut renderer = Renderer::new(
            RenderConfig::default().with_max_texture_units(2),
            NullBackend::new(),
        );
        let program = program(&mut renderer);
        let data = triangle(&mut renderer);
        let texture = renderer.create_texture_from_image(crate::resources::Image::white(), TextureParameter::default());

        let mut command = DrawCommand::new(&program, &data);
        command.set_texture(2, &texture);
        assert!(!renderer.draw(&command).unwrap());
        assert!(!texture.is_valid());
    }

    #[test]
    fn compile_failure_is_returned() {
        let mut renderer = renderer();
        let broken = renderer
            .create_shader(
                ShaderType::Fragment,
                MemoryFile::new("broken.frag", "#error\n"),
                ShaderStatus::InMemory,
            )
            .unwrap();
        let program = renderer.create_program(vec![broken]);
        let data = triangle(&mut renderer);

        let err = renderer.draw(&DrawCommand::new(&program, &data)).unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompilationFailed { .. }));
        assert!(!renderer
            .backend()
            .calls()
            .iter()
            .any(|call| matches!(call, BackendCall::Draw(..))));
    }

    #[test]
    fn rejected_state_skips_draw() {
        let mut renderer = renderer();
        let program = program(&mut renderer);
        let data = triangle(&mut renderer);
        renderer.backend_mut().reject_programs(true);

        assert!(!renderer.draw(&DrawCommand::new(&program, &data)).unwrap());
        assert_eq!(
            renderer.backend().count(|call| matches!(call, BackendCall::Draw(..))),
            0
        );
    }

    #[test]
    fn removing_a_shader_relinks_on_next_draw() {
        let mut renderer = renderer();
        let program = program(&mut renderer);
        let data = triangle(&mut renderer);
        let command = DrawCommand::new(&program, &data);
        assert!(renderer.draw(&command).unwrap());

        let fragment = program.shaders().into_iter().find(|s| s.ty() == ShaderType::Fragment).unwrap();
        assert!(renderer.remove_shader(&fragment));
        assert!(!program.is_valid());

        assert!(renderer.draw(&command).unwrap());
        assert!(program.is_valid());
        assert_eq!(program.generation(), 2);
    }

    #[test]
    fn viewport_changes_reach_backend_once() {
        let renderer = Arc::new(Mutex::new(renderer()));
        let listener: Arc<Mutex<dyn ViewportListener>> = renderer.clone();
        let mut viewport = Viewport::new(ViewportRect::new(0, 0, 640, 480));
        viewport.add_listener(&listener);

        viewport.set_geometry(ViewportRect::new(0, 0, 1024, 768));
        renderer.lock().viewport_geometry_changed(&viewport);

        assert_eq!(
            renderer.lock().backend().calls(),
            &[BackendCall::ViewportChanged(ViewportRect::new(0, 0, 1024, 768))]
        );
    }

    #[test]
    fn clear_releases_resources() {
        let mut renderer = renderer();
        let program = program(&mut renderer);
        renderer.make_program_valid(&program).unwrap();
        renderer.backend_mut().clear_calls();

        renderer.clear();
        let calls = renderer.backend().calls();
        assert_eq!(calls.iter().filter(|c| matches!(c, BackendCall::DestroyShader(_))).count(), 2);
        assert_eq!(calls.iter().filter(|c| matches!(c, BackendCall::DestroyProgram(_))).count(), 1);
    }
}
