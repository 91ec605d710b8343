//! Null backend for testing and headless runs.
//!
//! No GPU work is done. Every call is recorded as a [`BackendCall`] so tests
//! can check exactly what the render core issued, and a few knobs let tests
//! make the backend reject states or fail resource creation.

use super::traits::{RenderBackend, RenderStateHooks};
use super::types::*;
use crate::buffer::{AlignedBytes, BufferKind, BufferStorage, LockOption, UsageHint};
use crate::render_state::StateChange;
use crate::resources::{Image, Program, ProgramId, Resource, Texture, TextureId};
use crate::uniform::{UniformInfo, UniformType, UniformValue};
use crate::vertex::{VertexData, VertexDataId};
use std::collections::{HashMap, HashSet};

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    StateChanged(StateChange),
    ProgramChanged(Option<ProgramId>),
    VertexDataChanged(Option<VertexDataId>, bool),
    TextureChanged(u32, Option<TextureId>, bool),
    UniformChanged(ProgramId, String, UniformValue),
    ViewportChanged(ViewportRect),
    CreateShader(ShaderType, ShaderHandle),
    CompileShader(ShaderHandle),
    DestroyShader(ShaderHandle),
    CreateProgram(ProgramHandle),
    LinkProgram(ProgramHandle, Vec<ShaderHandle>),
    DestroyProgram(ProgramHandle),
    CreateTexture(TextureHandle, u32, u32),
    DestroyTexture(TextureHandle),
    CreateBufferStorage(BufferKind),
    Draw(VertexDataId, usize),
}

/// Simulated device memory.
///
/// Locking maps a staging copy that is written back on unlock. Storage
/// allocated with [`UsageHint::WRITE_ONLY`] cannot be read directly.
#[derive(Debug, Default)]
pub struct DeviceStorage {
    data: AlignedBytes,
    hint: UsageHint,
    staging: Option<(LockOption, AlignedBytes)>,
}

impl DeviceStorage {
    /// Backend with an empty call log and nothing rejected.
    pub fn new() -> Self {
        Self::default()
    }
}

impl BufferStorage for DeviceStorage {
    fn allocate(&mut self, num_bytes: usize, hint: UsageHint) {
        self.data = AlignedBytes::zeroed(num_bytes);
        self.hint = hint;
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn lock(&mut self, option: LockOption) {
        let staging = match option {
            LockOption::Discard => AlignedBytes::zeroed(self.data.len()),
            _ => self.data.clone(),
        };
        self.staging = Some((option, staging));
    }

    fn mapped(&mut self) -> &mut [u8] {
        match self.staging.as_mut() {
            Some((_, staging)) => staging.as_mut_slice(),
            None => panic!("device storage is not mapped"),
        }
    }

    fn unlock(&mut self) {
        if let Some((option, staging)) = self.staging.take() {
            if option != LockOption::ReadOnly {
                self.data = staging;
            }
        }
    }

    fn write(&mut self, src: &[u8], offset: usize, _discard: bool) {
        self.data.as_mut_slice()[offset..offset + src.len()].copy_from_slice(src);
    }

    fn read(&self, offset: usize, dest: &mut [u8]) {
        assert!(self.is_readable(), "device storage is write-only");
        dest.copy_from_slice(&self.data.as_slice()[offset..offset + dest.len()]);
    }

    fn is_readable(&self) -> bool {
        !self.hint.contains(UsageHint::WRITE_ONLY)
    }
}

/// Backend that records calls instead of rendering.
#[derive(Debug, Default)]
pub struct NullBackend {
    calls: Vec<BackendCall>,
    trace_api: bool,
    next_handle: u64,
    shader_sources: HashMap<ShaderHandle, String>,
    compiled: HashSet<ShaderHandle>,
    rejected_states: HashSet<StateChange>,
    reject_programs: bool,
    reject_textures: bool,
    fail_shader_creation: bool,
}

impl NullBackend {
    /// Create a new null backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log every call at trace level.
    pub fn with_trace_api(mut self, trace_api: bool) -> Self {
        self.trace_api = trace_api;
        self
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Null Backend"
    }

    /// Calls recorded so far.
    pub fn calls(&self) -> &[BackendCall] {
        &self.calls
    }

    /// Take the recorded calls, leaving the log empty.
    pub fn take_calls(&mut self) -> Vec<BackendCall> {
        std::mem::take(&mut self.calls)
    }

    /// Forget every recorded call.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls.iter().filter(|call| pred(call)).count()
    }

    /// Make `state_changed` fail for exactly this value.
    pub fn reject_state(&mut self, change: StateChange) {
        self.rejected_states.insert(change);
    }

    /// Make `program_changed` fail for every program.
    pub fn reject_programs(&mut self, reject: bool) {
        self.reject_programs = reject;
    }

    /// Make enabling a texture fail.
    pub fn reject_textures(&mut self, reject: bool) {
        self.reject_textures = reject;
    }

    /// Make `create_shader` hand out no handle.
    pub fn fail_shader_creation(&mut self, fail: bool) {
        self.fail_shader_creation = fail;
    }

    fn record(&mut self, call: BackendCall) {
        if self.trace_api {
            log::trace!("NullBackend: {call:?}");
        }
        self.calls.push(call);
    }

    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

/// Collect `uniform <type> <name>[<len>];` declarations.
fn parse_uniforms(source: &str) -> Vec<(String, UniformType, usize)> {
    let mut uniforms = Vec::new();
    for line in source.lines() {
        let Some(decl) = line.trim().strip_prefix("uniform ") else {
            continue;
        };
        let decl = decl.trim_end_matches(';').trim();
        let Some((ty, name)) = decl.split_once(char::is_whitespace) else {
            continue;
        };
        let Some(ty) = UniformType::from_glsl(ty) else {
            continue;
        };
        let name = name.trim();
        match name.split_once('[') {
            Some((name, len)) => {
                let len = len.trim_end_matches(']').trim().parse().unwrap_or(1);
                uniforms.push((name.trim().to_string(), ty.array(), len));
            }
            None => uniforms.push((name.to_string(), ty, 1)),
        }
    }
    uniforms
}

impl RenderStateHooks for NullBackend {
    fn state_changed(&mut self, change: StateChange) -> bool {
        if self.rejected_states.contains(&change) {
            return false;
        }
        self.record(BackendCall::StateChanged(change));
        true
    }

    fn program_changed(&mut self, program: Option<&Program>) -> bool {
        if let Some(program) = program {
            if self.reject_programs || !program.is_valid() {
                return false;
            }
        }
        self.record(BackendCall::ProgramChanged(program.map(Program::id)));
        true
    }

    fn vertex_data_changed(&mut self, data: Option<&VertexData>, bind_for_drawing: bool) -> bool {
        self.record(BackendCall::VertexDataChanged(data.map(VertexData::id), bind_for_drawing));
        true
    }

    fn texture_changed(&mut self, unit: u32, texture: Option<&Texture>, enable: bool) -> bool {
        if enable && (self.reject_textures || !texture.is_some_and(|t| t.is_valid())) {
            return false;
        }
        self.record(BackendCall::TextureChanged(unit, texture.map(Texture::id), enable));
        true
    }

    fn uniform_changed(&mut self, program: &Program, uniform: &UniformInfo, value: &UniformValue) -> bool {
        self.record(BackendCall::UniformChanged(
            program.id(),
            uniform.name.clone(),
            value.clone(),
        ));
        true
    }

    fn viewport_changed(&mut self, viewport: ViewportRect) -> bool {
        self.record(BackendCall::ViewportChanged(viewport));
        true
    }
}

impl RenderBackend for NullBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Null
    }

    fn create_shader(&mut self, ty: ShaderType) -> Option<ShaderHandle> {
        if self.fail_shader_creation {
            return None;
        }
        let handle = ShaderHandle(self.next_handle());
        self.record(BackendCall::CreateShader(ty, handle));
        Some(handle)
    }

    fn compile_shader(&mut self, shader: ShaderHandle, source: &str) -> Result<(), String> {
        self.record(BackendCall::CompileShader(shader));
        if let Some((row, line)) = source
            .lines()
            .enumerate()
            .find(|(_, line)| line.contains("#error"))
        {
            return Err(format!("0({}) : error C0000: {}", row + 1, line.trim()));
        }
        self.shader_sources.insert(shader, source.to_string());
        self.compiled.insert(shader);
        Ok(())
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        self.shader_sources.remove(&shader);
        self.compiled.remove(&shader);
        self.record(BackendCall::DestroyShader(shader));
    }

    fn create_program(&mut self) -> Option<ProgramHandle> {
        let handle = ProgramHandle(self.next_handle());
        self.record(BackendCall::CreateProgram(handle));
        Some(handle)
    }

    fn link_program(&mut self, program: ProgramHandle, shaders: &[ShaderHandle]) -> Result<Vec<UniformInfo>, String> {
        self.record(BackendCall::LinkProgram(program, shaders.to_vec()));
        if shaders.is_empty() {
            return Err("no shaders attached".to_string());
        }

        let mut uniforms: Vec<UniformInfo> = Vec::new();
        for shader in shaders {
            if !self.compiled.contains(shader) {
                return Err(format!("shader {} is not compiled", shader.raw()));
            }
            let source = self.shader_sources.get(shader).map(String::as_str).unwrap_or_default();
            for (name, ty, len) in parse_uniforms(source) {
                if uniforms.iter().any(|u| u.name == name) {
                    continue;
                }
                let location = uniforms.len() as i32;
                uniforms.push(UniformInfo::new(name, ty, len, location));
            }
        }
        Ok(uniforms)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.record(BackendCall::DestroyProgram(program));
    }

    fn create_texture(&mut self, image: &Image, _param: &TextureParameter) -> Option<TextureHandle> {
        if image.width == 0 || image.height == 0 {
            return None;
        }
        let handle = TextureHandle(self.next_handle());
        self.record(BackendCall::CreateTexture(handle, image.width, image.height));
        Some(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.record(BackendCall::DestroyTexture(texture));
    }

    fn create_buffer_storage(&mut self, kind: BufferKind) -> Box<dyn BufferStorage> {
        self.record(BackendCall::CreateBufferStorage(kind));
        Box::new(DeviceStorage::new())
    }

    fn draw(&mut self, data: &VertexData) -> bool {
        let count = if data.has_index_buffer() {
            data.num_indices()
        } else {
            data.num_vertices()
        };
        self.record(BackendCall::Draw(data.id(), count));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;

    fn device_buffer(hint: UsageHint, shadow: bool) -> Buffer {
        let mut buffer = Buffer::new(BufferKind::Vertex, Box::new(DeviceStorage::new()));
        if shadow {
            buffer.set_shadow_buffer(Buffer::new_host());
        }
        buffer.allocate(8, hint);
        buffer
    }

    #[test]
    fn shadow_makes_write_only_storage_readable() {
        let mut buffer = device_buffer(UsageHint::STATIC_WRITE_ONLY, true);
        let src = [1, 2, 3, 4, 5, 6, 7, 8];
        buffer.write(&src, 0, true);
        let mut dest = [0u8; 8];
        buffer.read(0, &mut dest);
        assert_eq!(dest, src);
    }

    #[test]
    #[should_panic(expected = "not readable without a shadow buffer")]
    fn write_only_storage_cannot_be_read() {
        let buffer = device_buffer(UsageHint::STATIC_WRITE_ONLY, false);
        let mut dest = [0u8; 8];
        buffer.read(0, &mut dest);
    }

    #[test]
    fn lock_writes_back_on_unlock() {
        let mut buffer = device_buffer(UsageHint::DYNAMIC, false);
        buffer.lock(LockOption::WriteOnly);
        buffer.get()[..4].copy_from_slice(&[4, 3, 2, 1]);
        buffer.unlock();
        assert_eq!(&buffer.to_vec()[..4], &[4, 3, 2, 1]);

        buffer.lock(LockOption::ReadOnly);
        buffer.get()[0] = 99;
        buffer.unlock();
        assert_eq!(buffer.to_vec()[0], 4);
    }

    #[test]
    fn shadow_lock_updates_device_storage() {
        let mut buffer = device_buffer(UsageHint::DYNAMIC, true);
        buffer.lock(LockOption::Normal);
        buffer.get().copy_from_slice(&[9; 8]);
        buffer.unlock();
        assert_eq!(buffer.to_vec(), vec![9; 8]);
    }

    #[test]
    fn uniforms_are_parsed_from_source() {
        let uniforms = parse_uniforms(
            "uniform mat4 u_model_matrix;\n  uniform float u_weights[4];\nuniform sampler2D tex1_normal;\nvoid main() {}",
        );
        assert_eq!(
            uniforms,
            vec![
                ("u_model_matrix".to_string(), UniformType::Mat4, 1),
                ("u_weights".to_string(), UniformType::FloatArray, 4),
                ("tex1_normal".to_string(), UniformType::Int, 1),
            ]
        );
    }

    #[test]
    fn link_requires_compiled_shaders() {
        let mut backend = NullBackend::new();
        let program = backend.create_program().unwrap();
        assert!(backend.link_program(program, &[]).is_err());

        let shader = backend.create_shader(ShaderType::Vertex).unwrap();
        assert!(backend.link_program(program, &[shader]).is_err());

        backend
            .compile_shader(shader, "uniform vec3 u_light;\nvoid main() {}")
            .unwrap();
        let uniforms = backend.link_program(program, &[shader]).unwrap();
        assert_eq!(uniforms.len(), 1);
        assert_eq!(uniforms[0].location, 0);
    }

    #[test]
    fn rejected_state_is_not_recorded() {
        let mut backend = NullBackend::new();
        backend.reject_state(StateChange::DepthTest(false));
        assert!(!backend.state_changed(StateChange::DepthTest(false)));
        assert!(backend.state_changed(StateChange::DepthTest(true)));
        assert_eq!(backend.calls(), &[BackendCall::StateChanged(StateChange::DepthTest(true))]);
    }
}
