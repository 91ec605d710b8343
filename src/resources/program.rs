//! Linked shader programs.
//!
//! Unlike shaders and textures a program can lose its validity again:
//! changing its shader set sends it back to [`ProgramStatus::Created`] and
//! the next [`ProgramManager::make_valid`] relinks it.

use super::resource::Resource;
use super::shader::{Shader, ShaderManager};
use crate::backend::{ProgramHandle, RenderBackend};
use crate::error::{RenderError, RenderResult};
use crate::uniform::UniformInfo;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of a program, stable across relinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(u64);

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Program[{}]", self.0)
    }
}

/// Link status of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProgramStatus {
    Invalid,
    Created,
    Linked,
}

#[derive(Debug)]
struct ProgramState {
    status: ProgramStatus,
    handle: Option<ProgramHandle>,
    shaders: Vec<Arc<Shader>>,
    uniforms: HashMap<String, UniformInfo>,
    samplers: BTreeMap<u32, String>,
    generation: u64,
    exception: Option<RenderError>,
}

/// A set of shaders linked together.
#[derive(Debug)]
pub struct Program {
    id: ProgramId,
    linked: AtomicBool,
    generation: AtomicU64,
    state: Mutex<ProgramState>,
}

impl Program {
    fn new(id: ProgramId, shaders: Vec<Arc<Shader>>) -> Self {
        Self {
            id,
            linked: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            state: Mutex::new(ProgramState {
                status: ProgramStatus::Invalid,
                handle: None,
                shaders,
                uniforms: HashMap::new(),
                samplers: BTreeMap::new(),
                generation: 0,
                exception: None,
            }),
        }
    }

    /// Identity of the program, kept across relinks.
    pub fn id(&self) -> ProgramId {
        self.id
    }

    /// Whether the program is linked.
    pub fn status(&self) -> ProgramStatus {
        self.state.lock().status
    }

    /// Backend program object, `None` until first linked.
    pub fn handle(&self) -> Option<ProgramHandle> {
        self.state.lock().handle
    }

    /// Number of successful links so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Shaders currently attached.
    pub fn shaders(&self) -> Vec<Arc<Shader>> {
        self.state.lock().shaders.clone()
    }

    /// Active uniform `name`, known once the program is linked.
    pub fn uniform(&self, name: &str) -> Option<UniformInfo> {
        self.state.lock().uniforms.get(name).cloned()
    }

    /// Active uniforms reported by the last link, sorted by name.
    pub fn uniforms(&self) -> Vec<UniformInfo> {
        let mut uniforms: Vec<_> = self.state.lock().uniforms.values().cloned().collect();
        uniforms.sort_by_key(|info| info.location);
        uniforms
    }

    /// Sampler uniform bound to texture `unit`.
    pub fn sampler_uniform(&self, unit: u32) -> Option<UniformInfo> {
        let state = self.state.lock();
        let name = state.samplers.get(&unit)?;
        state.uniforms.get(name).cloned()
    }

    fn key(shaders: &[Arc<Shader>]) -> Vec<String> {
        let mut key: Vec<String> = shaders.iter().map(|s| s.path().to_string()).collect();
        key.sort();
        key
    }

    fn invalidate(&self, state: &mut ProgramState) {
        if state.status == ProgramStatus::Linked {
            state.status = ProgramStatus::Created;
        }
        state.uniforms.clear();
        state.samplers.clear();
        self.linked.store(false, Ordering::Release);
    }
}

impl Resource for Program {
    fn is_valid(&self) -> bool {
        self.linked.load(Ordering::Acquire)
    }

    fn rethrow_exception(&self) -> RenderResult<()> {
        match self.state.lock().exception.as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(f, "{}[status = {:?}, shaders = [", self.id, state.status)?;
        for (i, shader) in state.shaders.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", shader.path())?;
        }
        write!(f, "]]")
    }
}

/// Creates one program per shader set and links it on demand.
#[derive(Debug, Default)]
pub struct ProgramManager {
    programs: Vec<Arc<Program>>,
    next_id: u64,
}

impl ProgramManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the program made of `shaders`, creating it if needed.
    ///
    /// The program is linked lazily by [`Self::make_valid`].
    ///
    /// # Panics
    ///
    /// Panics if `shaders` is empty.
    pub fn create(&mut self, shaders: Vec<Arc<Shader>>) -> Arc<Program> {
        assert!(!shaders.is_empty(), "a program needs at least one shader");
        let key = Program::key(&shaders);
        if let Some(program) = self
            .programs
            .iter()
            .find(|program| Program::key(&program.state.lock().shaders) == key)
        {
            return program.clone();
        }

        self.next_id += 1;
        let program = Arc::new(Program::new(ProgramId(self.next_id), shaders));
        log::debug!("registering {program}");
        self.programs.push(program.clone());
        program
    }

    /// Compile the shaders of `program` and link it, unless it is linked.
    pub fn make_valid<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        shaders: &ShaderManager,
        program: &Program,
    ) -> RenderResult<()> {
        if program.is_valid() {
            return Ok(());
        }

        let mut state = program.state.lock();
        if program.is_valid() {
            return Ok(());
        }

        match Self::link(backend, shaders, program, &mut state) {
            Ok(()) => {
                state.exception = None;
                program.generation.store(state.generation, Ordering::Release);
                program.linked.store(true, Ordering::Release);
                Ok(())
            }
            Err(err) => {
                log::error!("{err}");
                state.exception = Some(err.clone());
                Err(err)
            }
        }
    }

    fn link<B: RenderBackend + ?Sized>(
        backend: &mut B,
        shaders: &ShaderManager,
        program: &Program,
        state: &mut ProgramState,
    ) -> RenderResult<()> {
        let mut handles = Vec::with_capacity(state.shaders.len());
        for shader in &state.shaders {
            shaders.make_valid(backend, shader)?;
            let handle = shader
                .handle()
                .ok_or_else(|| RenderError::ShaderCreationFailed(shader.path().to_string()))?;
            handles.push(handle);
        }

        let handle = match state.handle {
            Some(handle) => handle,
            None => {
                let handle = backend.create_program().ok_or(RenderError::ProgramCreationFailed)?;
                state.handle = Some(handle);
                state.status = ProgramStatus::Created;
                handle
            }
        };

        let uniforms = backend
            .link_program(handle, &handles)
            .map_err(|log| RenderError::ProgramLinkFailed {
                program: program.id.to_string(),
                log,
            })?;

        state.uniforms.clear();
        state.samplers.clear();
        for info in uniforms {
            if let Some(unit) = info.texture_unit {
                state.samplers.insert(unit, info.name.clone());
            }
            state.uniforms.insert(info.name.clone(), info);
        }
        state.status = ProgramStatus::Linked;
        state.generation += 1;
        log::debug!(
            "linked {} with {} active uniforms",
            program.id,
            state.uniforms.len()
        );
        Ok(())
    }

    /// Attach `shader`; a linked program has to be relinked.
    pub fn add_shader(&self, program: &Program, shader: Arc<Shader>) -> bool {
        let mut state = program.state.lock();
        if state.shaders.iter().any(|s| Arc::ptr_eq(s, &shader)) {
            return false;
        }
        state.shaders.push(shader);
        program.invalidate(&mut state);
        true
    }

    /// Detach `shader`; the program is no longer valid until relinked.
    pub fn remove_shader(&self, program: &Program, shader: &Shader) -> bool {
        let mut state = program.state.lock();
        let before = state.shaders.len();
        state.shaders.retain(|s| !std::ptr::eq(Arc::as_ptr(s), shader));
        if state.shaders.len() == before {
            return false;
        }
        log::debug!("removed shader '{}' from {}", shader.path(), program.id);
        program.invalidate(&mut state);
        true
    }

    /// Detach `shader` from every program using it.
    pub fn shader_removed(&self, shader: &Shader) -> usize {
        self.programs
            .iter()
            .filter(|program| self.remove_shader(program, shader))
            .count()
    }

    /// Unregister `program` and release its backend object.
    pub fn remove<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, program: &Program) -> bool {
        let Some(index) = self
            .programs
            .iter()
            .position(|p| std::ptr::eq(Arc::as_ptr(p), program))
        else {
            return false;
        };
        self.programs.swap_remove(index);

        let mut state = program.state.lock();
        if let Some(handle) = state.handle.take() {
            backend.destroy_program(handle);
        }
        state.status = ProgramStatus::Invalid;
        program.invalidate(&mut state);
        true
    }

    /// Release every program.
    pub fn clear<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        for program in self.programs.drain(..) {
            if let Some(handle) = program.state.lock().handle.take() {
                backend.destroy_program(handle);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

static_assertions::assert_impl_all!(Program: Send, Sync);
