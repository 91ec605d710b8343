//! Shaders and their deduplicating manager.

use super::file::FileRef;
use super::resource::{RenderResource, Resource};
use crate::backend::{RenderBackend, ShaderHandle, ShaderType};
use crate::error::{RenderError, RenderResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How far a shader has been prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderStatus {
    /// Only the file is known.
    OnDisk,
    /// Source text has been read.
    InMemory,
    /// A backend shader object exists.
    Created,
    /// Source has been compiled.
    Compiled,
}

impl fmt::Display for ShaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
struct ShaderState {
    status: ShaderStatus,
    source: String,
    handle: Option<ShaderHandle>,
}

/// A shader stage loaded from a file.
///
/// A shader removed from its [`ShaderManager`] is dead: it reports itself
/// invalid and refuses to be staged again. Create a new one from the same
/// file instead.
#[derive(Debug)]
pub struct Shader {
    ty: ShaderType,
    file: FileRef,
    resource: RenderResource,
    removed: AtomicBool,
    state: Mutex<ShaderState>,
}

impl Shader {
    fn new(ty: ShaderType, file: FileRef) -> Self {
        Self {
            ty,
            file,
            resource: RenderResource::new(),
            removed: AtomicBool::new(false),
            state: Mutex::new(ShaderState {
                status: ShaderStatus::OnDisk,
                source: String::new(),
                handle: None,
            }),
        }
    }

    /// Pipeline stage of the shader.
    pub fn ty(&self) -> ShaderType {
        self.ty
    }

    /// Path of the source file, unique per manager.
    pub fn path(&self) -> &str {
        self.file.path()
    }

    /// Loading stage reached so far.
    pub fn status(&self) -> ShaderStatus {
        self.state.lock().status
    }

    /// Source text, empty before [`ShaderStatus::InMemory`].
    pub fn source(&self) -> String {
        self.state.lock().source.clone()
    }

    /// Backend shader object, `None` before compilation.
    pub fn handle(&self) -> Option<ShaderHandle> {
        self.state.lock().handle
    }

    /// Whether the shader was removed from its manager.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    fn ensure_alive(&self) -> RenderResult<()> {
        if self.is_removed() {
            return Err(RenderError::ShaderRemoved(self.path().to_string()));
        }
        Ok(())
    }
}

impl Resource for Shader {
    fn is_valid(&self) -> bool {
        !self.is_removed() && self.resource.is_valid()
    }

    fn rethrow_exception(&self) -> RenderResult<()> {
        self.resource.rethrow_exception()
    }
}

impl fmt::Display for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        write!(
            f,
            "Shader[type = {}, path = {}, status = {}, handle = {:?}]",
            self.ty, self.path(), state.status, state.handle
        )
    }
}

/// Creates shaders once per file and stages them on demand.
#[derive(Debug, Default)]
pub struct ShaderManager {
    shaders: HashMap<String, Arc<Shader>>,
}

impl ShaderManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the shader of `file`, creating it if needed, and stage it up to
    /// `requested`.
    ///
    /// # Panics
    ///
    /// Panics if `file` is already registered with a different shader type.
    pub fn create<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        ty: ShaderType,
        file: FileRef,
        requested: ShaderStatus,
    ) -> RenderResult<Arc<Shader>> {
        let shader = match self.shaders.get(file.path()) {
            Some(shader) => {
                assert_eq!(
                    shader.ty, ty,
                    "shader '{}' already registered as {} shader",
                    shader.path(),
                    shader.ty
                );
                shader.clone()
            }
            None => {
                log::debug!("registering {ty} shader '{}'", file.path());
                let shader = Arc::new(Shader::new(ty, file));
                self.shaders.insert(shader.path().to_string(), shader.clone());
                shader
            }
        };

        self.make(backend, &shader, requested)?;
        Ok(shader)
    }

    /// Move `shader` to `requested`.
    ///
    /// Stages between the current and the requested status run in order.
    /// A lower status releases what the higher stages acquired; a shader that
    /// already became valid cannot be downgraded.
    pub fn make<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        shader: &Shader,
        requested: ShaderStatus,
    ) -> RenderResult<()> {
        shader.ensure_alive()?;
        if requested == ShaderStatus::Compiled {
            return self.make_valid(backend, shader);
        }

        let mut state = shader.state.lock();
        if requested < state.status {
            Self::downgrade(backend, shader, &mut state, requested)
        } else {
            Self::advance(backend, shader, &mut state, requested)
        }
    }

    /// Compile `shader` once; later calls return immediately.
    pub fn make_valid<B: RenderBackend + ?Sized>(&self, backend: &mut B, shader: &Shader) -> RenderResult<()> {
        shader.ensure_alive()?;
        shader.resource.make_valid(|| {
            let mut state = shader.state.lock();
            Self::advance(backend, shader, &mut state, ShaderStatus::Compiled)
        })
    }

    fn advance<B: RenderBackend + ?Sized>(
        backend: &mut B,
        shader: &Shader,
        state: &mut ShaderState,
        requested: ShaderStatus,
    ) -> RenderResult<()> {
        while state.status < requested {
            match state.status {
                ShaderStatus::OnDisk => {
                    let source = shader.file.read_to_string()?;
                    if source.trim().is_empty() {
                        return Err(RenderError::EmptyShaderSource(shader.path().to_string()));
                    }
                    state.source = source;
                    state.status = ShaderStatus::InMemory;
                }
                ShaderStatus::InMemory => {
                    let handle = backend
                        .create_shader(shader.ty)
                        .ok_or_else(|| RenderError::ShaderCreationFailed(shader.path().to_string()))?;
                    state.handle = Some(handle);
                    state.status = ShaderStatus::Created;
                }
                ShaderStatus::Created => {
                    let handle = state
                        .handle
                        .ok_or_else(|| RenderError::ShaderCreationFailed(shader.path().to_string()))?;
                    backend.compile_shader(handle, &state.source).map_err(|log| {
                        RenderError::ShaderCompilationFailed {
                            path: shader.path().to_string(),
                            log: annotate_compile_log(&log, &state.source),
                        }
                    })?;
                    log::debug!("compiled {} shader '{}'", shader.ty, shader.path());
                    state.status = ShaderStatus::Compiled;
                }
                ShaderStatus::Compiled => break,
            }
        }
        Ok(())
    }

    fn downgrade<B: RenderBackend + ?Sized>(
        backend: &mut B,
        shader: &Shader,
        state: &mut ShaderState,
        requested: ShaderStatus,
    ) -> RenderResult<()> {
        if shader.resource.is_valid() {
            return Err(RenderError::InvalidStatusTransition {
                path: shader.path().to_string(),
                from: state.status.to_string(),
                to: requested.to_string(),
            });
        }

        if requested < ShaderStatus::Created {
            if let Some(handle) = state.handle.take() {
                backend.destroy_shader(handle);
            }
        }
        if requested < ShaderStatus::InMemory {
            state.source.clear();
        }
        log::debug!("shader '{}' {} -> {}", shader.path(), state.status, requested);
        state.status = requested;
        Ok(())
    }

    /// Look up the shader registered for `path`.
    pub fn get(&self, path: &str) -> Option<Arc<Shader>> {
        self.shaders.get(path).cloned()
    }

    /// Unregister `shader` and release its backend object.
    ///
    /// The shader keeps its source but falls back to
    /// [`ShaderStatus::InMemory`] and is dead from then on.
    pub fn remove<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, shader: &Shader) -> bool {
        match self.shaders.get(shader.path()) {
            Some(registered) if std::ptr::eq(Arc::as_ptr(registered), shader) => {}
            _ => return false,
        }
        self.shaders.remove(shader.path());
        Self::release(backend, shader);
        log::debug!("removed shader '{}'", shader.path());
        true
    }

    /// Release every shader, leaving them all dead.
    pub fn clear<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        for (_, shader) in self.shaders.drain() {
            Self::release(backend, &shader);
        }
    }

    fn release<B: RenderBackend + ?Sized>(backend: &mut B, shader: &Shader) {
        let mut state = shader.state.lock();
        if let Some(handle) = state.handle.take() {
            backend.destroy_shader(handle);
        }
        state.status = state.status.min(ShaderStatus::InMemory);
        shader.removed.store(true, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}

/// Append the offending source line to every log line of the form
/// `<file>(<row>) ...`.
pub fn annotate_compile_log(log: &str, source: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut out = String::new();
    for line in log.lines() {
        out.push_str(line);
        out.push('\n');
        let row = line
            .split_once('(')
            .and_then(|(_, rest)| rest.split_once(')'))
            .and_then(|(row, _)| row.trim().parse::<usize>().ok());
        if let Some(source_line) = row.and_then(|row| row.checked_sub(1)).and_then(|i| lines.get(i)) {
            out.push_str("    > ");
            out.push_str(source_line.trim());
            out.push('\n');
        }
    }
    out.truncate(out.trim_end().len());
    out
}

static_assertions::assert_impl_all!(Shader: Send, Sync);
