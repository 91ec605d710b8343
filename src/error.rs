//! Render error types.

use thiserror::Error;

/// Recoverable failures of the render core.
///
/// Errors are `Clone` so a resource can keep the failure of its
/// initialization around and hand it out again later.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("cannot read file '{path}': {reason}")]
    FileNotFound { path: String, reason: String },
    #[error("file '{path}' is not valid UTF-8: {reason}")]
    InvalidTextEncoding { path: String, reason: String },
    #[error("empty shader source: '{0}'")]
    EmptyShaderSource(String),
    #[error("cannot create shader: '{0}'")]
    ShaderCreationFailed(String),
    #[error("failed to compile shader '{path}':\n{log}")]
    ShaderCompilationFailed { path: String, log: String },
    #[error("shader '{0}' was removed")]
    ShaderRemoved(String),
    #[error("invalid status transition of shader '{path}': {from} -> {to}")]
    InvalidStatusTransition {
        path: String,
        from: String,
        to: String,
    },
    #[error("failed to create program")]
    ProgramCreationFailed,
    #[error("failed to link program {program}: {log}")]
    ProgramLinkFailed { program: String, log: String },
    #[error("failed to decode image '{path}': {reason}")]
    ImageDecodeFailed { path: String, reason: String },
    #[error("failed to create texture '{0}'")]
    TextureCreationFailed(String),
    #[error("invalid type of uniform variable: requested '{requested}', stored '{stored}'")]
    UniformTypeMismatch { requested: String, stored: String },
    #[error("failed to spawn resource thread: {0}")]
    ThreadSpawnFailed(String),
    #[error("render server is shut down")]
    ServerShutdown,
    #[error("future has no shared state")]
    FutureInvalid,
    #[error("task panicked: {0}")]
    TaskPanicked(String),
    #[error("{0}")]
    TaskFailed(String),
}

/// Result of a render core operation.
pub type RenderResult<T> = Result<T, RenderError>;
