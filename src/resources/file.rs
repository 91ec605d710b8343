//! File handles consumed by the resource managers.

use crate::error::{RenderError, RenderResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A named blob of bytes. Managers identify files by [`File::path`].
pub trait File: Send + Sync + fmt::Debug {
    /// Name the file is identified and reported by.
    fn path(&self) -> &str;

    /// Full content of the file.
    fn read(&self) -> RenderResult<Vec<u8>>;

    /// Content decoded as UTF-8 text.
    fn read_to_string(&self) -> RenderResult<String> {
        let bytes = self.read()?;
        String::from_utf8(bytes).map_err(|err| RenderError::InvalidTextEncoding {
            path: self.path().to_string(),
            reason: err.to_string(),
        })
    }
}

/// Shared handle to a file.
pub type FileRef = Arc<dyn File>;

/// A file on the local file system.
#[derive(Debug, Clone)]
pub struct DiskFile {
    path: PathBuf,
    name: String,
}

impl DiskFile {
    /// File at `path`, read lazily.
    pub fn new<P: AsRef<Path>>(path: P) -> Arc<Self> {
        let path = path.as_ref().to_path_buf();
        let name = path.to_string_lossy().into_owned();
        Arc::new(Self { path, name })
    }
}

impl File for DiskFile {
    fn path(&self) -> &str {
        &self.name
    }

    fn read(&self) -> RenderResult<Vec<u8>> {
        std::fs::read(&self.path).map_err(|err| RenderError::FileNotFound {
            path: self.name.clone(),
            reason: err.to_string(),
        })
    }
}

/// A file whose content is held in memory.
#[derive(Debug, Clone)]
pub struct MemoryFile {
    path: String,
    content: Vec<u8>,
}

impl MemoryFile {
    /// In-memory file named `path` holding `content`.
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            content: content.into(),
        })
    }
}

impl File for MemoryFile {
    fn path(&self) -> &str {
        &self.path
    }

    fn read(&self) -> RenderResult<Vec<u8>> {
        Ok(self.content.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_file_reads_content() {
        let file = MemoryFile::new("shaders/a.vert", "void main() {}");
        assert_eq!(file.path(), "shaders/a.vert");
        assert_eq!(file.read_to_string().unwrap(), "void main() {}");
    }

    #[test]
    fn missing_disk_file_fails() {
        let file = DiskFile::new("/nonexistent/render-core/missing.vert");
        match file.read() {
            Err(RenderError::FileNotFound { path, .. }) => assert!(path.ends_with("missing.vert")),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn invalid_utf8_is_an_encoding_error() {
        let file = MemoryFile::new("latin1.frag", vec![b'v', 0xe9, b'c']);
        assert!(file.read().is_ok());
        match file.read_to_string() {
            Err(RenderError::InvalidTextEncoding { path, reason }) => {
                assert_eq!(path, "latin1.frag");
                assert!(reason.contains("utf-8"), "{reason}");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
