//! "Becomes valid once" lifecycle shared by render resources.

use crate::error::{RenderError, RenderResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Monotonic validity gate around a failable initialization.
///
/// The first successful [`RenderResource::make_valid`] flips the gate to
/// valid for the rest of the object's life. Concurrent callers are
/// serialized on a mutex and re-check the flag, so the initialization
/// body runs at most once per success. A failure is captured and can be
/// retrieved again with [`RenderResource::rethrow_exception`]; the gate
/// stays invalid and a later call may retry.
#[derive(Debug, Default)]
pub struct RenderResource {
    valid: AtomicBool,
    exception: Mutex<Option<RenderError>>,
}

impl RenderResource {
    /// Gate that is not yet valid and holds no failure.
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking check of the validity flag.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// Run `init` unless the gate is already valid.
    pub fn make_valid<F>(&self, init: F) -> RenderResult<()>
    where
        F: FnOnce() -> RenderResult<()>,
    {
        if self.is_valid() {
            return Ok(());
        }

        let mut exception = self.exception.lock();
        if self.is_valid() {
            return Ok(());
        }

        match init() {
            Ok(()) => {
                *exception = None;
                self.valid.store(true, Ordering::Release);
                Ok(())
            }
            Err(err) => {
                log::error!("{err}");
                *exception = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Return the captured initialization failure, if any.
    pub fn rethrow_exception(&self) -> RenderResult<()> {
        match self.exception.lock().as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Whether the last initialization attempt failed.
    pub fn has_exception(&self) -> bool {
        self.exception.lock().is_some()
    }
}

/// Common surface of shaders, programs and textures.
pub trait Resource {
    /// Whether the resource can be used for rendering.
    fn is_valid(&self) -> bool;

    /// Return the failure captured while making the resource valid.
    fn rethrow_exception(&self) -> RenderResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn becomes_valid_once() {
        let resource = RenderResource::new();
        let calls = AtomicUsize::new(0);
        assert!(!resource.is_valid());

        for _ in 0..3 {
            resource
                .make_valid(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }

        assert!(resource.is_valid());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(resource.rethrow_exception().is_ok());
    }

    #[test]
    fn concurrent_make_valid_runs_init_once() {
        let resource = RenderResource::new();
        let calls = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    resource
                        .make_valid(|| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(5));
                            Ok(())
                        })
                        .unwrap();
                    assert!(resource.is_valid());
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_is_captured_and_retryable() {
        let resource = RenderResource::new();
        let err = RenderError::EmptyShaderSource("a.vert".into());

        let result = resource.make_valid(|| Err(err.clone()));
        assert_eq!(result, Err(err.clone()));
        assert!(!resource.is_valid());
        assert!(resource.has_exception());
        assert_eq!(resource.rethrow_exception(), Err(err));

        resource.make_valid(|| Ok(())).unwrap();
        assert!(resource.is_valid());
        assert!(resource.rethrow_exception().is_ok());
    }
}
