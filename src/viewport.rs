//! Viewport geometry and change listeners.

use crate::backend::ViewportRect;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Reacts to viewport geometry changes.
pub trait ViewportListener: Send {
    fn viewport_geometry_changed(&mut self, viewport: &Viewport);
}

/// Weakly held listeners of type `L`.
///
/// Registration returns `false` instead of failing when a listener is
/// already present (or missing, for removal). Dropped listeners are pruned
/// on the next notification.
pub struct Listeners<L: ?Sized> {
    entries: Vec<Weak<Mutex<L>>>,
}

impl<L: ?Sized> Default for Listeners<L> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<L: ?Sized> Listeners<L> {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, listener: &Arc<Mutex<L>>) -> Option<usize> {
        let target = Arc::as_ptr(listener) as *const ();
        self.entries
            .iter()
            .position(|entry| entry.as_ptr() as *const () == target)
    }

    pub fn add_listener(&mut self, listener: &Arc<Mutex<L>>) -> bool {
        if self.position(listener).is_some() {
            return false;
        }
        self.entries.push(Arc::downgrade(listener));
        true
    }

    pub fn remove_listener(&mut self, listener: &Arc<Mutex<L>>) -> bool {
        match self.position(listener) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Call `f` on every live listener in registration order.
    pub fn notify(&mut self, mut f: impl FnMut(&mut L)) {
        self.entries.retain(|entry| match entry.upgrade() {
            Some(listener) => {
                f(&mut listener.lock());
                true
            }
            None => false,
        });
    }

    /// Number of registered listeners, live or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Drawable area of a window.
pub struct Viewport {
    rect: ViewportRect,
    aspect_ratio: Option<f32>,
    listeners: Listeners<dyn ViewportListener>,
}

impl Viewport {
    /// Viewport covering `rect` with no listeners.
    pub fn new(rect: ViewportRect) -> Self {
        Self {
            rect,
            aspect_ratio: None,
            listeners: Listeners::new(),
        }
    }

    /// Current geometry.
    pub fn rect(&self) -> ViewportRect {
        self.rect
    }

    /// Width over height, recomputed after every geometry change.
    pub fn aspect_ratio(&mut self) -> f32 {
        let rect = self.rect;
        *self.aspect_ratio.get_or_insert_with(|| {
            if rect.height == 0 {
                1.0
            } else {
                rect.width as f32 / rect.height as f32
            }
        })
    }

    /// Change the geometry and notify listeners if it differs.
    pub fn set_geometry(&mut self, rect: ViewportRect) {
        if rect == self.rect {
            return;
        }
        log::debug!("viewport resized to {rect}");
        self.rect = rect;
        self.aspect_ratio = None;

        let mut listeners = std::mem::take(&mut self.listeners);
        listeners.notify(|listener| listener.viewport_geometry_changed(self));
        self.listeners = listeners;
    }

    /// Notify `listener` of geometry changes until it is dropped.
    pub fn add_listener(&mut self, listener: &Arc<Mutex<dyn ViewportListener>>) -> bool {
        self.listeners.add_listener(listener)
    }

    pub fn remove_listener(&mut self, listener: &Arc<Mutex<dyn ViewportListener>>) -> bool {
        self.listeners.remove_listener(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        seen: Vec<ViewportRect>,
    }

    impl ViewportListener for Recorder {
        fn viewport_geometry_changed(&mut self, viewport: &Viewport) {
            self.seen.push(viewport.rect());
        }
    }

    #[test]
    fn registration_reports_duplicates() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let listener: Arc<Mutex<dyn ViewportListener>> = recorder.clone();
        let mut viewport = Viewport::new(ViewportRect::new(0, 0, 800, 600));

        assert!(viewport.add_listener(&listener));
        assert!(!viewport.add_listener(&listener));
        assert!(viewport.remove_listener(&listener));
        assert!(!viewport.remove_listener(&listener));
    }

    #[test]
    fn resize_notifies_and_invalidates_aspect_ratio() {
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let listener: Arc<Mutex<dyn ViewportListener>> = recorder.clone();
        let mut viewport = Viewport::new(ViewportRect::new(0, 0, 800, 600));
        viewport.add_listener(&listener);

        assert!((viewport.aspect_ratio() - 4.0 / 3.0).abs() < 1e-6);
        viewport.set_geometry(ViewportRect::new(0, 0, 1920, 1080));
        viewport.set_geometry(ViewportRect::new(0, 0, 1920, 1080));
        assert!((viewport.aspect_ratio() - 16.0 / 9.0).abs() < 1e-6);
        assert_eq!(recorder.lock().seen, vec![ViewportRect::new(0, 0, 1920, 1080)]);
    }

    #[test]
    fn dropped_listeners_are_pruned() {
        let mut viewport = Viewport::new(ViewportRect::default());
        {
            let listener: Arc<Mutex<dyn ViewportListener>> = Arc::new(Mutex::new(Recorder::default()));
            viewport.add_listener(&listener);
        }
        viewport.set_geometry(ViewportRect::new(0, 0, 1, 1));
        assert!(viewport.listeners.is_empty());
    }
}
