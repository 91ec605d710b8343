//! Lockable byte buffers with optional host shadow copies.
//!
//! A [`Buffer`] wraps a [`BufferStorage`] (host memory or a backend device
//! allocation) and enforces the lock discipline: at most one outstanding
//! lock, [`Buffer::get`] only while locked, and every byte range inside
//! `[0, len)`. Violations are caller bugs and panic.
//!
//! Device memory is often write-only. Attaching a shadow buffer keeps a
//! host mirror so the buffer can still be read back and partially updated.

use bitflags::bitflags;
use bytemuck::Pod;
use std::fmt;

bitflags! {
    /// Expected access pattern, used by backends to pick a memory pool.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UsageHint: u32 {
        /// Rarely modified after the first upload.
        const STATIC = 1;
        /// Modified frequently.
        const DYNAMIC = 2;
        /// Never read back by the application.
        const WRITE_ONLY = 4;
        /// Whole content is replaced on every update.
        const DISCARDABLE = 8;

        const STATIC_WRITE_ONLY = Self::STATIC.bits() | Self::WRITE_ONLY.bits();
        const DYNAMIC_WRITE_ONLY = Self::DYNAMIC.bits() | Self::WRITE_ONLY.bits();
        const DYNAMIC_WRITE_ONLY_DISCARDABLE =
            Self::DYNAMIC.bits() | Self::WRITE_ONLY.bits() | Self::DISCARDABLE.bits();
    }
}

impl Default for UsageHint {
    fn default() -> Self {
        Self::STATIC_WRITE_ONLY
    }
}

/// How a buffer is going to be accessed while locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockOption {
    /// Read and write, previous content is preserved.
    #[default]
    Normal,
    /// Previous content may be thrown away.
    Discard,
    /// Content is only read, the buffer is not modified.
    ReadOnly,
    /// Content is only written, previous content is preserved.
    WriteOnly,
}

/// Kind of a buffer, checked before any kind-specific access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Host,
    Vertex,
    Index,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "HostBuffer"),
            Self::Vertex => write!(f, "VertexBuffer"),
            Self::Index => write!(f, "IndexBuffer"),
        }
    }
}

/// Memory behind a [`Buffer`].
///
/// Implementations only deal with raw storage; lock bookkeeping, range
/// checks and shadow mirroring live in [`Buffer`].
pub trait BufferStorage: Send + fmt::Debug {
    /// Resize to `num_bytes`, dropping previous content.
    fn allocate(&mut self, num_bytes: usize, hint: UsageHint);

    /// Size in bytes.
    fn len(&self) -> usize;

    /// Map the storage for CPU access.
    fn lock(&mut self, option: LockOption);

    /// Mapped bytes, only called between `lock` and `unlock`.
    fn mapped(&mut self) -> &mut [u8];

    /// Unmap, flushing writes made through `mapped`.
    fn unlock(&mut self);

    /// Copy `src` into the storage at `offset`.
    fn write(&mut self, src: &[u8], offset: usize, discard: bool);

    /// Copy bytes starting at `offset` into `dest`.
    fn read(&self, offset: usize, dest: &mut [u8]);

    /// Whether `read` is supported without a shadow copy.
    fn is_readable(&self) -> bool {
        true
    }
}

/// Zero-initialized bytes aligned to 8, so locked memory can be viewed as
/// vertex or index elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignedBytes {
    words: Vec<u64>,
    len: usize,
}

impl AlignedBytes {
    /// `len` zero bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(8)],
            len,
        }
    }

    /// Aligned copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut aligned = Self::zeroed(bytes.len());
        aligned.as_mut_slice().copy_from_slice(bytes);
        aligned
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(self.words.as_slice())[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(self.words.as_mut_slice())[..self.len]
    }
}

/// Plain host memory.
#[derive(Debug, Default)]
pub struct HostStorage {
    data: AlignedBytes,
}

impl HostStorage {
    /// Empty host storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Host storage holding a copy of `bytes`.
    pub fn create(bytes: &[u8]) -> Self {
        Self {
            data: AlignedBytes::from_bytes(bytes),
        }
    }

    /// Current content.
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_slice()
    }
}

impl BufferStorage for HostStorage {
    fn allocate(&mut self, num_bytes: usize, _hint: UsageHint) {
        self.data = AlignedBytes::zeroed(num_bytes);
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn lock(&mut self, _option: LockOption) {}

    fn mapped(&mut self) -> &mut [u8] {
        self.data.as_mut_slice()
    }

    fn unlock(&mut self) {}

    fn write(&mut self, src: &[u8], offset: usize, _discard: bool) {
        self.data.as_mut_slice()[offset..offset + src.len()].copy_from_slice(src);
    }

    fn read(&self, offset: usize, dest: &mut [u8]) {
        dest.copy_from_slice(&self.data.as_slice()[offset..offset + dest.len()]);
    }
}

/// A lockable memory region.
pub struct Buffer {
    kind: BufferKind,
    storage: Box<dyn BufferStorage>,
    usage: UsageHint,
    lock: Option<LockOption>,
    shadow: Option<Box<Buffer>>,
    shadow_dirty: bool,
}

impl Buffer {
    /// Create an empty buffer over `storage`.
    pub fn new(kind: BufferKind, storage: Box<dyn BufferStorage>) -> Self {
        Self {
            kind,
            storage,
            usage: UsageHint::default(),
            lock: None,
            shadow: None,
            shadow_dirty: false,
        }
    }

    /// Create an empty host-memory buffer.
    pub fn new_host() -> Self {
        Self::new(BufferKind::Host, Box::new(HostStorage::new()))
    }

    /// Create a host-memory buffer holding a copy of `bytes`.
    pub fn host(bytes: &[u8]) -> Self {
        let mut buffer = Self::new(BufferKind::Host, Box::new(HostStorage::create(bytes)));
        buffer.usage = UsageHint::DYNAMIC;
        buffer
    }

    /// Resize the buffer (and its shadow) to `num_bytes`. Content is lost.
    pub fn allocate(&mut self, num_bytes: usize, usage: UsageHint) {
        assert!(!self.is_locked(), "cannot allocate a locked buffer");
        self.storage.allocate(num_bytes, usage);
        self.usage = usage;
        if let Some(shadow) = self.shadow.as_mut() {
            shadow.allocate(num_bytes, UsageHint::DYNAMIC);
        }
        self.shadow_dirty = false;
    }

    /// Lock the buffer for CPU access.
    ///
    /// With a shadow attached the shadow is locked instead; unless the lock
    /// is read-only the real storage is refreshed from it on [`Self::unlock`].
    ///
    /// # Panics
    ///
    /// Panics if the buffer is already locked.
    pub fn lock(&mut self, option: LockOption) {
        assert!(!self.is_locked(), "buffer is already locked");
        match self.shadow.as_mut() {
            Some(shadow) => {
                shadow.lock(option);
                if option != LockOption::ReadOnly {
                    self.shadow_dirty = true;
                }
            }
            None => self.storage.lock(option),
        }
        self.lock = Some(option);
    }

    /// Locked bytes.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is not locked.
    pub fn get(&mut self) -> &mut [u8] {
        assert!(self.is_locked(), "buffer is not locked");
        match self.shadow.as_mut() {
            Some(shadow) => shadow.get(),
            None => self.storage.mapped(),
        }
    }

    /// Release the lock taken by [`Self::lock`].
    ///
    /// # Panics
    ///
    /// Panics if the buffer is not locked.
    pub fn unlock(&mut self) {
        assert!(self.is_locked(), "buffer is not locked");
        match self.shadow.as_mut() {
            Some(shadow) => {
                shadow.unlock();
                if self.shadow_dirty {
                    self.update_from_shadow();
                }
            }
            None => self.storage.unlock(),
        }
        self.lock = None;
    }

    /// Lock the buffer and unlock it again when the guard is dropped.
    pub fn guard(&mut self, option: LockOption) -> BufferGuard<'_> {
        self.lock(option);
        BufferGuard { buffer: self }
    }

    /// Copy `src` into the buffer at `offset` without a manual lock.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is locked or the range exceeds the buffer.
    pub fn write(&mut self, src: &[u8], offset: usize, discard: bool) {
        assert!(!self.is_locked(), "cannot write to a locked buffer");
        self.check_range(offset, src.len(), "writing");
        if let Some(shadow) = self.shadow.as_mut() {
            shadow.write(src, offset, discard);
        }
        self.storage.write(src, offset, discard);
    }

    /// Copy bytes starting at `offset` into `dest` without a manual lock.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds the buffer, or if the storage is not
    /// readable and no shadow is attached.
    pub fn read(&self, offset: usize, dest: &mut [u8]) {
        self.check_range(offset, dest.len(), "reading");
        match self.shadow.as_ref() {
            Some(shadow) => shadow.read(offset, dest),
            None => {
                assert!(
                    self.storage.is_readable(),
                    "{} is not readable without a shadow buffer",
                    self.kind
                );
                self.storage.read(offset, dest);
            }
        }
    }

    /// Copy the whole buffer into a new vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut bytes = vec![0; self.len()];
        self.read(0, &mut bytes);
        bytes
    }

    /// Attach a host shadow, taking ownership of it.
    ///
    /// The shadow is resized to this buffer's length and starts out zeroed.
    pub fn set_shadow_buffer(&mut self, mut shadow: Buffer) {
        assert!(!self.is_locked(), "cannot attach a shadow to a locked buffer");
        assert_eq!(shadow.kind, BufferKind::Host, "shadow buffer must live in host memory");
        assert!(!shadow.has_shadow_buffer(), "shadow buffers cannot be nested");
        if shadow.len() != self.len() {
            shadow.allocate(self.len(), UsageHint::DYNAMIC);
        }
        self.shadow = Some(Box::new(shadow));
        self.shadow_dirty = false;
    }

    /// Copy the shadow content to the real storage.
    pub fn update_from_shadow(&mut self) {
        if let Some(shadow) = self.shadow.as_ref() {
            let bytes = shadow.to_vec();
            self.storage.write(&bytes, 0, true);
        }
        self.shadow_dirty = false;
    }

    /// Whether the storage lives in host or device memory.
    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Update frequency the buffer was created for.
    pub fn usage(&self) -> UsageHint {
        self.usage
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// Option of the active lock, `None` when unlocked.
    pub fn lock_option(&self) -> Option<LockOption> {
        self.lock
    }

    /// Whether [`Self::read`] is supported.
    pub fn is_readable(&self) -> bool {
        self.shadow.is_some() || self.storage.is_readable()
    }

    /// Whether reads are served from a host copy.
    pub fn has_shadow_buffer(&self) -> bool {
        self.shadow.is_some()
    }

    /// Whether the host copy holds writes not yet uploaded.
    pub fn is_shadow_dirty(&self) -> bool {
        self.shadow_dirty
    }

    fn check_range(&self, offset: usize, len: usize, what: &str) {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.len()),
            "out of bound {what}: {offset}+{len} exceeds {} bytes",
            self.len()
        );
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("kind", &self.kind)
            .field("len", &self.len())
            .field("usage", &self.usage)
            .field("lock", &self.lock)
            .field("shadow", &self.shadow.is_some())
            .finish()
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[len = {}, usage = {:?}, shadow = {}]",
            self.kind,
            self.len(),
            self.usage,
            self.has_shadow_buffer()
        )
    }
}

/// RAII lock of a [`Buffer`], unlocked on drop.
pub struct BufferGuard<'a> {
    buffer: &'a mut Buffer,
}

impl BufferGuard<'_> {
    /// Locked bytes.
    pub fn bytes(&mut self) -> &[u8] {
        self.buffer.get()
    }

    /// Locked bytes, writable unless the lock is read-only.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.buffer.get()
    }

    /// View the locked bytes as a slice of `T`.
    ///
    /// # Panics
    ///
    /// Panics if the length is not a multiple of `T`'s size or the memory
    /// is not aligned for `T`.
    pub fn as_slice<T: Pod>(&mut self) -> &[T] {
        let bytes = self.buffer.get();
        if bytes.is_empty() {
            return &[];
        }
        match bytemuck::try_cast_slice(bytes) {
            Ok(slice) => slice,
            Err(err) => panic!("cannot view locked bytes as {}: {err:?}", std::any::type_name::<T>()),
        }
    }

    /// View the locked bytes as a mutable slice of `T`.
    ///
    /// # Panics
    ///
    /// Same conditions as [`Self::as_slice`].
    pub fn as_slice_mut<T: Pod>(&mut self) -> &mut [T] {
        let bytes = self.buffer.get();
        if bytes.is_empty() {
            return &mut [];
        }
        match bytemuck::try_cast_slice_mut(bytes) {
            Ok(slice) => slice,
            Err(err) => panic!("cannot view locked bytes as {}: {err:?}", std::any::type_name::<T>()),
        }
    }
}

impl Drop for BufferGuard<'_> {
    fn drop(&mut self) {
        self.buffer.unlock();
    }
}

static_assertions::assert_impl_all!(Buffer: Send);
