//! Images and textures.

use super::file::FileRef;
use super::resource::{RenderResource, Resource};
use crate::backend::{RenderBackend, TextureFormat, TextureHandle, TextureParameter};
use crate::error::{RenderError, RenderResult};
use image::{DynamicImage, GenericImageView};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// RGBA pixels ready for upload, rows stored top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

const RGBA: usize = 4;

fn decode_error(name: &str) -> impl FnOnce(image::ImageError) -> RenderError + '_ {
    move |err| RenderError::ImageDecodeFailed {
        path: name.to_string(),
        reason: err.to_string(),
    }
}

impl Image {
    /// Decode the image file at `path`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> RenderResult<Self> {
        let name = path.as_ref().to_string_lossy().into_owned();
        let decoded = image::open(path.as_ref()).map_err(decode_error(&name))?;
        Ok(Self::from_decoded(decoded, name))
    }

    /// Decode an encoded image, guessing the format from its header.
    pub fn from_bytes(bytes: &[u8], name: &str) -> RenderResult<Self> {
        let decoded = image::load_from_memory(bytes).map_err(decode_error(name))?;
        Ok(Self::from_decoded(decoded, name.to_string()))
    }

    fn from_decoded(decoded: DynamicImage, name: String) -> Self {
        let (width, height) = decoded.dimensions();
        Self::rgba(width, height, decoded.into_rgba8().into_raw(), name)
    }

    fn rgba(width: u32, height: u32, data: Vec<u8>, name: String) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * RGBA);
        Self {
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            data,
            name,
        }
    }

    /// A single pixel of `color`.
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self::rgba(1, 1, color.to_vec(), name.to_string())
    }

    /// Opaque white pixel.
    pub fn white() -> Self {
        Self::solid_color([u8::MAX; 4], "white")
    }

    /// A `size` by `size` board of `cell` pixel squares, `even` in the
    /// top-left corner.
    pub fn checkerboard(size: u32, cell: u32, even: [u8; 4], odd: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let side = size as usize;
        let data = (0..size)
            .flat_map(|y| (0..size).map(move |x| (x / cell + y / cell) % 2 == 0))
            .flat_map(|is_even| if is_even { even } else { odd })
            .collect::<Vec<u8>>();
        debug_assert_eq!(data.len(), side * side * RGBA);
        Self::rgba(size, size, data, format!("checkerboard{size}"))
    }

    /// Color at column `x` of row `y`, `None` outside the image or for
    /// formats other than RGBA8.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if self.format.bytes_per_pixel() != RGBA as u32 || x >= self.width || y >= self.height {
            return None;
        }
        let index = y as usize * self.width as usize + x as usize;
        let start = index.checked_mul(RGBA)?;
        let bytes = self.data.get(start..start + RGBA)?;
        bytes.try_into().ok()
    }
}

/// Identity of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Texture[{}]", self.0)
    }
}

#[derive(Debug)]
enum TextureSource {
    File(FileRef),
    Image(Image),
}

/// A texture uploaded on first use.
#[derive(Debug)]
pub struct Texture {
    id: TextureId,
    name: String,
    param: TextureParameter,
    source: TextureSource,
    resource: RenderResource,
    handle: Mutex<Option<TextureHandle>>,
    size: Mutex<(u32, u32)>,
}

impl Texture {
    /// Identity of the texture.
    pub fn id(&self) -> TextureId {
        self.id
    }

    /// File path or image name the texture was created from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sampling parameters used for the upload.
    pub fn param(&self) -> TextureParameter {
        self.param
    }

    /// Backend texture object, `None` until uploaded.
    pub fn handle(&self) -> Option<TextureHandle> {
        *self.handle.lock()
    }

    /// Width and height, known once uploaded.
    pub fn size(&self) -> (u32, u32) {
        *self.size.lock()
    }
}

impl Resource for Texture {
    fn is_valid(&self) -> bool {
        self.resource.is_valid()
    }

    fn rethrow_exception(&self) -> RenderResult<()> {
        self.resource.rethrow_exception()
    }
}

/// Creates one texture per file and sampling parameters.
#[derive(Debug, Default)]
pub struct TextureManager {
    by_file: HashMap<(String, TextureParameter), Arc<Texture>>,
    textures: Vec<Arc<Texture>>,
    next_id: u64,
}

impl TextureManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the texture of `file` with `param`, creating it if needed.
    pub fn create(&mut self, file: FileRef, param: TextureParameter) -> Arc<Texture> {
        let key = (file.path().to_string(), param);
        if let Some(texture) = self.by_file.get(&key) {
            return texture.clone();
        }
        let name = file.path().to_string();
        let texture = self.register(name, param, TextureSource::File(file));
        self.by_file.insert(key, texture.clone());
        texture
    }

    /// Create a texture from an image already in memory.
    pub fn create_from_image(&mut self, image: Image, param: TextureParameter) -> Arc<Texture> {
        let name = image.name.clone();
        self.register(name, param, TextureSource::Image(image))
    }

    fn register(&mut self, name: String, param: TextureParameter, source: TextureSource) -> Arc<Texture> {
        self.next_id += 1;
        let texture = Arc::new(Texture {
            id: TextureId(self.next_id),
            name,
            param,
            source,
            resource: RenderResource::new(),
            handle: Mutex::new(None),
            size: Mutex::new((0, 0)),
        });
        log::debug!("registering {} '{}'", texture.id, texture.name);
        self.textures.push(texture.clone());
        texture
    }

    /// Decode and upload `texture` once.
    pub fn make_valid<B: RenderBackend + ?Sized>(&self, backend: &mut B, texture: &Texture) -> RenderResult<()> {
        texture.resource.make_valid(|| {
            let decoded;
            let image = match &texture.source {
                TextureSource::Image(image) => image,
                TextureSource::File(file) => {
                    decoded = Image::from_bytes(&file.read()?, file.path())?;
                    &decoded
                }
            };
            let handle = backend
                .create_texture(image, &texture.param)
                .ok_or_else(|| RenderError::TextureCreationFailed(texture.name.clone()))?;
            *texture.handle.lock() = Some(handle);
            *texture.size.lock() = (image.width, image.height);
            log::debug!(
                "uploaded {} '{}' ({}x{})",
                texture.id,
                texture.name,
                image.width,
                image.height
            );
            Ok(())
        })
    }

    /// Release every texture.
    pub fn clear<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        self.by_file.clear();
        for texture in self.textures.drain(..) {
            if let Some(handle) = texture.handle.lock().take() {
                backend.destroy_texture(handle);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

static_assertions::assert_impl_all!(Texture: Send, Sync);
