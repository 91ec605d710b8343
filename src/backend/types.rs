//! Value types shared between the render core and its backends.

use std::fmt;

/// Backend implementation selected by [`crate::RenderConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Records calls without touching a GPU.
    #[default]
    Null,
}

/// Handle to a backend shader object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderHandle(pub(crate) u64);

/// Handle to a backend program object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub(crate) u64);

/// Handle to a backend texture object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u64);

macro_rules! raw_handle {
    ($($name:ident),*) => {
        $(
            impl $name {
                /// Wrap a handle value handed out by a backend.
                pub fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }

                /// Value the backend knows this handle by.
                pub fn raw(self) -> u64 {
                    self.0
                }
            }
        )*
    };
}

raw_handle!(ShaderHandle, ProgramHandle, TextureHandle);

/// Shader stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderType {
    Vertex,
    Fragment,
    Geometry,
    Compute,
}

impl fmt::Display for ShaderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Geometry => "geometry",
            Self::Compute => "compute",
        };
        f.write_str(name)
    }
}

/// Pixel format of an image or texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    R8Unorm,
    Rg8Unorm,
    Rgb8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba32Float,
}

impl TextureFormat {
    /// Size of one texel in bytes.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::R8Unorm => 1,
            TextureFormat::Rg8Unorm => 2,
            TextureFormat::Rgb8Unorm => 3,
            TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => 4,
            TextureFormat::Rgba32Float => 16,
        }
    }
}

/// Texture sampling filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilter {
    Nearest,
    #[default]
    Linear,
}

/// Texture coordinate wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureWrap {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

/// Sampling parameters a texture is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureParameter {
    pub filter: TextureFilter,
    pub wrap: TextureWrap,
    pub mipmaps: bool,
}

impl Default for TextureParameter {
    fn default() -> Self {
        Self {
            filter: TextureFilter::Linear,
            wrap: TextureWrap::Repeat,
            mipmaps: true,
        }
    }
}

/// Viewport rectangle in window pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ViewportRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl ViewportRect {
    /// Rectangle with its lower-left corner at `(x, y)`.
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl fmt::Display for ViewportRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}
