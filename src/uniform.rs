//! Uniform variable values.

use crate::error::{RenderError, RenderResult};
use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};
use std::fmt;

/// Shape of a uniform variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum UniformType {
    #[default]
    Invalid,
    Float,
    Int,
    Bool,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
    FloatArray,
    IntArray,
    BoolArray,
    Vec2Array,
    Vec3Array,
    Vec4Array,
    Mat2Array,
    Mat3Array,
    Mat4Array,
}

impl UniformType {
    /// Element type of an array type, `self` otherwise.
    pub fn element(self) -> Self {
        match self {
            Self::FloatArray => Self::Float,
            Self::IntArray => Self::Int,
            Self::BoolArray => Self::Bool,
            Self::Vec2Array => Self::Vec2,
            Self::Vec3Array => Self::Vec3,
            Self::Vec4Array => Self::Vec4,
            Self::Mat2Array => Self::Mat2,
            Self::Mat3Array => Self::Mat3,
            Self::Mat4Array => Self::Mat4,
            other => other,
        }
    }

    /// Array type holding elements of `self`.
    pub fn array(self) -> Self {
        match self {
            Self::Float => Self::FloatArray,
            Self::Int => Self::IntArray,
            Self::Bool => Self::BoolArray,
            Self::Vec2 => Self::Vec2Array,
            Self::Vec3 => Self::Vec3Array,
            Self::Vec4 => Self::Vec4Array,
            Self::Mat2 => Self::Mat2Array,
            Self::Mat3 => Self::Mat3Array,
            Self::Mat4 => Self::Mat4Array,
            other => other,
        }
    }

    /// Whether values of this type hold several elements.
    pub fn is_array(self) -> bool {
        self.element() != self
    }

    /// Parse a GLSL type name. Samplers are integer uniforms.
    pub fn from_glsl(name: &str) -> Option<Self> {
        Some(match name {
            "float" => Self::Float,
            "int" | "sampler2D" | "samplerCube" => Self::Int,
            "bool" => Self::Bool,
            "vec2" => Self::Vec2,
            "vec3" => Self::Vec3,
            "vec4" => Self::Vec4,
            "mat2" => Self::Mat2,
            "mat3" => Self::Mat3,
            "mat4" => Self::Mat4,
            _ => return None,
        })
    }
}

impl fmt::Display for UniformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Value of a uniform variable.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum UniformValue {
    #[default]
    Invalid,
    Float(f32),
    Int(i32),
    Bool(bool),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat2(Mat2),
    Mat3(Mat3),
    Mat4(Mat4),
    FloatArray(Vec<f32>),
    IntArray(Vec<i32>),
    BoolArray(Vec<bool>),
    Vec2Array(Vec<Vec2>),
    Vec3Array(Vec<Vec3>),
    Vec4Array(Vec<Vec4>),
    Mat2Array(Vec<Mat2>),
    Mat3Array(Vec<Mat3>),
    Mat4Array(Vec<Mat4>),
}

impl UniformValue {
    /// Type of the held value.
    pub fn ty(&self) -> UniformType {
        match self {
            Self::Invalid => UniformType::Invalid,
            Self::Float(_) => UniformType::Float,
            Self::Int(_) => UniformType::Int,
            Self::Bool(_) => UniformType::Bool,
            Self::Vec2(_) => UniformType::Vec2,
            Self::Vec3(_) => UniformType::Vec3,
            Self::Vec4(_) => UniformType::Vec4,
            Self::Mat2(_) => UniformType::Mat2,
            Self::Mat3(_) => UniformType::Mat3,
            Self::Mat4(_) => UniformType::Mat4,
            Self::FloatArray(_) => UniformType::FloatArray,
            Self::IntArray(_) => UniformType::IntArray,
            Self::BoolArray(_) => UniformType::BoolArray,
            Self::Vec2Array(_) => UniformType::Vec2Array,
            Self::Vec3Array(_) => UniformType::Vec3Array,
            Self::Vec4Array(_) => UniformType::Vec4Array,
            Self::Mat2Array(_) => UniformType::Mat2Array,
            Self::Mat3Array(_) => UniformType::Mat3Array,
            Self::Mat4Array(_) => UniformType::Mat4Array,
        }
    }

    /// Whether the value holds anything.
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// Number of elements, 1 for non-array values and 0 for `Invalid`.
    pub fn len(&self) -> usize {
        match self {
            Self::Invalid => 0,
            Self::FloatArray(v) => v.len(),
            Self::IntArray(v) => v.len(),
            Self::BoolArray(v) => v.len(),
            Self::Vec2Array(v) => v.len(),
            Self::Vec3Array(v) => v.len(),
            Self::Vec4Array(v) => v.len(),
            Self::Mat2Array(v) => v.len(),
            Self::Mat3Array(v) => v.len(),
            Self::Mat4Array(v) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Typed copy of the stored value.
    ///
    /// Fails if the value was stored with a different type.
    pub fn get<T: UniformData>(&self) -> RenderResult<T> {
        T::from_value(self).ok_or_else(|| RenderError::UniformTypeMismatch {
            requested: T::TYPE.to_string(),
            stored: self.ty().to_string(),
        })
    }
}

impl fmt::Display for UniformValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => write!(f, "Invalid"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Vec2(v) => write!(f, "{v}"),
            Self::Vec3(v) => write!(f, "{v}"),
            Self::Vec4(v) => write!(f, "{v}"),
            Self::Mat2(v) => write!(f, "{v}"),
            Self::Mat3(v) => write!(f, "{v}"),
            Self::Mat4(v) => write!(f, "{v}"),
            other => write!(f, "{}[{}]", other.ty().element(), other.len()),
        }
    }
}

/// Rust types storable in a [`UniformValue`].
pub trait UniformData: Sized {
    const TYPE: UniformType;

    fn into_value(self) -> UniformValue;

    fn from_value(value: &UniformValue) -> Option<Self>;
}

macro_rules! uniform_data {
    ($ty:ty, $variant:ident) => {
        impl UniformData for $ty {
            const TYPE: UniformType = UniformType::$variant;

            fn into_value(self) -> UniformValue {
                UniformValue::$variant(self)
            }

            fn from_value(value: &UniformValue) -> Option<Self> {
                match value {
                    UniformValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }

        impl From<$ty> for UniformValue {
            fn from(value: $ty) -> Self {
                UniformValue::$variant(value)
            }
        }
    };
}

uniform_data!(f32, Float);
uniform_data!(i32, Int);
uniform_data!(bool, Bool);
uniform_data!(Vec2, Vec2);
uniform_data!(Vec3, Vec3);
uniform_data!(Vec4, Vec4);
uniform_data!(Mat2, Mat2);
uniform_data!(Mat3, Mat3);
uniform_data!(Mat4, Mat4);
uniform_data!(Vec<f32>, FloatArray);
uniform_data!(Vec<i32>, IntArray);
uniform_data!(Vec<bool>, BoolArray);
uniform_data!(Vec<Vec2>, Vec2Array);
uniform_data!(Vec<Vec3>, Vec3Array);
uniform_data!(Vec<Vec4>, Vec4Array);
uniform_data!(Vec<Mat2>, Mat2Array);
uniform_data!(Vec<Mat3>, Mat3Array);
uniform_data!(Vec<Mat4>, Mat4Array);

/// An active uniform of a linked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformInfo {
    pub name: String,
    pub ty: UniformType,
    /// 1 for non-array uniforms.
    pub array_len: usize,
    /// Backend location.
    pub location: i32,
    /// Texture unit for samplers named `tex<unit>_...`.
    pub texture_unit: Option<u32>,
}

impl UniformInfo {
    pub fn new(name: impl Into<String>, ty: UniformType, array_len: usize, location: i32) -> Self {
        let name = name.into();
        let texture_unit = sampler_unit(&name);
        Self {
            name,
            ty,
            array_len,
            location,
            texture_unit,
        }
    }

    /// Whether `value` can be assigned to this uniform.
    pub fn accepts(&self, value: &UniformValue) -> bool {
        value.ty() == self.ty && (!self.ty.is_array() || value.len() <= self.array_len)
    }
}

/// Texture unit encoded in a sampler name of the form `tex<unit>_<name>`.
pub fn sampler_unit(name: &str) -> Option<u32> {
    let rest = name.strip_prefix("tex")?;
    let (unit, suffix) = rest.split_once('_')?;
    if suffix.is_empty() {
        return None;
    }
    unit.parse().ok()
}
