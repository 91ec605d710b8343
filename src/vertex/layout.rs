//! Vertex layouts and the registered vertex types.

use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::mem::{offset_of, size_of};

/// Meaning of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeSemantic {
    Position,
    Normal,
    TexCoord,
    Color,
}

/// Scalar type of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    Float32,
    /// Unsigned byte, normalized to `[0, 1]`.
    Unorm8,
}

impl AttributeType {
    /// Size of the attribute in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Unorm8 => 1,
        }
    }
}

/// One attribute inside a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub semantic: AttributeSemantic,
    pub ty: AttributeType,
    pub components: usize,
    pub offset: usize,
}

/// Memory layout of one vertex.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub name: &'static str,
    /// Size of one vertex in bytes.
    pub size: usize,
    pub attributes: &'static [VertexAttribute],
}

impl VertexLayout {
    /// Attribute carrying `semantic`, if the layout has one.
    pub fn attribute(&self, semantic: AttributeSemantic) -> Option<&VertexAttribute> {
        self.attributes.iter().find(|a| a.semantic == semantic)
    }
}

impl fmt::Display for VertexLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[size = {}", self.name, self.size)?;
        for attribute in self.attributes {
            write!(
                f,
                ", {:?}: {}x{:?} @ {}",
                attribute.semantic, attribute.components, attribute.ty, attribute.offset
            )?;
        }
        write!(f, "]")
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Vertex types the data layer knows how to reinterpret raw memory as.
pub trait VertexType: Pod + sealed::Sealed {
    fn layout() -> &'static VertexLayout;
}

/// 3D vertex with normal, texture coordinate and color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex3D {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coord: [f32; 2],
    pub color: [f32; 3],
}

/// 2D vertex with texture coordinate and byte color.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex2D {
    pub position: [f32; 2],
    pub tex_coord: [f32; 2],
    pub color: [u8; 4],
}

static VERTEX_3D_LAYOUT: VertexLayout = VertexLayout {
    name: "Vertex3D",
    size: size_of::<Vertex3D>(),
    attributes: &[
        VertexAttribute {
            semantic: AttributeSemantic::Position,
            ty: AttributeType::Float32,
            components: 3,
            offset: offset_of!(Vertex3D, position),
        },
        VertexAttribute {
            semantic: AttributeSemantic::Normal,
            ty: AttributeType::Float32,
            components: 3,
            offset: offset_of!(Vertex3D, normal),
        },
        VertexAttribute {
            semantic: AttributeSemantic::TexCoord,
            ty: AttributeType::Float32,
            components: 2,
            offset: offset_of!(Vertex3D, tex_coord),
        },
        VertexAttribute {
            semantic: AttributeSemantic::Color,
            ty: AttributeType::Float32,
            components: 3,
            offset: offset_of!(Vertex3D, color),
        },
    ],
};

static VERTEX_2D_LAYOUT: VertexLayout = VertexLayout {
    name: "Vertex2D",
    size: size_of::<Vertex2D>(),
    attributes: &[
        VertexAttribute {
            semantic: AttributeSemantic::Position,
            ty: AttributeType::Float32,
            components: 2,
            offset: offset_of!(Vertex2D, position),
        },
        VertexAttribute {
            semantic: AttributeSemantic::TexCoord,
            ty: AttributeType::Float32,
            components: 2,
            offset: offset_of!(Vertex2D, tex_coord),
        },
        VertexAttribute {
            semantic: AttributeSemantic::Color,
            ty: AttributeType::Unorm8,
            components: 4,
            offset: offset_of!(Vertex2D, color),
        },
    ],
};

impl sealed::Sealed for Vertex3D {}
impl sealed::Sealed for Vertex2D {}

impl VertexType for Vertex3D {
    fn layout() -> &'static VertexLayout {
        &VERTEX_3D_LAYOUT
    }
}

impl VertexType for Vertex2D {
    fn layout() -> &'static VertexLayout {
        &VERTEX_2D_LAYOUT
    }
}
