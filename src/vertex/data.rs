//! Vertex and index buffers paired for drawing.

use super::layout::{AttributeSemantic, AttributeType, VertexLayout, VertexType};
use crate::backend::RenderBackend;
use crate::buffer::{Buffer, BufferKind, LockOption, UsageHint};
use glam::Vec3;
use parking_lot::Mutex;
use std::fmt;

/// Primitive assembly mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawMode {
    #[default]
    Triangles,
    TriangleStrip,
    Lines,
    Points,
}

/// Width of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexType {
    UInt16,
    #[default]
    UInt32,
}

impl IndexType {
    /// Size of one index in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::UInt16 => 2,
            Self::UInt32 => 4,
        }
    }
}

/// Identity of a vertex data object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexDataId(pub(crate) u64);

impl fmt::Display for VertexDataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VertexData[{}]", self.0)
    }
}

/// How to allocate a [`VertexData`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexDataParameter {
    pub draw_mode: DrawMode,
    pub layout: &'static VertexLayout,
    pub num_vertices: usize,
    /// No index buffer is allocated when zero.
    pub num_indices: usize,
    pub index_type: IndexType,
    pub usage: UsageHint,
    pub use_vertex_shadow_buffer: bool,
    pub use_index_shadow_buffer: bool,
}

impl VertexDataParameter {
    /// Parameters for `num_vertices` of `V`, without indices if `num_indices` is zero.
    pub fn new<V: VertexType>(num_vertices: usize, num_indices: usize) -> Self {
        Self {
            draw_mode: DrawMode::Triangles,
            layout: V::layout(),
            num_vertices,
            num_indices,
            index_type: IndexType::UInt32,
            usage: UsageHint::STATIC_WRITE_ONLY,
            use_vertex_shadow_buffer: true,
            use_index_shadow_buffer: false,
        }
    }

    pub fn with_draw_mode(mut self, draw_mode: DrawMode) -> Self {
        self.draw_mode = draw_mode;
        self
    }

    pub fn with_index_type(mut self, index_type: IndexType) -> Self {
        self.index_type = index_type;
        self
    }

    pub fn with_usage(mut self, usage: UsageHint) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_shadow_buffers(mut self, vertex: bool, index: bool) -> Self {
        self.use_vertex_shadow_buffer = vertex;
        self.use_index_shadow_buffer = index;
        self
    }
}

/// Vertex storage with a known layout.
#[derive(Debug)]
pub struct VertexBuffer {
    buffer: Buffer,
    layout: &'static VertexLayout,
}

impl VertexBuffer {
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn layout(&self) -> &'static VertexLayout {
        self.layout
    }

    pub fn num_vertices(&self) -> usize {
        self.buffer.len() / self.layout.size
    }
}

/// Index storage.
#[derive(Debug)]
pub struct IndexBuffer {
    buffer: Buffer,
    index_type: IndexType,
}

impl IndexBuffer {
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn num_indices(&self) -> usize {
        self.buffer.len() / self.index_type.size()
    }
}

#[derive(Debug)]
struct Buffers {
    vertex: VertexBuffer,
    index: Option<IndexBuffer>,
}

/// A vertex buffer and an optional index buffer drawn together.
///
/// Raw vertex memory is only reachable through [`VertexData::modify`] and
/// [`VertexData::read_vertices`], which check the layout of the requested
/// vertex type against the one the data was allocated with.
#[derive(Debug)]
pub struct VertexData {
    id: VertexDataId,
    draw_mode: DrawMode,
    layout: &'static VertexLayout,
    buffers: Mutex<Buffers>,
}

impl VertexData {
    /// Allocate device storage on `backend` as described by `param`.
    pub fn new<B: RenderBackend + ?Sized>(id: VertexDataId, backend: &mut B, param: &VertexDataParameter) -> Self {
        let mut vertex = Buffer::new(BufferKind::Vertex, backend.create_buffer_storage(BufferKind::Vertex));
        if param.use_vertex_shadow_buffer {
            vertex.set_shadow_buffer(Buffer::new_host());
        }
        vertex.allocate(param.num_vertices * param.layout.size, param.usage);

        let index = (param.num_indices > 0).then(|| {
            let mut index = Buffer::new(BufferKind::Index, backend.create_buffer_storage(BufferKind::Index));
            if param.use_index_shadow_buffer {
                index.set_shadow_buffer(Buffer::new_host());
            }
            index.allocate(param.num_indices * param.index_type.size(), param.usage);
            IndexBuffer {
                buffer: index,
                index_type: param.index_type,
            }
        });

        log::debug!(
            "allocated {id}: {} x {}, {} indices",
            param.num_vertices,
            param.layout.name,
            param.num_indices
        );

        Self {
            id,
            draw_mode: param.draw_mode,
            layout: param.layout,
            buffers: Mutex::new(Buffers {
                vertex: VertexBuffer {
                    buffer: vertex,
                    layout: param.layout,
                },
                index,
            }),
        }
    }

    /// Identity of the vertex data.
    pub fn id(&self) -> VertexDataId {
        self.id
    }

    pub fn draw_mode(&self) -> DrawMode {
        self.draw_mode
    }

    pub fn layout(&self) -> &'static VertexLayout {
        self.layout
    }

    pub fn num_vertices(&self) -> usize {
        self.buffers.lock().vertex.num_vertices()
    }

    pub fn num_indices(&self) -> usize {
        self.buffers.lock().index.as_ref().map_or(0, IndexBuffer::num_indices)
    }

    /// Whether drawing goes through indices.
    pub fn has_index_buffer(&self) -> bool {
        self.buffers.lock().index.is_some()
    }

    pub fn index_type(&self) -> Option<IndexType> {
        self.buffers.lock().index.as_ref().map(IndexBuffer::index_type)
    }

    /// Lock the vertices as `V` and hand them to `f`.
    ///
    /// # Panics
    ///
    /// Panics if `V` is not the vertex type the data was allocated with.
    pub fn modify<V: VertexType, R>(&self, f: impl FnOnce(&mut [V]) -> R) -> R {
        self.check_layout::<V>();
        let mut buffers = self.buffers.lock();
        let mut guard = buffers.vertex.buffer.guard(LockOption::Normal);
        f(guard.as_slice_mut::<V>())
    }

    /// Lock the vertices read-only as `V` and hand them to `f`.
    ///
    /// # Panics
    ///
    /// Panics if `V` is not the vertex type the data was allocated with.
    pub fn read_vertices<V: VertexType, R>(&self, f: impl FnOnce(&[V]) -> R) -> R {
        self.check_layout::<V>();
        let mut buffers = self.buffers.lock();
        let mut guard = buffers.vertex.buffer.guard(LockOption::ReadOnly);
        f(guard.as_slice::<V>())
    }

    /// Overwrite the index buffer starting at index `first`.
    ///
    /// # Panics
    ///
    /// Panics if there is no index buffer, the range is out of bounds, or an
    /// index does not fit a 16-bit index buffer.
    pub fn write_indices(&self, first: usize, indices: &[u32]) {
        let mut buffers = self.buffers.lock();
        let Some(index) = buffers.index.as_mut() else {
            panic!("{} has no index buffer", self.id);
        };
        let size = index.index_type.size();
        let bytes: Vec<u8> = match index.index_type {
            IndexType::UInt32 => bytemuck::cast_slice(indices).to_vec(),
            IndexType::UInt16 => {
                let narrow: Vec<u16> = indices
                    .iter()
                    .map(|&i| match u16::try_from(i) {
                        Ok(i) => i,
                        Err(_) => panic!("index {i} does not fit into 16 bits"),
                    })
                    .collect();
                bytemuck::cast_slice(&narrow).to_vec()
            }
        };
        index.buffer.write(&bytes, first * size, false);
    }

    /// All indices widened to `u32`, empty without an index buffer.
    pub fn read_indices(&self) -> Vec<u32> {
        let buffers = self.buffers.lock();
        let Some(index) = buffers.index.as_ref() else {
            return Vec::new();
        };
        let bytes = index.buffer.to_vec();
        match index.index_type {
            IndexType::UInt32 => bytes
                .chunks_exact(4)
                .map(|c| u32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            IndexType::UInt16 => bytes
                .chunks_exact(2)
                .map(|c| u16::from_ne_bytes([c[0], c[1]]) as u32)
                .collect(),
        }
    }

    /// Axis-aligned bounds of the vertex positions, `None` if the vertices
    /// cannot be read back.
    pub fn bounding_box(&self) -> Option<(Vec3, Vec3)> {
        let position = *self.layout.attribute(AttributeSemantic::Position)?;
        if position.ty != AttributeType::Float32 || self.num_vertices() == 0 {
            return None;
        }

        let buffers = self.buffers.lock();
        if !buffers.vertex.buffer.is_readable() {
            return None;
        }
        let bytes = buffers.vertex.buffer.to_vec();
        drop(buffers);

        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for vertex in bytes.chunks_exact(self.layout.size) {
            let mut p = Vec3::ZERO;
            for i in 0..position.components.min(3) {
                let at = position.offset + i * 4;
                p[i] = f32::from_ne_bytes([vertex[at], vertex[at + 1], vertex[at + 2], vertex[at + 3]]);
            }
            min = min.min(p);
            max = max.max(p);
        }
        Some((min, max))
    }

    fn check_layout<V: VertexType>(&self) {
        assert!(
            std::ptr::eq(V::layout(), self.layout),
            "vertex data holds {} vertices, not {}",
            self.layout.name,
            V::layout().name
        );
    }
}

impl fmt::Display for VertexData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buffers = self.buffers.lock();
        write!(
            f,
            "{}[mode = {:?}, layout = {}, vertices = {}",
            self.id,
            self.draw_mode,
            self.layout.name,
            buffers.vertex.num_vertices()
        )?;
        if let Some(index) = buffers.index.as_ref() {
            write!(f, ", indices = {} x {:?}", index.num_indices(), index.index_type)?;
        }
        write!(f, "]")
    }
}

static_assertions::assert_impl_all!(VertexData: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::vertex::{Vertex2D, Vertex3D};

    fn triangle(backend: &mut NullBackend) -> VertexData {
        let param = VertexDataParameter::new::<Vertex3D>(3, 3);
        VertexData::new(VertexDataId(1), backend, &param)
    }

    #[test]
    fn counts_come_from_buffer_sizes() {
        let mut backend = NullBackend::new();
        let data = triangle(&mut backend);
        assert_eq!(data.num_vertices(), 3);
        assert_eq!(data.num_indices(), 3);
        assert_eq!(data.index_type(), Some(IndexType::UInt32));

        let param = VertexDataParameter::new::<Vertex2D>(4, 0);
        let quad = VertexData::new(VertexDataId(2), &mut backend, &param);
        assert!(!quad.has_index_buffer());
        assert_eq!(quad.num_indices(), 0);
        assert!(quad.read_indices().is_empty());
    }

    #[test]
    fn modify_then_read_through_shadow() {
        let mut backend = NullBackend::new();
        let data = triangle(&mut backend);

        data.modify(|vertices: &mut [Vertex3D]| {
            assert_eq!(vertices.len(), 3);
            for (i, v) in vertices.iter_mut().enumerate() {
                v.position = [i as f32, -(i as f32), 0.5];
            }
        });

        let xs = data.read_vertices(|vertices: &[Vertex3D]| {
            vertices.iter().map(|v| v.position[0]).collect::<Vec<_>>()
        });
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);

        let (min, max) = data.bounding_box().unwrap();
        assert_eq!(min, Vec3::new(0.0, -2.0, 0.5));
        assert_eq!(max, Vec3::new(2.0, 0.0, 0.5));
    }

    #[test]
    fn empty_vertex_data_is_accessible() {
        let mut backend = NullBackend::new();
        let param = VertexDataParameter::new::<Vertex3D>(0, 0);
        let data = VertexData::new(VertexDataId(3), &mut backend, &param);

        assert_eq!(data.modify(|vertices: &mut [Vertex3D]| vertices.len()), 0);
        assert_eq!(data.read_vertices(|vertices: &[Vertex3D]| vertices.len()), 0);
        assert!(data.bounding_box().is_none());
    }

    #[test]
    #[should_panic(expected = "holds Vertex3D vertices, not Vertex2D")]
    fn modify_with_wrong_type_panics() {
        let mut backend = NullBackend::new();
        let data = triangle(&mut backend);
        data.modify(|_: &mut [Vertex2D]| {});
    }

    #[test]
    fn sixteen_bit_indices() {
        let mut backend = NullBackend::new();
        let param = VertexDataParameter::new::<Vertex2D>(4, 6)
            .with_index_type(IndexType::UInt16)
            .with_shadow_buffers(true, true);
        let data = VertexData::new(VertexDataId(3), &mut backend, &param);

        data.write_indices(0, &[0, 1, 2, 2, 3, 0]);
        assert_eq!(data.read_indices(), vec![0, 1, 2, 2, 3, 0]);
        data.write_indices(3, &[3, 3, 3]);
        assert_eq!(data.read_indices(), vec![0, 1, 2, 3, 3, 3]);
    }
}
