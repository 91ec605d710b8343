//! Pipeline state as a plain value.

use crate::resources::{Program, Texture};
use crate::vertex::VertexData;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Depth comparison function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthFunc {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

/// Blend factor applied to source or destination color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Source and destination blend factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendFunc {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl Default for BlendFunc {
    fn default() -> Self {
        Self {
            src: BlendFactor::SrcAlpha,
            dst: BlendFactor::OneMinusSrcAlpha,
        }
    }
}

/// Faces removed by culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    Front,
    #[default]
    Back,
    FrontAndBack,
}

/// Winding order of front faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FrontFace {
    Clockwise,
    #[default]
    CounterClockwise,
}

/// Fixed-function fields of a [`RenderState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateField {
    DepthTest,
    DepthFunc,
    DepthWrite,
    Blend,
    BlendFunc,
    CullFace,
    CullMode,
    FrontFace,
}

impl StateField {
    /// Every fixed-function field, in application order.
    pub const ALL: [StateField; 8] = [
        StateField::DepthTest,
        StateField::DepthFunc,
        StateField::DepthWrite,
        StateField::Blend,
        StateField::BlendFunc,
        StateField::CullFace,
        StateField::CullMode,
        StateField::FrontFace,
    ];
}

/// New value of one fixed-function field, as handed to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateChange {
    DepthTest(bool),
    DepthFunc(DepthFunc),
    DepthWrite(bool),
    Blend(bool),
    BlendFunc(BlendFunc),
    CullFace(bool),
    CullMode(CullMode),
    FrontFace(FrontFace),
}

impl StateChange {
    /// Field this change assigns.
    pub fn field(&self) -> StateField {
        match self {
            Self::DepthTest(_) => StateField::DepthTest,
            Self::DepthFunc(_) => StateField::DepthFunc,
            Self::DepthWrite(_) => StateField::DepthWrite,
            Self::Blend(_) => StateField::Blend,
            Self::BlendFunc(_) => StateField::BlendFunc,
            Self::CullFace(_) => StateField::CullFace,
            Self::CullMode(_) => StateField::CullMode,
            Self::FrontFace(_) => StateField::FrontFace,
        }
    }
}

/// Everything that determines the outcome of a draw call.
///
/// Program, vertex data and textures are weak back-references: a state
/// never keeps the objects it names alive.
#[derive(Debug, Clone)]
pub struct RenderState {
    pub depth_test: bool,
    pub depth_func: DepthFunc,
    pub depth_write: bool,
    pub blend: bool,
    pub blend_func: BlendFunc,
    pub cull_face: bool,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    program: Option<Weak<Program>>,
    vertex_data: Option<Weak<VertexData>>,
    textures: BTreeMap<u32, Weak<Texture>>,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_func: DepthFunc::Less,
            depth_write: true,
            blend: false,
            blend_func: BlendFunc::default(),
            cull_face: true,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            program: None,
            vertex_data: None,
            textures: BTreeMap::new(),
        }
    }
}

impl RenderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `field`.
    pub fn get(&self, field: StateField) -> StateChange {
        match field {
            StateField::DepthTest => StateChange::DepthTest(self.depth_test),
            StateField::DepthFunc => StateChange::DepthFunc(self.depth_func),
            StateField::DepthWrite => StateChange::DepthWrite(self.depth_write),
            StateField::Blend => StateChange::Blend(self.blend),
            StateField::BlendFunc => StateChange::BlendFunc(self.blend_func),
            StateField::CullFace => StateChange::CullFace(self.cull_face),
            StateField::CullMode => StateChange::CullMode(self.cull_mode),
            StateField::FrontFace => StateChange::FrontFace(self.front_face),
        }
    }

    /// Store the value carried by `change`.
    pub fn apply(&mut self, change: StateChange) {
        match change {
            StateChange::DepthTest(v) => self.depth_test = v,
            StateChange::DepthFunc(v) => self.depth_func = v,
            StateChange::DepthWrite(v) => self.depth_write = v,
            StateChange::Blend(v) => self.blend = v,
            StateChange::BlendFunc(v) => self.blend_func = v,
            StateChange::CullFace(v) => self.cull_face = v,
            StateChange::CullMode(v) => self.cull_mode = v,
            StateChange::FrontFace(v) => self.front_face = v,
        }
    }

    /// Bound program, `None` if unset or dropped.
    pub fn program(&self) -> Option<Arc<Program>> {
        self.program.as_ref().and_then(Weak::upgrade)
    }

    pub fn set_program(&mut self, program: &Arc<Program>) {
        self.program = Some(Arc::downgrade(program));
    }

    pub fn clear_program(&mut self) {
        self.program = None;
    }

    /// Bound vertex data, `None` if unset or dropped.
    pub fn vertex_data(&self) -> Option<Arc<VertexData>> {
        self.vertex_data.as_ref().and_then(Weak::upgrade)
    }

    pub fn set_vertex_data(&mut self, data: &Arc<VertexData>) {
        self.vertex_data = Some(Arc::downgrade(data));
    }

    pub fn clear_vertex_data(&mut self) {
        self.vertex_data = None;
    }

    /// Texture on `unit`, `None` if unset or dropped.
    pub fn texture(&self, unit: u32) -> Option<Arc<Texture>> {
        self.textures.get(&unit).and_then(Weak::upgrade)
    }

    /// Bind `texture` to `unit`, replacing any previous binding.
    pub fn set_texture(&mut self, unit: u32, texture: &Arc<Texture>) {
        self.textures.insert(unit, Arc::downgrade(texture));
    }

    /// Unbind `unit`, returning whether anything was bound.
    pub fn remove_texture(&mut self, unit: u32) -> bool {
        self.textures.remove(&unit).is_some()
    }

    pub fn clear_textures(&mut self) {
        self.textures.clear();
    }

    /// Bound texture units in ascending order.
    pub fn texture_units(&self) -> impl Iterator<Item = u32> + '_ {
        self.textures.keys().copied()
    }

    pub(crate) fn program_ref(&self) -> Option<&Weak<Program>> {
        self.program.as_ref()
    }

    pub(crate) fn vertex_data_ref(&self) -> Option<&Weak<VertexData>> {
        self.vertex_data.as_ref()
    }

    pub(crate) fn texture_refs(&self) -> &BTreeMap<u32, Weak<Texture>> {
        &self.textures
    }

    pub(crate) fn set_program_ref(&mut self, program: Option<Weak<Program>>) {
        self.program = program;
    }

    pub(crate) fn set_vertex_data_ref(&mut self, data: Option<Weak<VertexData>>) {
        self.vertex_data = data;
    }

    pub(crate) fn texture_refs_mut(&mut self) -> &mut BTreeMap<u32, Weak<Texture>> {
        &mut self.textures
    }
}

pub(crate) fn same_ref<T>(a: Option<&Weak<T>>, b: Option<&Weak<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Weak::ptr_eq(a, b),
        _ => false,
    }
}

impl PartialEq for RenderState {
    fn eq(&self, other: &Self) -> bool {
        StateField::ALL
            .iter()
            .all(|&field| self.get(field) == other.get(field))
            && same_ref(self.program.as_ref(), other.program.as_ref())
            && same_ref(self.vertex_data.as_ref(), other.vertex_data.as_ref())
            && self.textures.len() == other.textures.len()
            && self
                .textures
                .iter()
                .zip(other.textures.iter())
                .all(|((ua, a), (ub, b))| ua == ub && Weak::ptr_eq(a, b))
    }
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RenderState[")?;
        for field in StateField::ALL {
            writeln!(f, "  {:?}", self.get(field))?;
        }
        match self.program() {
            Some(program) => writeln!(f, "  Program = {}", program.id())?,
            None => writeln!(f, "  Program = null")?,
        }
        match self.vertex_data() {
            Some(data) => writeln!(f, "  VertexData = {}", data.id())?,
            None => writeln!(f, "  VertexData = null")?,
        }
        for (unit, texture) in &self.textures {
            match texture.upgrade() {
                Some(texture) => writeln!(f, "  Texture[{unit}] = {}", texture.id())?,
                None => writeln!(f, "  Texture[{unit}] = dropped")?,
            }
        }
        write!(f, "]")
    }
}
