//! Shadow copy of the backend pipeline state.

use super::global::GlobalRenderState;
use super::state::{same_ref, RenderState, StateField};
use crate::backend::{RenderBackend, RenderStateHooks, ViewportRect};
use crate::draw_command::DrawCommand;
use crate::resources::{Program, ProgramId};
use crate::uniform::{UniformInfo, UniformValue};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Weak;

/// Uniform name of the model matrix set on every draw.
pub const MODEL_MATRIX_UNIFORM: &str = "u_model_matrix";

#[derive(Debug, Default)]
struct ProgramUniforms {
    generation: u64,
    values: HashMap<String, UniformValue>,
}

/// Mirrors what the backend has bound and forwards only the differences.
///
/// A field the backend has not accepted yet (at startup, after
/// [`RenderStateCache::reset`] or after a rejected hook) is unknown and is
/// reapplied on every [`RenderStateCache::set_render_state`] until a hook
/// succeeds. Texture units forgotten by a reset stay pending until they are
/// disabled or rebound.
///
/// The cache is the only code allowed to touch backend pipeline state. It
/// is not synchronized and must stay on the thread owning the backend.
#[derive(Debug)]
pub struct RenderStateCache {
    current: RenderState,
    viewport: Option<ViewportRect>,
    uniforms: HashMap<ProgramId, ProgramUniforms>,
    unsynced: HashSet<StateField>,
    program_unsynced: bool,
    vertex_data_unsynced: bool,
    stale_units: BTreeSet<u32>,
}

impl Default for RenderStateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderStateCache {
    /// Cache whose every field is unknown until the first update.
    pub fn new() -> Self {
        Self {
            current: RenderState::default(),
            viewport: None,
            uniforms: HashMap::new(),
            unsynced: StateField::ALL.into_iter().collect(),
            program_unsynced: true,
            vertex_data_unsynced: true,
            stale_units: BTreeSet::new(),
        }
    }

    /// State the backend currently has bound.
    pub fn current(&self) -> &RenderState {
        &self.current
    }

    /// Establish a known baseline by applying every default value once.
    pub fn init_state<H: RenderStateHooks + ?Sized>(&mut self, hooks: &mut H) -> bool {
        log::debug!("initializing render state");
        self.reset();
        self.set_render_state(hooks, &RenderState::default())
    }

    /// Forget everything; the next [`Self::set_render_state`] reapplies
    /// every field and disables every texture unit that was bound.
    pub fn reset(&mut self) {
        self.stale_units.extend(self.current.texture_units());
        self.current = RenderState::default();
        self.viewport = None;
        self.uniforms.clear();
        self.unsynced = StateField::ALL.into_iter().collect();
        self.program_unsynced = true;
        self.vertex_data_unsynced = true;
    }

    /// Whether every field has been accepted by the backend.
    pub fn is_synchronized(&self) -> bool {
        self.unsynced.is_empty()
            && !self.program_unsynced
            && !self.vertex_data_unsynced
            && self.stale_units.is_empty()
    }

    /// Drop the cached uniform values of `program`.
    pub fn reset_uniforms(&mut self, program: ProgramId) {
        self.uniforms.remove(&program);
    }

    /// Bring the backend to `state`, issuing only what changed.
    ///
    /// Fixed-function fields go first, then the program, the vertex data and
    /// finally the textures. A rejected field keeps its previous value and
    /// makes the call return `false`; the other fields are still applied.
    pub fn set_render_state<H: RenderStateHooks + ?Sized>(
        &mut self,
        hooks: &mut H,
        state: &RenderState,
    ) -> bool {
        let mut success = true;

        for field in StateField::ALL {
            let change = state.get(field);
            if !self.unsynced.contains(&field) && self.current.get(field) == change {
                continue;
            }
            log::trace!("{change:?}");
            if hooks.state_changed(change) {
                self.current.apply(change);
                self.unsynced.remove(&field);
            } else {
                log::warn!("backend rejected {change:?}");
                success = false;
            }
        }

        success &= self.apply_program(hooks, state);
        success &= self.apply_vertex_data(hooks, state);
        success &= self.apply_textures(hooks, state);
        success &= self.apply_samplers(hooks);
        success
    }

    fn apply_program<H: RenderStateHooks + ?Sized>(&mut self, hooks: &mut H, state: &RenderState) -> bool {
        if !self.program_unsynced && same_ref(self.current.program_ref(), state.program_ref()) {
            return true;
        }

        let program = state.program();
        if state.program_ref().is_some() && program.is_none() {
            log::warn!("bound program was dropped");
            return false;
        }

        log::trace!("ProgramChanged({:?})", program.as_ref().map(|p| p.id()));
        if hooks.program_changed(program.as_deref()) {
            self.current.set_program_ref(state.program_ref().cloned());
            self.program_unsynced = false;
            true
        } else {
            log::warn!("backend rejected program {:?}", program.map(|p| p.id()));
            false
        }
    }

    fn apply_vertex_data<H: RenderStateHooks + ?Sized>(&mut self, hooks: &mut H, state: &RenderState) -> bool {
        if !self.vertex_data_unsynced && same_ref(self.current.vertex_data_ref(), state.vertex_data_ref()) {
            return true;
        }

        let data = state.vertex_data();
        if state.vertex_data_ref().is_some() && data.is_none() {
            log::warn!("bound vertex data was dropped");
            return false;
        }

        log::trace!("VertexDataChanged({:?})", data.as_ref().map(|d| d.id()));
        if hooks.vertex_data_changed(data.as_deref(), true) {
            self.current.set_vertex_data_ref(state.vertex_data_ref().cloned());
            self.vertex_data_unsynced = false;
            true
        } else {
            log::warn!("backend rejected vertex data {:?}", data.map(|d| d.id()));
            false
        }
    }

    fn apply_textures<H: RenderStateHooks + ?Sized>(
        &mut self,
        hooks: &mut H,
        state: &RenderState,
    ) -> bool {
        let mut success = true;

        for (&unit, texture) in state.texture_refs() {
            let unchanged = self
                .current
                .texture_refs()
                .get(&unit)
                .is_some_and(|bound| Weak::ptr_eq(bound, texture));
            if unchanged {
                continue;
            }

            let Some(strong) = texture.upgrade() else {
                log::warn!("texture on unit {unit} was dropped");
                success = false;
                continue;
            };

            log::trace!("TextureChanged({unit}, {}, enable)", strong.id());
            if hooks.texture_changed(unit, Some(&strong), true) {
                self.current.texture_refs_mut().insert(unit, texture.clone());
                self.stale_units.remove(&unit);
            } else {
                log::warn!("backend rejected texture {} on unit {unit}", strong.id());
                success = false;
            }
        }

        let stale: BTreeSet<u32> = self
            .current
            .texture_units()
            .chain(self.stale_units.iter().copied())
            .filter(|unit| !state.texture_refs().contains_key(unit))
            .collect();
        for unit in stale {
            log::trace!("TextureChanged({unit}, null, disable)");
            if hooks.texture_changed(unit, None, false) {
                self.current.texture_refs_mut().remove(&unit);
                self.stale_units.remove(&unit);
            } else {
                log::warn!("backend refused to disable texture unit {unit}");
                success = false;
            }
        }

        success
    }

    /// Point the sampler uniforms of the bound program at their units.
    fn apply_samplers<H: RenderStateHooks + ?Sized>(&mut self, hooks: &mut H) -> bool {
        let Some(program) = self.current.program() else {
            return true;
        };

        let units: Vec<u32> = self.current.texture_units().collect();
        let mut success = true;
        for unit in units {
            if let Some(sampler) = program.sampler_uniform(unit) {
                success &= self.apply_uniform(hooks, &program, &sampler, &UniformValue::Int(unit as i32));
            }
        }
        success
    }

    /// Assign `value` to the uniform `name` of `program`.
    ///
    /// Returns `false` if the program does not declare `name`, the value has
    /// the wrong type, or the backend rejected it. Unchanged values are not
    /// forwarded.
    pub fn set_uniform_variable<H: RenderStateHooks + ?Sized>(
        &mut self,
        hooks: &mut H,
        program: &Program,
        name: &str,
        value: &UniformValue,
    ) -> bool {
        let Some(info) = program.uniform(name) else {
            log::warn!("{} has no uniform variable '{name}'", program.id());
            return false;
        };
        self.apply_uniform(hooks, program, &info, value)
    }

    fn apply_uniform<H: RenderStateHooks + ?Sized>(
        &mut self,
        hooks: &mut H,
        program: &Program,
        info: &UniformInfo,
        value: &UniformValue,
    ) -> bool {
        if !info.accepts(value) {
            log::warn!(
                "uniform variable '{}' of {} has type {}, got {}",
                info.name,
                program.id(),
                info.ty,
                value.ty()
            );
            return false;
        }

        let generation = program.generation();
        let cache = self.uniforms.entry(program.id()).or_default();
        if cache.generation != generation {
            cache.generation = generation;
            cache.values.clear();
        }
        if cache.values.get(&info.name) == Some(value) {
            return true;
        }

        log::trace!("UniformChanged({}, {} = {value})", program.id(), info.name);
        if hooks.uniform_changed(program, info, value) {
            cache.values.insert(info.name.clone(), value.clone());
            true
        } else {
            log::warn!("backend rejected uniform '{}' of {}", info.name, program.id());
            false
        }
    }

    /// Set the viewport, forwarded only if it changed.
    pub fn set_viewport<H: RenderStateHooks + ?Sized>(
        &mut self,
        hooks: &mut H,
        viewport: ViewportRect,
    ) -> bool {
        if self.viewport == Some(viewport) {
            return true;
        }
        log::trace!("ViewportChanged({viewport})");
        if hooks.viewport_changed(viewport) {
            self.viewport = Some(viewport);
            true
        } else {
            false
        }
    }

    /// Last viewport the backend accepted.
    pub fn viewport(&self) -> Option<ViewportRect> {
        self.viewport
    }

    /// Apply the state of `command`, its uniforms, and draw.
    ///
    /// Returns `false` and skips the draw if any state was rejected or no
    /// vertex data is bound.
    pub fn draw<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, command: &DrawCommand) -> bool {
        self.draw_with_globals(backend, None, command)
    }

    /// Like [`draw`](Self::draw), applying the variables of `global` the
    /// program declares before those of `command`.
    pub fn draw_with_globals<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        global: Option<&GlobalRenderState>,
        command: &DrawCommand,
    ) -> bool {
        if !self.set_render_state(backend, command.render_state()) {
            log::warn!("skipping draw, render state was not fully applied");
            return false;
        }

        if let Some(program) = self.current.program() {
            if let Some(global) = global {
                for (name, value) in global.variables_for(program.id()) {
                    if command.has_uniform_variable(name) {
                        continue;
                    }
                    let Some(info) = program.uniform(name) else {
                        continue;
                    };
                    if !self.apply_uniform(backend, &program, &info, value) {
                        return false;
                    }
                }
            }

            for (name, value) in command.uniform_variables() {
                if program.uniform(name).is_none() {
                    log::warn!("{} has no uniform variable '{name}', skipping", program.id());
                    continue;
                }
                if !self.set_uniform_variable(backend, &program, name, value) {
                    return false;
                }
            }

            if let Some(info) = program.uniform(MODEL_MATRIX_UNIFORM) {
                let model = UniformValue::Mat4(command.model_matrix());
                if !self.apply_uniform(backend, &program, &info, &model) {
                    return false;
                }
            }
        }

        match self.current.vertex_data() {
            Some(data) => backend.draw(&data),
            None => {
                log::warn!("skipping draw, no vertex data bound");
                false
            }
        }
    }
}

impl fmt::Display for RenderStateCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RenderStateCache[current = {}", self.current)?;
        if let Some(viewport) = self.viewport {
            write!(f, ", viewport = {viewport}")?;
        }
        write!(f, "]")
    }
}
