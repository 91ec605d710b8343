//! Description of a single draw call.

use crate::render_state::RenderState;
use crate::resources::{Program, Texture};
use crate::uniform::UniformValue;
use crate::vertex::VertexData;
use glam::Mat4;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Program, vertex data, textures, fixed-function state and uniforms of
/// one draw call.
#[derive(Debug, Clone)]
pub struct DrawCommand {
    render_state: RenderState,
    model_matrix: Mat4,
    uniforms: HashMap<String, UniformValue>,
}

impl Default for DrawCommand {
    fn default() -> Self {
        Self {
            render_state: RenderState::default(),
            model_matrix: Mat4::IDENTITY,
            uniforms: HashMap::new(),
        }
    }
}

impl DrawCommand {
    /// Command drawing `vertex_data` with `program` and default state.
    pub fn new(program: &Arc<Program>, vertex_data: &Arc<VertexData>) -> Self {
        let mut command = Self::default();
        command.render_state.set_program(program);
        command.render_state.set_vertex_data(vertex_data);
        command
    }

    pub fn render_state(&self) -> &RenderState {
        &self.render_state
    }

    /// Fixed-function state, textures and bindings of the command.
    pub fn render_state_mut(&mut self) -> &mut RenderState {
        &mut self.render_state
    }

    pub fn set_program(&mut self, program: &Arc<Program>) {
        self.render_state.set_program(program);
    }

    pub fn set_vertex_data(&mut self, vertex_data: &Arc<VertexData>) {
        self.render_state.set_vertex_data(vertex_data);
    }

    pub fn set_texture(&mut self, unit: u32, texture: &Arc<Texture>) {
        self.render_state.set_texture(unit, texture);
    }

    /// Value sent as the model matrix uniform, identity by default.
    pub fn model_matrix(&self) -> Mat4 {
        self.model_matrix
    }

    pub fn set_model_matrix(&mut self, matrix: Mat4) {
        self.model_matrix = matrix;
    }

    /// Store `value` under `name`, replacing any previous value.
    pub fn set_uniform_variable(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        self.uniforms.insert(name.into(), value.into());
    }

    /// # Panics
    ///
    /// Panics if no uniform variable `name` was set.
    pub fn get_uniform_variable(&self, name: &str) -> &UniformValue {
        match self.uniforms.get(name) {
            Some(value) => value,
            None => panic!("no uniform variable '{name}' in draw command"),
        }
    }

    /// # Panics
    ///
    /// Panics if no uniform variable `name` was set.
    pub fn get_uniform_variable_mut(&mut self, name: &str) -> &mut UniformValue {
        match self.uniforms.get_mut(name) {
            Some(value) => value,
            None => panic!("no uniform variable '{name}' in draw command"),
        }
    }

    pub fn has_uniform_variable(&self, name: &str) -> bool {
        self.uniforms.contains_key(name)
    }

    /// Every uniform variable set on the command.
    pub fn uniform_variables(&self) -> &HashMap<String, UniformValue> {
        &self.uniforms
    }
}

/// Draw commands collected for one frame, drawn in insertion order.
#[derive(Debug, Clone)]
pub struct DrawCommandList {
    commands: Vec<DrawCommand>,
}

impl DrawCommandList {
    /// Commands reserved for by [`new`](Self::new).
    pub const DEFAULT_CAPACITY: usize = 1024;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            commands: Vec::with_capacity(capacity),
        }
    }

    /// Append `command`, drawn after everything inserted before it.
    pub fn insert(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DrawCommand> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Remove every command, keeping the allocation for the next frame.
    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

impl Default for DrawCommandList {
    fn default() -> Self {
        Self::new()
    }
}

impl Extend<DrawCommand> for DrawCommandList {
    fn extend<I: IntoIterator<Item = DrawCommand>>(&mut self, iter: I) {
        self.commands.extend(iter);
    }
}

impl<'a> IntoIterator for &'a DrawCommandList {
    type Item = &'a DrawCommand;
    type IntoIter = std::slice::Iter<'a, DrawCommand>;

    fn into_iter(self) -> Self::IntoIter {
        self.commands.iter()
    }
}

impl fmt::Display for DrawCommandList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DrawCommandList[{} commands]", self.commands.len())?;
        for (i, command) in self.commands.iter().enumerate() {
            writeln!(f, "  {i}: {}", command.render_state())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn uniforms_are_overwritten() {
        let mut command = DrawCommand::default();
        command.set_uniform_variable("u_time", 1.0f32);
        command.set_uniform_variable("u_time", 2.0f32);
        assert_eq!(command.uniform_variables().len(), 1);
        assert_eq!(command.get_uniform_variable("u_time").get::<f32>().unwrap(), 2.0);

        command.set_uniform_variable("u_time", Vec3::ONE);
        assert!(command.get_uniform_variable("u_time").get::<f32>().is_err());
    }

    #[test]
    fn mutable_access() {
        let mut command = DrawCommand::default();
        command.set_uniform_variable("u_count", 1i32);
        *command.get_uniform_variable_mut("u_count") = UniformValue::Int(5);
        assert_eq!(command.get_uniform_variable("u_count"), &UniformValue::Int(5));
    }

    #[test]
    #[should_panic(expected = "no uniform variable 'missing'")]
    fn missing_uniform_panics() {
        DrawCommand::default().get_uniform_variable("missing");
    }

    #[test]
    fn model_matrix_defaults_to_identity() {
        let command = DrawCommand::default();
        assert_eq!(command.model_matrix(), Mat4::IDENTITY);
        assert!(command.render_state().program().is_none());
    }

    #[test]
    fn list_keeps_insertion_order() {
        let mut list = DrawCommandList::new();
        assert!(list.is_empty());
        for i in 0..3 {
            let mut command = DrawCommand::default();
            command.set_uniform_variable("u_index", i as i32);
            list.insert(command);
        }
        assert_eq!(list.len(), 3);
        let order: Vec<_> = list.iter().map(|c| c.get_uniform_variable("u_index").clone()).collect();
        assert_eq!(order, vec![UniformValue::Int(0), UniformValue::Int(1), UniformValue::Int(2)]);
        assert!(list.to_string().starts_with("DrawCommandList[3 commands]"));

        list.clear();
        assert!(list.is_empty());
        assert!(list.commands.capacity() >= DrawCommandList::DEFAULT_CAPACITY);
    }
}
