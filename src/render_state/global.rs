//! Uniform variables set once per frame instead of per draw command.

use crate::resources::{Program, ProgramId};
use crate::uniform::UniformValue;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Uniform variables shared by every draw command of a frame.
///
/// Shared variables go to every program declaring them. Per-program
/// variables only go to their program and take precedence over shared ones
/// of the same name. A draw command's own uniforms are applied last.
#[derive(Debug, Clone, Default)]
pub struct GlobalRenderState {
    shared: BTreeMap<String, UniformValue>,
    per_program: HashMap<ProgramId, BTreeMap<String, UniformValue>>,
}

impl GlobalRenderState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name` for every program declaring it.
    pub fn set_shared_uniform_variable(&mut self, name: impl Into<String>, value: impl Into<UniformValue>) {
        self.shared.insert(name.into(), value.into());
    }

    /// Set `name` for `program` only.
    pub fn set_per_program_uniform_variable(
        &mut self,
        program: &Program,
        name: impl Into<String>,
        value: impl Into<UniformValue>,
    ) {
        self.per_program
            .entry(program.id())
            .or_default()
            .insert(name.into(), value.into());
    }

    /// Variables sent to every program.
    pub fn shared_uniform_variables(&self) -> &BTreeMap<String, UniformValue> {
        &self.shared
    }

    /// Variables set for `program`, or `None` if there are none.
    pub fn per_program_uniform_variables(&self, program: ProgramId) -> Option<&BTreeMap<String, UniformValue>> {
        self.per_program.get(&program)
    }

    pub fn has_per_program_uniform_variables(&self, program: ProgramId) -> bool {
        self.per_program.get(&program).is_some_and(|vars| !vars.is_empty())
    }

    /// Drop the variables of a program that no longer exists.
    pub fn remove_program(&mut self, program: ProgramId) {
        self.per_program.remove(&program);
    }

    /// Values `program` receives, in application order.
    pub(crate) fn variables_for(&self, program: ProgramId) -> impl Iterator<Item = (&String, &UniformValue)> {
        let own = self.per_program.get(&program);
        self.shared
            .iter()
            .filter(move |(name, _)| !own.is_some_and(|vars| vars.contains_key(*name)))
            .chain(own.into_iter().flatten())
    }

    /// Remove every shared and per-program variable.
    pub fn reset(&mut self) {
        self.shared.clear();
        self.per_program.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.shared.is_empty() && self.per_program.values().all(BTreeMap::is_empty)
    }
}

impl fmt::Display for GlobalRenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GlobalRenderState[shared = {{")?;
        for (i, (name, value)) in self.shared.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name} = {value}")?;
        }
        write!(f, "}}")?;

        let mut programs: Vec<_> = self.per_program.iter().filter(|(_, vars)| !vars.is_empty()).collect();
        programs.sort_by_key(|(id, _)| **id);
        for (id, vars) in programs {
            write!(f, ", {id} = {{")?;
            for (i, (name, value)) in vars.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{name} = {value}")?;
            }
            write!(f, "}}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NullBackend, ShaderType};
    use crate::resources::{MemoryFile, ProgramManager, ShaderManager, ShaderStatus};
    use std::sync::Arc;

    fn program(programs: &mut ProgramManager, shaders: &mut ShaderManager, backend: &mut NullBackend) -> Arc<Program> {
        let shader = shaders
            .create(
                backend,
                ShaderType::Vertex,
                MemoryFile::new(format!("global{}.vert", programs.len()), "uniform float u_time;\nvoid main() {}\n"),
                ShaderStatus::InMemory,
            )
            .unwrap();
        programs.create(vec![shader])
    }

    #[test]
    fn per_program_overrides_shared() {
        let mut backend = NullBackend::new();
        let mut shaders = ShaderManager::new();
        let mut programs = ProgramManager::new();
        let first = program(&mut programs, &mut shaders, &mut backend);
        let second = program(&mut programs, &mut shaders, &mut backend);

        let mut global = GlobalRenderState::new();
        global.set_shared_uniform_variable("u_time", 1.0f32);
        global.set_shared_uniform_variable("u_scale", 2.0f32);
        global.set_per_program_uniform_variable(&first, "u_time", 5.0f32);

        let first_vars: Vec<_> = global
            .variables_for(first.id())
            .map(|(name, value)| (name.as_str(), value.clone()))
            .collect();
        assert_eq!(
            first_vars,
            vec![("u_scale", UniformValue::Float(2.0)), ("u_time", UniformValue::Float(5.0))]
        );
        assert_eq!(global.variables_for(second.id()).count(), 2);
        assert!(global.has_per_program_uniform_variables(first.id()));
        assert!(!global.has_per_program_uniform_variables(second.id()));
    }

    #[test]
    fn reset_and_remove_program() {
        let mut backend = NullBackend::new();
        let mut shaders = ShaderManager::new();
        let mut programs = ProgramManager::new();
        let program = program(&mut programs, &mut shaders, &mut backend);

        let mut global = GlobalRenderState::new();
        assert!(global.is_empty());
        global.set_per_program_uniform_variable(&program, "u_time", 1.0f32);
        assert!(!global.is_empty());
        global.remove_program(program.id());
        assert!(global.per_program_uniform_variables(program.id()).is_none());

        global.set_shared_uniform_variable("u_time", 3.0f32);
        global.reset();
        assert!(global.is_empty());
    }

    #[test]
    fn display_lists_variables() {
        let mut global = GlobalRenderState::new();
        global.set_shared_uniform_variable("u_b", 1i32);
        global.set_shared_uniform_variable("u_a", 2i32);
        let text = global.to_string();
        assert!(text.starts_with("GlobalRenderState[shared = {u_a = "), "{text}");
        assert!(text.contains("u_b = "), "{text}");
    }
}
