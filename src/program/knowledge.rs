//! The registry of known primitives and actions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::action::{Action, Executable, Primitive};
use super::context::Context;
use super::entity::Prototype;
use super::expr::Expr;
use super::interpreter::{GroundedCall, Interpreter, PrimitiveHandler};
use super::value::EntityId;
use crate::error::{ChoreoError, Result};

/// A flat list of executables plus the prototypes their programs refer to.
///
/// Lookup by id is exact. Names are not unique, so lookup by name returns
/// every match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    #[serde(default)]
    pub executables: Vec<Executable>,
    #[serde(default)]
    pub prototypes: Vec<Prototype>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_by_id(&self, id: &EntityId) -> Option<&Executable> {
        self.executables.iter().find(|e| e.id() == id)
    }

    pub fn get_by_name(&self, name: &str) -> Vec<&Executable> {
        self.executables.iter().filter(|e| e.name() == name).collect()
    }

    /// Find by id first, then by name when the name is unambiguous.
    pub fn lookup(&self, key: &str) -> Result<&Executable> {
        if let Some(found) = self.get_by_id(&EntityId::from(key)) {
            return Ok(found);
        }
        match self.get_by_name(key).as_slice() {
            [only] => Ok(*only),
            [] => Err(ChoreoError::not_found("executable", key)),
            many => Err(ChoreoError::evaluation(format!(
                "'{}' names {} executables; use an id",
                key,
                many.len()
            ))),
        }
    }

    /// Register an executable. An existing entry with the same id is replaced.
    pub fn add(&mut self, executable: impl Into<Executable>) -> EntityId {
        let executable = executable.into();
        let id = executable.id().clone();
        if let Some(existing) = self.executables.iter_mut().find(|e| e.id() == &id) {
            debug!(id = %id, "replacing executable");
            *existing = executable;
            return id;
        }
        if !self.get_by_name(executable.name()).is_empty() {
            warn!(name = %executable.name(), "duplicate executable name");
        }
        self.executables.push(executable);
        id
    }

    pub fn create_primitive(&mut self, name: &str, parameters: &[&str]) -> EntityId {
        self.add(Primitive::new(name, parameters))
    }

    /// Register an empty action; fill it in through [`action_mut`](Self::action_mut).
    pub fn create_action(&mut self, name: &str, parameters: &[&str]) -> EntityId {
        self.add(Action::new(name, parameters))
    }

    pub fn action_mut(&mut self, id: &EntityId) -> Option<&mut Action> {
        self.executables.iter_mut().find_map(|e| match e {
            Executable::Action(action) if &action.id == id => Some(action),
            _ => None,
        })
    }

    pub fn add_prototype(&mut self, prototype: Prototype) -> EntityId {
        let id = prototype.id.clone();
        self.prototypes.retain(|p| p.id != id);
        self.prototypes.push(prototype);
        id
    }

    /// Make this base's prototypes visible to `ctx`.
    pub fn install_prototypes(&self, ctx: &mut Context) {
        for prototype in &self.prototypes {
            ctx.register_prototype(prototype.clone());
        }
    }

    pub fn interpreter(&self) -> Interpreter<'_> {
        Interpreter::new(self)
    }

    pub fn resolve(
        &self,
        id: &EntityId,
        arguments: &BTreeMap<String, Expr>,
        ctx: &mut Context,
    ) -> Result<Vec<GroundedCall>> {
        self.interpreter().resolve(id, arguments, ctx)
    }

    pub fn execute(
        &self,
        id: &EntityId,
        arguments: &BTreeMap<String, Expr>,
        ctx: &mut Context,
        handler: &mut dyn PrimitiveHandler,
    ) -> Result<Vec<GroundedCall>> {
        self.interpreter().execute(id, arguments, ctx, handler)
    }
}
