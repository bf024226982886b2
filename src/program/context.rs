//! The evaluation environment: nested scopes over a flat entity state.
//!
//! Scopes are searched innermost first. A binding is a literal, an alias to
//! another name, or a reference to an entity in state. Following an alias
//! continues the search one scope further out, so resolution always moves
//! toward the bottom scope and then the state list; an additional hop limit
//! turns a malformed chain into [`ChoreoError::AliasDepth`].

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::entity::{Prototype, Thing};
use super::expr::Term;
use super::value::{EntityId, Value};
use crate::config::EngineConfig;
use crate::error::{ChoreoError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum Binding {
    Literal(Value),
    Alias(Term),
    Entity(EntityId),
}

pub type Scope = BTreeMap<String, Binding>;

/// Where a reference ended up after following aliases.
enum Target {
    Scope { level: usize, name: String },
    State(usize),
    /// Unbound. `level` is the innermost scope the search could still see.
    Missing { level: Option<usize>, name: String },
}

#[derive(Debug, Clone)]
pub struct Context {
    scopes: Vec<Scope>,
    state: Vec<Thing>,
    prototypes: BTreeMap<EntityId, Prototype>,
    max_alias_depth: usize,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Context {
    pub fn new(state: Vec<Thing>) -> Self {
        Self {
            scopes: vec![Scope::new()],
            state,
            prototypes: BTreeMap::new(),
            max_alias_depth: EngineConfig::default().max_alias_depth,
        }
    }

    pub fn with_alias_depth(mut self, depth: usize) -> Self {
        self.max_alias_depth = depth;
        self
    }

    /// Push a scope.
    pub fn add(&mut self, scope: Scope) {
        self.scopes.push(scope);
    }

    /// Pop the innermost scope. The bottom scope is never popped.
    pub fn pop(&mut self) -> Option<Scope> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    /// Push a scope that is popped again when the guard drops.
    pub fn scoped(&mut self, scope: Scope) -> ScopeGuard<'_> {
        self.add(scope);
        ScopeGuard { ctx: self }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn scope(&self, level: usize) -> Option<&Scope> {
        self.scopes.get(level)
    }

    pub fn state(&self) -> &[Thing] {
        &self.state
    }

    pub fn entity(&self, id: &EntityId) -> Option<&Thing> {
        self.state.iter().find(|t| &t.id == id)
    }

    pub fn register_prototype(&mut self, prototype: Prototype) {
        self.prototypes.insert(prototype.id.clone(), prototype);
    }

    pub fn prototype(&self, id: &EntityId) -> Option<&Prototype> {
        self.prototypes.get(id)
    }

    /// A thing's properties merged with everything it inherits.
    ///
    /// Prototypes are visited breadth-first; nearer prototypes override
    /// farther ones and local properties override all of them.
    pub fn properties_of(&self, thing: &Thing) -> BTreeMap<String, Value> {
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<&EntityId> = thing.prototypes.iter().collect();
        let mut chain = Vec::new();
        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(prototype) = self.prototypes.get(id) {
                chain.push(prototype);
                queue.extend(prototype.parents.iter());
            }
        }

        let mut merged = BTreeMap::new();
        let inherited = chain.iter().rev().flat_map(|p| p.properties.iter());
        for property in inherited.chain(thing.properties.iter()) {
            merged.insert(property.name.clone(), property.value.clone());
        }
        merged
    }

    /// Bind `term` in the innermost scope.
    pub fn bind(&mut self, term: &Term, value: Value) {
        let binding = self.binding_for(value);
        self.define(&term.name, binding);
    }

    /// Insert a raw binding in the innermost scope.
    pub fn define(&mut self, name: &str, binding: Binding) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), binding);
        }
    }

    /// Resolve a reference. Unbound names are `Ok(None)`.
    pub fn get(&self, term: &Term) -> Result<Option<Value>> {
        Ok(match self.locate(term)? {
            Target::Scope { level, name } => match &self.scopes[level][&name] {
                Binding::Literal(value) => Some(value.clone()),
                Binding::Entity(id) => self.entity(id).cloned().map(Value::Thing),
                Binding::Alias(_) => None,
            },
            Target::State(index) => Some(Value::Thing(self.state[index].clone())),
            Target::Missing { .. } => None,
        })
    }

    pub fn exists(&self, term: &Term) -> Result<bool> {
        Ok(self.get(term)?.is_some_and(|v| !v.is_null()))
    }

    /// Assign through the same resolution walk as [`get`](Self::get).
    ///
    /// A binding that refers to an entity is replaced in state when the new
    /// value is a thing, and every reference to the old id follows it. An
    /// unbound name is defined in the innermost scope it was searched from.
    pub fn set(&mut self, term: &Term, value: Value) -> Result<()> {
        match self.locate(term)? {
            Target::Scope { level, name } => {
                let referenced = match &self.scopes[level][&name] {
                    Binding::Entity(id) => Some(id.clone()),
                    _ => None,
                };
                match (referenced, value) {
                    (Some(id), Value::Thing(thing)) => self.replace_entity(&id, thing),
                    (_, value) => {
                        let binding = self.binding_for(value);
                        self.scopes[level].insert(name, binding);
                    }
                }
            }
            Target::State(index) => match value {
                Value::Thing(thing) => {
                    let id = self.state[index].id.clone();
                    self.replace_entity(&id, thing);
                }
                other => {
                    return Err(ChoreoError::evaluation(format!(
                        "cannot replace entity '{}' with a {}",
                        self.state[index].id,
                        other.type_name()
                    )))
                }
            },
            Target::Missing { level, name } => {
                let binding = self.binding_for(value);
                self.scopes[level.unwrap_or(0)].insert(name, binding);
            }
        }
        Ok(())
    }

    /// Insert or update an entity, optionally naming it in the innermost scope.
    pub fn add_to_state(&mut self, thing: Thing, reference: Option<&Term>) {
        let id = thing.id.clone();
        match self.state.iter_mut().find(|t| t.id == id) {
            Some(existing) => *existing = thing,
            None => self.state.push(thing),
        }
        if let Some(term) = reference {
            self.define(&term.name, Binding::Entity(id));
        }
    }

    /// Remove an entity and every binding that refers to it.
    pub fn remove_from_state(&mut self, id: &EntityId) -> Option<Thing> {
        let index = self.state.iter().position(|t| &t.id == id)?;
        let removed = self.state.remove(index);
        let mut purged = 0usize;
        for scope in &mut self.scopes {
            let before = scope.len();
            scope.retain(|_, binding| !refers_to(binding, id));
            purged += before - scope.len();
        }
        debug!(entity = %id, purged, "entity removed");
        Some(removed)
    }

    /// Put `thing` where `old` was and repoint every reference to `old`.
    pub fn replace_entity(&mut self, old: &EntityId, thing: Thing) {
        let new = thing.id.clone();
        if &new != old {
            self.state.retain(|t| t.id != new);
        }
        match self.state.iter().position(|t| &t.id == old) {
            Some(index) => self.state[index] = thing,
            None => self.state.push(thing),
        }
        if &new == old {
            return;
        }
        for scope in &mut self.scopes {
            for binding in scope.values_mut() {
                match binding {
                    Binding::Entity(id) if id == old => *id = new.clone(),
                    Binding::Alias(term) if term.name == old.as_str() => {
                        term.name = new.as_str().to_string()
                    }
                    _ => {}
                }
            }
        }
        debug!(old = %old, new = %new, "entity replaced");
    }

    /// Things already in state are bound by reference, anything else by value.
    fn binding_for(&mut self, value: Value) -> Binding {
        match value {
            Value::Thing(thing) if self.entity(&thing.id).is_some() => {
                let id = thing.id.clone();
                self.replace_entity(&id, thing);
                Binding::Entity(id)
            }
            other => Binding::Literal(other),
        }
    }

    fn locate(&self, term: &Term) -> Result<Target> {
        let mut name = term.name.clone();
        let mut upper = self.scopes.len().checked_sub(1);
        let mut hops = 0usize;
        loop {
            let found = upper.and_then(|top| {
                (0..=top)
                    .rev()
                    .find(|&level| self.scopes[level].contains_key(&name))
            });
            let Some(level) = found else {
                return Ok(match self.state.iter().position(|t| t.id.as_str() == name) {
                    Some(index) => Target::State(index),
                    None => Target::Missing { level: upper, name },
                });
            };
            match &self.scopes[level][&name] {
                Binding::Alias(target) => {
                    hops += 1;
                    if hops > self.max_alias_depth {
                        return Err(ChoreoError::AliasDepth {
                            term: term.name.clone(),
                            depth: self.max_alias_depth,
                        });
                    }
                    name = target.name.clone();
                    upper = level.checked_sub(1);
                }
                _ => return Ok(Target::Scope { level, name }),
            }
        }
    }
}

fn refers_to(binding: &Binding, id: &EntityId) -> bool {
    match binding {
        Binding::Entity(target) => target == id,
        Binding::Alias(term) => term.name == id.as_str(),
        Binding::Literal(_) => false,
    }
}

/// A pushed scope, popped on drop.
pub struct ScopeGuard<'a> {
    ctx: &'a mut Context,
}

impl Deref for ScopeGuard<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.ctx
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.ctx
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.ctx.pop();
    }
}
