//! Primitives, composite actions and the statements inside them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::condition::Condition;
use super::context::{Binding, Context, Scope};
use super::expr::{Expr, Term};
use super::value::{EntityId, Value};
use crate::error::{ChoreoError, Result};

/// An invocation of a primitive or action by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub id: EntityId,
    #[serde(default)]
    pub parameters: BTreeMap<String, Expr>,
}

impl Call {
    pub fn new(id: impl Into<EntityId>) -> Self {
        Self {
            id: id.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// Build the callee scope for a call.
///
/// A term argument becomes an alias to the caller's name, a literal is bound
/// as is and any other expression is evaluated in the caller's scope first.
pub(crate) fn bind_arguments(
    callee: &str,
    parameters: &[String],
    arguments: &BTreeMap<String, Expr>,
    ctx: &Context,
) -> Result<Scope> {
    let expected: BTreeSet<&str> = parameters.iter().map(String::as_str).collect();
    let got: BTreeSet<&str> = arguments.keys().map(String::as_str).collect();
    if expected != got {
        return Err(ChoreoError::ParameterMismatch {
            callee: callee.to_string(),
            expected: expected.into_iter().map(str::to_string).collect(),
            got: got.into_iter().map(str::to_string).collect(),
        });
    }

    let mut scope = Scope::new();
    for (name, argument) in arguments {
        let binding = match argument {
            Expr::Term(term) => Binding::Alias(term.clone()),
            Expr::Literal { value } => Binding::Literal(value.clone()),
            other => match other.evaluate(ctx)? {
                Value::Thing(thing) if ctx.entity(&thing.id).is_some() => Binding::Entity(thing.id),
                value => Binding::Literal(value),
            },
        };
        scope.insert(name.clone(), binding);
    }
    Ok(scope)
}

/// `term = operation`, or `fallback` when the operation yields nothing.
///
/// Assigning a property to a term holding a thing attaches the property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assign {
    pub term: Term,
    pub operation: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Expr>,
}

impl Assign {
    pub fn new(term: Term, operation: impl Into<Expr>) -> Self {
        Self {
            term,
            operation: operation.into(),
            fallback: None,
        }
    }

    pub fn or(mut self, fallback: impl Into<Expr>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn evaluate(&self, ctx: &mut Context) -> Result<()> {
        let mut result = self.operation.evaluate(ctx)?;
        if result.is_null() {
            if let Some(fallback) = &self.fallback {
                result = fallback.evaluate(ctx)?;
            }
        }
        match (ctx.get(&self.term)?, result) {
            (Some(Value::Thing(mut thing)), Value::Property(property)) => {
                thing.set_property(*property);
                ctx.set(&self.term, Value::Thing(thing))
            }
            (_, result) => ctx.set(&self.term, result),
        }
    }
}

/// Control flow over nested subactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum Flow {
    /// Run exactly one of the two lists.
    Branch {
        condition: Condition,
        #[serde(default)]
        if_pass: Vec<Subaction>,
        #[serde(default)]
        if_fail: Vec<Subaction>,
    },
    /// Re-check before every iteration.
    While {
        condition: Condition,
        #[serde(default)]
        subactions: Vec<Subaction>,
    },
    /// Bind the first observed thing to `term` and run the body, re-observing
    /// after every pass until nothing matches.
    ForThingObserved {
        term: Term,
        operation: Expr,
        #[serde(default)]
        subactions: Vec<Subaction>,
    },
    /// Until `until` holds, run the body whenever `on` holds.
    ExecuteOnConditionUntil {
        on: Condition,
        until: Condition,
        #[serde(default)]
        subactions: Vec<Subaction>,
    },
}

/// One statement in an action body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subaction {
    Call(Call),
    Flow(Flow),
    Assign(Assign),
    /// A condition applied for its effect.
    Effect(Condition),
}

impl From<Call> for Subaction {
    fn from(call: Call) -> Self {
        Subaction::Call(call)
    }
}

impl From<Flow> for Subaction {
    fn from(flow: Flow) -> Self {
        Subaction::Flow(flow)
    }
}

impl From<Assign> for Subaction {
    fn from(assign: Assign) -> Self {
        Subaction::Assign(assign)
    }
}

impl From<Condition> for Subaction {
    fn from(condition: Condition) -> Self {
        Subaction::Effect(condition)
    }
}

/// A leaf operation dispatched to whatever drives the robot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Primitive {
    #[serde(default = "EntityId::generate")]
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl Primitive {
    pub fn new(name: impl Into<String>, parameters: &[&str]) -> Self {
        Self {
            id: EntityId::generate(),
            name: name.into(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn call(&self) -> Call {
        Call::new(self.id.clone())
    }
}

/// A composite of subactions with pre- and postconditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default = "EntityId::generate")]
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default)]
    pub subactions: Vec<Subaction>,
    #[serde(default)]
    pub preconditions: Vec<Condition>,
    #[serde(default)]
    pub postconditions: Vec<Condition>,
}

impl Action {
    pub fn new(name: impl Into<String>, parameters: &[&str]) -> Self {
        Self {
            id: EntityId::generate(),
            name: name.into(),
            parameters: parameters.iter().map(|p| p.to_string()).collect(),
            subactions: Vec::new(),
            preconditions: Vec::new(),
            postconditions: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn then(mut self, subaction: impl Into<Subaction>) -> Self {
        self.subactions.push(subaction.into());
        self
    }

    pub fn requires(mut self, condition: Condition) -> Self {
        self.preconditions.push(condition);
        self
    }

    pub fn ensures(mut self, condition: Condition) -> Self {
        self.postconditions.push(condition);
        self
    }

    pub fn call(&self) -> Call {
        Call::new(self.id.clone())
    }

    /// Preconditions derived from the subactions. No inference policy exists
    /// yet, so this is always empty.
    pub fn inferred_preconditions(&self) -> Vec<Condition> {
        Vec::new()
    }

    /// Postconditions derived from the subactions. Always empty for now.
    pub fn inferred_postconditions(&self) -> Vec<Condition> {
        Vec::new()
    }

    pub fn all_preconditions(&self) -> Vec<Condition> {
        let mut all = self.preconditions.clone();
        all.extend(self.inferred_preconditions());
        all
    }

    pub fn all_postconditions(&self) -> Vec<Condition> {
        let mut all = self.postconditions.clone();
        all.extend(self.inferred_postconditions());
        all
    }

    /// Whether every precondition holds for these arguments.
    pub fn check(&self, ctx: &mut Context, arguments: &BTreeMap<String, Expr>) -> Result<bool> {
        let scope = bind_arguments(&self.name, &self.parameters, arguments, ctx)?;
        let guard = ctx.scoped(scope);
        for condition in self.all_preconditions() {
            if !condition.check(&guard)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Anything a [`Call`] can target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Executable {
    Primitive(Primitive),
    Action(Action),
}

impl Executable {
    pub fn id(&self) -> &EntityId {
        match self {
            Executable::Primitive(p) => &p.id,
            Executable::Action(a) => &a.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Executable::Primitive(p) => &p.name,
            Executable::Action(a) => &a.name,
        }
    }

    pub fn parameters(&self) -> &[String] {
        match self {
            Executable::Primitive(p) => &p.parameters,
            Executable::Action(a) => &a.parameters,
        }
    }

    pub fn call(&self) -> Call {
        Call::new(self.id().clone())
    }
}

impl From<Primitive> for Executable {
    fn from(primitive: Primitive) -> Self {
        Executable::Primitive(primitive)
    }
}

impl From<Action> for Executable {
    fn from(action: Action) -> Self {
        Executable::Action(action)
    }
}
