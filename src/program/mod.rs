//! The action language: values, expressions, the evaluation context and the
//! interpreter that grounds actions into primitive calls.
//!
//! A [`KnowledgeBase`] holds [`Primitive`]s and [`Action`]s. Resolving an
//! action against a [`Context`] walks its body and produces the flat list of
//! [`GroundedCall`]s a dispatcher would send to hardware; executing it hands
//! each call to a [`PrimitiveHandler`] as it is reached.

mod action;
mod condition;
mod context;
mod document;
mod entity;
mod expr;
mod interpreter;
mod knowledge;
mod value;

pub use action::{Action, Assign, Call, Executable, Flow, Primitive, Subaction};
pub use condition::{Condition, ConditionOperator};
pub use context::{Binding, Context, Scope, ScopeGuard};
pub use document::{Decoded, Element, ProgramDocument};
pub use entity::{Description, Prototype, Requirement, Thing};
pub use expr::{Expr, Operation, Operator, Term};
pub use interpreter::{CancelToken, GroundedCall, Interpreter, Limits, PrimitiveHandler};
pub use knowledge::KnowledgeBase;
pub use value::{EntityId, Property, Value};
