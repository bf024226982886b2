//! JSON documents for program elements.
//!
//! Every element is written with an `element` tag naming its type, so
//! decoding is a single switch on that tag. A document that does not decode
//! is handed back untouched rather than guessed at.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::action::{Action, Call, Primitive};
use super::condition::Condition;
use super::context::{Binding, Context};
use super::entity::{Description, Prototype, Thing};
use super::expr::Expr;
use super::knowledge::KnowledgeBase;
use super::value::{EntityId, Property};
use crate::config::EngineConfig;
use crate::error::{ChoreoError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "element", rename_all = "snake_case")]
pub enum Element {
    KnowledgeBase(KnowledgeBase),
    Primitive(Primitive),
    Action(Action),
    Call(Call),
    Condition(Condition),
    Thing(Thing),
    Prototype(Prototype),
    Description(Description),
    Property(Property),
    Expr(Expr),
}

/// The outcome of decoding an arbitrary document.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Element(Box<Element>),
    /// The original document, returned when it matched no element shape.
    Raw(serde_json::Value),
}

impl Element {
    pub fn from_document(document: serde_json::Value) -> Decoded {
        match Element::deserialize(&document) {
            Ok(element) => Decoded::Element(Box::new(element)),
            Err(err) => {
                warn!(error = %err, "undecodable document, keeping it raw");
                Decoded::Raw(document)
            }
        }
    }

    pub fn to_document(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Everything needed to resolve an action from a file: the knowledge base,
/// the initial world state and the arguments for the entry call.
///
/// `references` binds names in the bottom scope to entities in `state`, so
/// arguments can refer to them as terms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramDocument {
    pub knowledge_base: KnowledgeBase,
    pub state: Vec<Thing>,
    pub prototypes: Vec<Prototype>,
    pub references: BTreeMap<String, EntityId>,
    pub arguments: BTreeMap<String, Expr>,
}

impl ProgramDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| ChoreoError::storage(path, e))?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Build the evaluation context described by this document.
    pub fn context(&self, engine: &EngineConfig) -> Result<Context> {
        let mut ctx = Context::new(self.state.clone()).with_alias_depth(engine.max_alias_depth);
        self.knowledge_base.install_prototypes(&mut ctx);
        for prototype in &self.prototypes {
            ctx.register_prototype(prototype.clone());
        }
        for (name, id) in &self.references {
            if ctx.entity(id).is_none() {
                return Err(ChoreoError::not_found("entity", id.as_str()));
            }
            ctx.define(name, Binding::Entity(id.clone()));
        }
        Ok(ctx)
    }
}
