//! Runtime values of the action language.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entity::Thing;
use crate::geometry::{Orientation, Pose, Position};

/// Stable identifier of an entity, action or primitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// A fresh random (v4) identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A named value attached to a thing or prototype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Anything an expression can evaluate to.
///
/// Missing lookups evaluate to [`Value::Null`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Position(Position),
    Orientation(Orientation),
    Pose(Pose),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Thing(Thing),
    Property(Box<Property>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_thing(&self) -> Option<&Thing> {
        match self {
            Value::Thing(thing) => Some(thing),
            _ => None,
        }
    }

    /// Equality where things compare by identity.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Thing(a), Value::Thing(b)) => a.id == b.id,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            _ => self == other,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::Position(_) => "position",
            Value::Orientation(_) => "orientation",
            Value::Pose(_) => "pose",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Thing(_) => "thing",
            Value::Property(_) => "property",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Position> for Value {
    fn from(p: Position) -> Self {
        Value::Position(p)
    }
}

impl From<Orientation> for Value {
    fn from(o: Orientation) -> Self {
        Value::Orientation(o)
    }
}

impl From<Pose> for Value {
    fn from(p: Pose) -> Self {
        Value::Pose(p)
    }
}

impl From<Thing> for Value {
    fn from(t: Thing) -> Self {
        Value::Thing(t)
    }
}

impl From<Property> for Value {
    fn from(p: Property) -> Self {
        Value::Property(Box::new(p))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}
