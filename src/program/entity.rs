//! Things, prototypes and descriptions over them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::condition::{compare, ConditionOperator};
use super::value::{EntityId, Property, Value};

/// A named bag of properties living in a context's state.
///
/// `prototypes` lists the prototypes whose properties the thing inherits;
/// local properties win over inherited ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thing {
    #[serde(default = "EntityId::generate")]
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prototypes: Vec<EntityId>,
}

impl Thing {
    pub fn new(name: impl Into<String>, properties: Vec<Property>) -> Self {
        Self::with_id(EntityId::generate(), name, properties)
    }

    pub fn with_id(id: impl Into<EntityId>, name: impl Into<String>, properties: Vec<Property>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            properties,
            prototypes: Vec::new(),
        }
    }

    pub fn inherit(mut self, prototype: impl Into<EntityId>) -> Self {
        self.prototypes.push(prototype.into());
        self
    }

    /// A locally defined property.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// Insert or replace a local property.
    pub fn set_property(&mut self, property: Property) {
        match self.properties.iter_mut().find(|p| p.name == property.name) {
            Some(existing) => existing.value = property.value,
            None => self.properties.push(property),
        }
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Property> {
        let index = self.properties.iter().position(|p| p.name == name)?;
        Some(self.properties.remove(index))
    }
}

/// Shared property definitions with parent prototypes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prototype {
    #[serde(default = "EntityId::generate")]
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub parents: Vec<EntityId>,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl Prototype {
    pub fn new(name: impl Into<String>, properties: Vec<Property>) -> Self {
        Self {
            id: EntityId::generate(),
            name: name.into(),
            parents: Vec::new(),
            properties,
        }
    }

    pub fn with_id(mut self, id: impl Into<EntityId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_parent(mut self, parent: impl Into<EntityId>) -> Self {
        self.parents.push(parent.into());
        self
    }
}

/// One property test inside a [`Description`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub property: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

impl Requirement {
    pub fn matches(&self, properties: &BTreeMap<String, Value>) -> bool {
        let found = properties.get(&self.property);
        match self.operator {
            ConditionOperator::Exists | ConditionOperator::HasProperty => found.is_some(),
            ConditionOperator::DoesntExist => found.is_none(),
            operator => found.is_some_and(|value| compare(operator, value, &self.value)),
        }
    }
}

/// A pattern over thing properties. A thing matches when every
/// requirement holds for its merged properties.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Description {
    #[serde(default)]
    pub requirements: Vec<Requirement>,
}

impl Description {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        property: impl Into<String>,
        operator: ConditionOperator,
        value: impl Into<Value>,
    ) -> Self {
        self.requirements.push(Requirement {
            property: property.into(),
            operator,
            value: value.into(),
        });
        self
    }

    pub fn having(self, property: impl Into<String>) -> Self {
        self.with(property, ConditionOperator::Exists, Value::Null)
    }

    pub fn matches(&self, properties: &BTreeMap<String, Value>) -> bool {
        self.requirements.iter().all(|r| r.matches(properties))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_set_property_replaces() {
        let mut thing = Thing::new("cup", vec![Property::new("full", false)]);
        thing.set_property(Property::new("full", true));
        thing.set_property(Property::new("color", "blue"));
        assert_eq!(thing.properties.len(), 2);
        assert_eq!(thing.property("full"), Some(&Value::Bool(true)));
        assert!(thing.remove_property("color").is_some());
        assert!(thing.property("color").is_none());
    }

    #[test]
    fn test_description_matching() {
        let description = Description::new()
            .having("graspable")
            .with("weight", ConditionOperator::Less, 2.0);
        assert!(description.matches(&props(&[
            ("graspable", Value::Bool(true)),
            ("weight", Value::Number(1.0)),
        ])));
        assert!(!description.matches(&props(&[("weight", Value::Number(1.0))])));
        assert!(!description.matches(&props(&[
            ("graspable", Value::Bool(true)),
            ("weight", Value::Number(3.0)),
        ])));
    }

    #[test]
    fn test_empty_description_matches_everything() {
        assert!(Description::new().matches(&BTreeMap::new()));
    }

    #[test]
    fn test_thing_document_defaults() {
        let thing: Thing = serde_json::from_str(r#"{"name": "table"}"#).unwrap();
        assert!(!thing.id.as_str().is_empty());
        assert!(thing.properties.is_empty());
    }
}
