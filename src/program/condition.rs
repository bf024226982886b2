//! Conditions: predicates that double as effect statements.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::context::Context;
use super::entity::Thing;
use super::expr::Expr;
use super::value::{Property, Value};
use crate::error::{ChoreoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Exists,
    DoesntExist,
    HasProperty,
    In,
}

/// Apply a comparison operator to two values.
///
/// Values that cannot be ordered against each other compare false.
pub(crate) fn compare(operator: ConditionOperator, lhs: &Value, rhs: &Value) -> bool {
    match operator {
        ConditionOperator::Equals => lhs.same_as(rhs),
        ConditionOperator::NotEquals => !lhs.same_as(rhs),
        ConditionOperator::Greater => order(lhs, rhs) == Some(Ordering::Greater),
        ConditionOperator::GreaterOrEqual => matches!(
            order(lhs, rhs),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        ConditionOperator::Less => order(lhs, rhs) == Some(Ordering::Less),
        ConditionOperator::LessOrEqual => {
            matches!(order(lhs, rhs), Some(Ordering::Less | Ordering::Equal))
        }
        ConditionOperator::In => match rhs {
            Value::List(items) => items.iter().any(|item| item.same_as(lhs)),
            Value::Map(map) => lhs.as_text().is_some_and(|key| map.contains_key(key)),
            Value::Text(text) => lhs.as_text().is_some_and(|s| text.contains(s)),
            _ => false,
        },
        ConditionOperator::Exists | ConditionOperator::HasProperty => !lhs.is_null(),
        ConditionOperator::DoesntExist => lhs.is_null(),
    }
}

fn order(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// `lhs <operator> rhs`.
///
/// `check` evaluates it as a predicate. `execute` performs the matching
/// state change for `HasProperty`, `Exists` and `DoesntExist`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub lhs: Expr,
    #[serde(default)]
    pub rhs: Expr,
    pub operator: ConditionOperator,
}

impl Condition {
    pub fn new(lhs: impl Into<Expr>, operator: ConditionOperator, rhs: impl Into<Expr>) -> Self {
        Self {
            lhs: lhs.into(),
            rhs: rhs.into(),
            operator,
        }
    }

    pub fn exists(subject: impl Into<Expr>) -> Self {
        Self::new(subject, ConditionOperator::Exists, Expr::default())
    }

    pub fn doesnt_exist(subject: impl Into<Expr>) -> Self {
        Self::new(subject, ConditionOperator::DoesntExist, Expr::default())
    }

    pub fn has_property(subject: impl Into<Expr>, property: Property) -> Self {
        Self::new(subject, ConditionOperator::HasProperty, property)
    }

    pub fn check(&self, ctx: &Context) -> Result<bool> {
        match self.operator {
            ConditionOperator::Exists => self.subject_exists(ctx),
            ConditionOperator::DoesntExist => Ok(!self.subject_exists(ctx)?),
            ConditionOperator::HasProperty => {
                let lhs = self.lhs.evaluate(ctx)?;
                let Value::Thing(thing) = lhs else {
                    return Ok(false);
                };
                let properties = ctx.properties_of(&thing);
                match self.rhs.evaluate(ctx)? {
                    Value::Property(expected) => Ok(match properties.get(&expected.name) {
                        Some(_) if expected.value.is_null() => true,
                        Some(actual) => actual.same_as(&expected.value),
                        None => false,
                    }),
                    Value::Text(name) => Ok(properties.contains_key(&name)),
                    other => Err(ChoreoError::evaluation(format!(
                        "has_property expects a property or a name, got {}",
                        other.type_name()
                    ))),
                }
            }
            operator => {
                let mut lhs = self.lhs.evaluate(ctx)?;
                let mut rhs = self.rhs.evaluate(ctx)?;
                // A property on the right compares against the same-named
                // property of the thing on the left.
                if let (Value::Thing(thing), Value::Property(expected)) = (&lhs, &rhs) {
                    let actual = ctx
                        .properties_of(thing)
                        .remove(&expected.name)
                        .unwrap_or_default();
                    let expected = expected.value.clone();
                    lhs = actual;
                    rhs = expected;
                }
                Ok(compare(operator, &lhs, &rhs))
            }
        }
    }

    fn subject_exists(&self, ctx: &Context) -> Result<bool> {
        match &self.lhs {
            Expr::Term(term) => ctx.exists(term),
            other => Ok(match other.evaluate(ctx)? {
                Value::Thing(thing) => ctx.entity(&thing.id).is_some(),
                value => !value.is_null(),
            }),
        }
    }

    /// Make the condition true where it has an effect.
    pub fn execute(&self, ctx: &mut Context) -> Result<()> {
        match self.operator {
            ConditionOperator::HasProperty => {
                let mut thing = self.subject_thing(ctx)?;
                let property = match self.rhs.evaluate(ctx)? {
                    Value::Property(property) => *property,
                    Value::Text(name) => Property::new(name, Value::Bool(true)),
                    other => {
                        return Err(ChoreoError::evaluation(format!(
                            "has_property expects a property or a name, got {}",
                            other.type_name()
                        )))
                    }
                };
                debug!(thing = %thing.id, property = %property.name, "attaching property");
                thing.set_property(property);
                self.store(ctx, thing)
            }
            ConditionOperator::Exists => {
                let thing = self.subject_thing(ctx)?;
                debug!(thing = %thing.id, "adding to state");
                ctx.add_to_state(thing, self.lhs.as_term());
                Ok(())
            }
            ConditionOperator::DoesntExist => {
                if let Value::Thing(thing) = self.lhs.evaluate(ctx)? {
                    debug!(thing = %thing.id, "removing from state");
                    ctx.remove_from_state(&thing.id);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn subject_thing(&self, ctx: &Context) -> Result<Thing> {
        match self.lhs.evaluate(ctx)? {
            Value::Thing(thing) => Ok(thing),
            other => Err(ChoreoError::evaluation(format!(
                "{:?} needs a thing, got {}",
                self.operator,
                other.type_name()
            ))),
        }
    }

    fn store(&self, ctx: &mut Context, thing: Thing) -> Result<()> {
        if ctx.entity(&thing.id).is_some() {
            ctx.replace_entity(&thing.id.clone(), thing);
            Ok(())
        } else if let Some(term) = self.lhs.as_term() {
            ctx.set(term, Value::Thing(thing))
        } else {
            Err(ChoreoError::evaluation(
                "cannot store a property on a thing outside state",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Term;

    fn context_with_cup() -> (Context, Thing) {
        let mut ctx = Context::default();
        let cup = Thing::new("cup", vec![Property::new("full", false)]);
        ctx.add_to_state(cup.clone(), Some(&Term::new("cup")));
        (ctx, cup)
    }

    #[test]
    fn test_compare() {
        use ConditionOperator::*;
        let one = Value::Number(1.0);
        let two = Value::Number(2.0);
        assert!(compare(Less, &one, &two));
        assert!(compare(LessOrEqual, &one, &one));
        assert!(!compare(Greater, &one, &Value::from("x")));
        assert!(compare(NotEquals, &one, &two));
        assert!(compare(In, &one, &Value::List(vec![two.clone(), one.clone()])));
        assert!(!compare(In, &one, &Value::Null));
    }

    #[test]
    fn test_property_rhs_reads_thing_property() {
        let (ctx, _) = context_with_cup();
        let empty = Condition::new(
            Term::new("cup"),
            ConditionOperator::Equals,
            Property::new("full", false),
        );
        assert!(empty.check(&ctx).unwrap());
        let full = Condition::new(
            Term::new("cup"),
            ConditionOperator::Equals,
            Property::new("full", true),
        );
        assert!(!full.check(&ctx).unwrap());
    }

    #[test]
    fn test_has_property_check_and_effect() {
        let (mut ctx, cup) = context_with_cup();
        let condition = Condition::has_property(Term::new("cup"), Property::new("washed", true));
        assert!(!condition.check(&ctx).unwrap());
        condition.execute(&mut ctx).unwrap();
        assert!(condition.check(&ctx).unwrap());
        let stored = ctx.entity(&cup.id).unwrap();
        assert_eq!(stored.property("washed"), Some(&Value::Bool(true)));

        let by_name = Condition::has_property(Term::new("cup"), Property::new("full", Value::Null));
        assert!(by_name.check(&ctx).unwrap());
    }

    #[test]
    fn test_exists_effects() {
        let mut ctx = Context::default();
        let ball = Thing::new("ball", vec![]);
        ctx.bind(&Term::new("ball"), Value::Thing(ball.clone()));
        assert!(ctx.entity(&ball.id).is_none());

        Condition::exists(Term::new("ball")).execute(&mut ctx).unwrap();
        assert!(ctx.entity(&ball.id).is_some());
        assert!(Condition::exists(Term::new("ball")).check(&ctx).unwrap());

        let gone = Condition::doesnt_exist(Term::new("ball"));
        gone.execute(&mut ctx).unwrap();
        assert!(ctx.entity(&ball.id).is_none());
        assert!(gone.check(&ctx).unwrap());
    }

    #[test]
    fn test_comparison_conditions_have_no_effect() {
        let (mut ctx, _) = context_with_cup();
        let before = ctx.state().to_vec();
        Condition::new(1.0, ConditionOperator::Less, 2.0)
            .execute(&mut ctx)
            .unwrap();
        assert_eq!(ctx.state(), before.as_slice());
    }
}
