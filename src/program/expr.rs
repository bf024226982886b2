//! Terms, operations and their evaluation.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::condition::{compare, ConditionOperator};
use super::context::Context;
use super::entity::Description;
use super::value::{Property, Value};
use crate::error::{ChoreoError, Result};
use crate::geometry::{Pose, Position};

/// A named reference resolved against a [`Context`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term {
    pub name: String,
}

impl Term {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// `self[key]`
    pub fn access(&self, key: impl Into<Expr>) -> Expr {
        Operation::access(self.clone(), key)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Modulus,
    CartesianDistance,
    AngularDistance,
    Equals,
    NotEquals,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Exists,
    Access,
    Observe,
    Union,
    Intersection,
}

impl Operator {
    fn comparison(self) -> Option<ConditionOperator> {
        match self {
            Operator::Equals => Some(ConditionOperator::Equals),
            Operator::NotEquals => Some(ConditionOperator::NotEquals),
            Operator::Greater => Some(ConditionOperator::Greater),
            Operator::GreaterOrEqual => Some(ConditionOperator::GreaterOrEqual),
            Operator::Less => Some(ConditionOperator::Less),
            Operator::LessOrEqual => Some(ConditionOperator::LessOrEqual),
            _ => None,
        }
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expr {
    Term(Term),
    Literal { value: Value },
    Operation(Box<Operation>),
    Property(Property),
    Description(Description),
}

impl Default for Expr {
    fn default() -> Self {
        Expr::Literal { value: Value::Null }
    }
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal {
            value: value.into(),
        }
    }

    pub fn term(name: impl Into<String>) -> Self {
        Expr::Term(Term::new(name))
    }

    pub fn as_term(&self) -> Option<&Term> {
        match self {
            Expr::Term(term) => Some(term),
            _ => None,
        }
    }

    /// Evaluate strictly against `ctx`. Unbound terms yield [`Value::Null`].
    pub fn evaluate(&self, ctx: &Context) -> Result<Value> {
        match self {
            Expr::Term(term) => Ok(ctx.get(term)?.unwrap_or_default()),
            Expr::Literal { value } => Ok(value.clone()),
            Expr::Operation(operation) => operation.evaluate(ctx),
            Expr::Property(property) => Ok(Value::Property(Box::new(property.clone()))),
            Expr::Description(description) => Ok(observe(ctx, description)),
        }
    }
}

impl From<Term> for Expr {
    fn from(term: Term) -> Self {
        Expr::Term(term)
    }
}

impl From<Operation> for Expr {
    fn from(operation: Operation) -> Self {
        Expr::Operation(Box::new(operation))
    }
}

impl From<Description> for Expr {
    fn from(description: Description) -> Self {
        Expr::Description(description)
    }
}

impl From<Property> for Expr {
    fn from(property: Property) -> Self {
        Expr::Property(property)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Literal { value }
    }
}

impl From<&str> for Expr {
    fn from(text: &str) -> Self {
        Expr::literal(text)
    }
}

impl From<f64> for Expr {
    fn from(n: f64) -> Self {
        Expr::literal(n)
    }
}

/// A unary or binary operator applied to sub-expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub operator: Operator,
    pub lhs: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rhs: Option<Expr>,
}

macro_rules! binary {
    ($($name:ident => $op:ident),* $(,)?) => {
        $(
            pub fn $name(lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
                Operation::binary(Operator::$op, lhs, rhs)
            }
        )*
    };
}

impl Operation {
    pub fn binary(operator: Operator, lhs: impl Into<Expr>, rhs: impl Into<Expr>) -> Expr {
        Expr::from(Operation {
            operator,
            lhs: lhs.into(),
            rhs: Some(rhs.into()),
        })
    }

    pub fn unary(operator: Operator, operand: impl Into<Expr>) -> Expr {
        Expr::from(Operation {
            operator,
            lhs: operand.into(),
            rhs: None,
        })
    }

    binary! {
        add => Add,
        subtract => Subtract,
        multiply => Multiply,
        divide => Divide,
        power => Power,
        modulus => Modulus,
        cartesian_distance => CartesianDistance,
        angular_distance => AngularDistance,
        equals => Equals,
        not_equals => NotEquals,
        greater => Greater,
        greater_or_equal => GreaterOrEqual,
        less => Less,
        less_or_equal => LessOrEqual,
        access => Access,
        union => Union,
        intersection => Intersection,
    }

    pub fn exists(operand: impl Into<Expr>) -> Expr {
        Operation::unary(Operator::Exists, operand)
    }

    pub fn observe(description: Description) -> Expr {
        Operation::unary(Operator::Observe, description)
    }

    fn rhs(&self) -> Result<&Expr> {
        self.rhs.as_ref().ok_or_else(|| {
            ChoreoError::evaluation(format!("{:?} needs a right-hand operand", self.operator))
        })
    }

    pub fn evaluate(&self, ctx: &Context) -> Result<Value> {
        match self.operator {
            Operator::Exists => {
                let exists = match &self.lhs {
                    Expr::Term(term) => ctx.exists(term)?,
                    other => !other.evaluate(ctx)?.is_null(),
                };
                Ok(Value::Bool(exists))
            }
            Operator::Observe => match &self.lhs {
                Expr::Description(description) => Ok(observe(ctx, description)),
                other => Err(ChoreoError::evaluation(format!(
                    "observe expects a description, got {:?}",
                    other
                ))),
            },
            Operator::Access => {
                let container = self.lhs.evaluate(ctx)?;
                let key = self.rhs()?.evaluate(ctx)?;
                Ok(access(ctx, &container, &key))
            }
            Operator::Union | Operator::Intersection => {
                let lhs = self.lhs.evaluate(ctx)?;
                let rhs = self.rhs()?.evaluate(ctx)?;
                set_operation(self.operator, lhs, rhs)
            }
            operator => {
                let lhs = self.lhs.evaluate(ctx)?;
                let rhs = self.rhs()?.evaluate(ctx)?;
                match operator.comparison() {
                    Some(comparison) => Ok(Value::Bool(compare(comparison, &lhs, &rhs))),
                    None => arithmetic(operator, lhs, rhs),
                }
            }
        }
    }
}

/// Things in state whose merged properties satisfy `description`.
pub(crate) fn observe(ctx: &Context, description: &Description) -> Value {
    Value::List(
        ctx.state()
            .iter()
            .filter(|thing| description.matches(&ctx.properties_of(thing)))
            .cloned()
            .map(Value::Thing)
            .collect(),
    )
}

/// Structural lookup: thing property, then map key, then list index, then
/// geometric field. Anything else is `Null`.
fn access(ctx: &Context, container: &Value, key: &Value) -> Value {
    if let (Value::Thing(thing), Value::Text(name)) = (container, key) {
        if let Some(value) = ctx.properties_of(thing).remove(name) {
            return value;
        }
    }
    if let (Value::Map(map), Value::Text(name)) = (container, key) {
        if let Some(value) = map.get(name) {
            return value.clone();
        }
    }
    if let (Value::List(items), Value::Number(index)) = (container, key) {
        if index.fract() == 0.0 && *index >= 0.0 {
            if let Some(value) = items.get(*index as usize) {
                return value.clone();
            }
        }
    }
    if let Value::Text(field) = key {
        if let Some(value) = geometric_field(container, field) {
            return value;
        }
    }
    Value::Null
}

fn geometric_field(container: &Value, field: &str) -> Option<Value> {
    let number = |n: f64| Some(Value::Number(n));
    match (container, field) {
        (Value::Position(p), "x") => number(p.x),
        (Value::Position(p), "y") => number(p.y),
        (Value::Position(p), "z") => number(p.z),
        (Value::Orientation(o), "w") => number(o.w()),
        (Value::Orientation(o), "x") => number(o.x()),
        (Value::Orientation(o), "y") => number(o.y()),
        (Value::Orientation(o), "z") => number(o.z()),
        (Value::Pose(p), "position") => Some(Value::Position(p.position)),
        (Value::Pose(p), "orientation") => Some(Value::Orientation(p.orientation)),
        _ => None,
    }
}

fn set_operation(operator: Operator, lhs: Value, rhs: Value) -> Result<Value> {
    let (Value::List(lhs), Value::List(rhs)) = (lhs, rhs) else {
        return Err(ChoreoError::evaluation(format!(
            "{:?} expects two lists",
            operator
        )));
    };
    let mut result: Vec<Value> = Vec::new();
    let mut push_unique = |value: Value| {
        if !result.iter().any(|v| v.same_as(&value)) {
            result.push(value);
        }
    };
    match operator {
        Operator::Union => lhs.into_iter().chain(rhs).for_each(&mut push_unique),
        _ => lhs
            .into_iter()
            .filter(|v| rhs.iter().any(|r| r.same_as(v)))
            .for_each(&mut push_unique),
    }
    Ok(Value::List(result))
}

fn arithmetic(operator: Operator, lhs: Value, rhs: Value) -> Result<Value> {
    use Value::{Number, Text};

    // Absence propagates so an assignment can fall back.
    if lhs.is_null() || rhs.is_null() {
        return Ok(Value::Null);
    }

    let mismatch = |lhs: &Value, rhs: &Value| {
        ChoreoError::evaluation(format!(
            "cannot apply {:?} to {} and {}",
            operator,
            lhs.type_name(),
            rhs.type_name()
        ))
    };

    match (operator, &lhs, &rhs) {
        (Operator::Add, Number(a), Number(b)) => Ok(Number(a + b)),
        (Operator::Add, Text(a), Text(b)) => Ok(Text(format!("{}{}", a, b))),
        (Operator::Add, Value::Position(a), Value::Position(b)) => Ok(Value::Position(a.add(b))),
        (Operator::Add, Value::List(a), Value::List(b)) => {
            Ok(Value::List(a.iter().chain(b).cloned().collect()))
        }
        (Operator::Subtract, Number(a), Number(b)) => Ok(Number(a - b)),
        (Operator::Subtract, Value::Position(a), Value::Position(b)) => {
            Ok(Value::Position(a.sub(b)))
        }
        (Operator::Multiply, Number(a), Number(b)) => Ok(Number(a * b)),
        (Operator::Multiply, Value::Position(p), Number(k))
        | (Operator::Multiply, Number(k), Value::Position(p)) => Ok(Value::Position(p.scale(*k))),
        (Operator::Divide, Number(_), Number(b)) if *b == 0.0 => {
            Err(ChoreoError::evaluation("division by zero"))
        }
        (Operator::Divide, Number(a), Number(b)) => Ok(Number(a / b)),
        (Operator::Power, Number(a), Number(b)) => Ok(Number(a.powf(*b))),
        (Operator::Modulus, Number(_), Number(b)) if *b == 0.0 => {
            Err(ChoreoError::evaluation("modulus by zero"))
        }
        // Result takes the sign of the divisor.
        (Operator::Modulus, Number(a), Number(b)) => Ok(Number(a - b * (a / b).floor())),
        (Operator::CartesianDistance, _, _) => {
            let a = position_of(&lhs).ok_or_else(|| mismatch(&lhs, &rhs))?;
            let b = position_of(&rhs).ok_or_else(|| mismatch(&lhs, &rhs))?;
            Ok(Number(a.distance_to(&b)))
        }
        (Operator::AngularDistance, _, _) => {
            let a = pose_or_orientation(&lhs).ok_or_else(|| mismatch(&lhs, &rhs))?;
            let b = pose_or_orientation(&rhs).ok_or_else(|| mismatch(&lhs, &rhs))?;
            Ok(Number(a.orientation.angular_distance(&b.orientation)))
        }
        _ => Err(mismatch(&lhs, &rhs)),
    }
}

fn position_of(value: &Value) -> Option<Position> {
    match value {
        Value::Position(p) => Some(*p),
        Value::Pose(p) => Some(p.position),
        _ => None,
    }
}

fn pose_or_orientation(value: &Value) -> Option<Pose> {
    match value {
        Value::Pose(p) => Some(*p),
        Value::Orientation(o) => Some(Pose::new(Position::default(), *o)),
        _ => None,
    }
}
