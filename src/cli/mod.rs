//! CLI commands for choreo.
//!
//! - **resolve**: ground an action from a program document
//! - **plan**: drive a deployment's timeline on a manual clock
//! - **config**: show the effective layered configuration

pub mod config_cmd;
pub mod plan;
pub mod resolve;

pub use config_cmd::ConfigCommand;
pub use plan::PlanCommand;
pub use resolve::ResolveCommand;

use crate::program::Value;

/// Compact single-line rendering of a value for text output.
pub(crate) fn describe_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format!("{}", n),
        Value::Text(s) => format!("{:?}", s),
        Value::Thing(thing) => format!("{}<{}>", thing.name, thing.id),
        Value::Position(p) => format!("({:.3}, {:.3}, {:.3})", p.x, p.y, p.z),
        Value::Pose(pose) => format!(
            "pose({:.3}, {:.3}, {:.3})",
            pose.position.x, pose.position.y, pose.position.z
        ),
        Value::List(items) => format!(
            "[{}]",
            items.iter().map(describe_value).collect::<Vec<_>>().join(", ")
        ),
        other => other.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Thing;

    #[test]
    fn test_describe_value() {
        assert_eq!(describe_value(&Value::Number(1.5)), "1.5");
        assert_eq!(describe_value(&Value::from("hi")), "\"hi\"");
        let ball = Thing::with_id("b1", "ball", vec![]);
        assert_eq!(describe_value(&Value::Thing(ball)), "ball<b1>");
        assert_eq!(
            describe_value(&Value::List(vec![Value::Null, Value::Bool(true)])),
            "[null, true]"
        );
    }
}
