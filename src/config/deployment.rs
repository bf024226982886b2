//! Per-deployment description of arms, named poses, modes and scripted actions.
//!
//! A deployment file is TOML (or JSON when the extension says so):
//!
//! ```toml
//! annotations = ["speech"]
//!
//! [modes.gripper]
//! values = { open = 1.0, closed = 0.0 }
//! value = "open"
//!
//! [poses.left.home]
//! position = { x = 0.3, y = 0.2, z = 0.4 }
//! orientation = { r = 0.0, p = 0.0, y = 0.0 }
//! default = true
//!
//! [actions.wave]
//! left = [
//!     { pose = "home", time = 0.0, modes = { gripper = "closed" } },
//!     { pose = "up", time = 1.5, annotations = { speech = "hello" } },
//! ]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ChoreoError, Result};
use crate::geometry::{Orientation, Pose, Position};
use crate::trajectory::Annotation;

/// Two mode values closer than this map to the same label.
const LABEL_TOLERANCE: f64 = 1e-6;

/// A mode channel: symbolic labels for its numeric values and a start label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeConfig {
    pub values: BTreeMap<String, f64>,
    #[serde(rename = "override", default)]
    pub override_active: bool,
    pub value: String,
}

/// A named pose for one arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseConfig {
    pub position: Position,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub default: bool,
}

impl PoseConfig {
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.orientation)
    }
}

/// One step of a scripted action for one arm.
///
/// `time` is the delay after the previous step (for the first step, after
/// the shared start offset).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionStep {
    pub pose: Option<String>,
    pub time: f64,
    pub modes: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, Annotation>,
}

/// Steps per arm.
pub type ActionScript = BTreeMap<String, Vec<ActionStep>>;

/// Everything a state controller needs to know about one deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Arm channels. Empty means every arm listed under `poses`.
    pub arms: Vec<String>,
    pub annotations: Vec<String>,
    pub modes: BTreeMap<String, ModeConfig>,
    pub poses: BTreeMap<String, BTreeMap<String, PoseConfig>>,
    pub actions: BTreeMap<String, ActionScript>,
}

impl DeploymentConfig {
    /// Load and validate a deployment file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| ChoreoError::storage(path, e))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ChoreoError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every cross reference resolves.
    pub fn validate(&self) -> Result<()> {
        for arm in self.arm_names() {
            if self.poses.get(&arm).is_none_or(|poses| poses.is_empty()) {
                return Err(ChoreoError::config(format!("arm '{}' has no poses", arm)));
            }
        }
        for (name, mode) in &self.modes {
            if mode.values.is_empty() {
                return Err(ChoreoError::config(format!("mode '{}' has no values", name)));
            }
            if !mode.values.contains_key(&mode.value) {
                return Err(ChoreoError::config(format!(
                    "mode '{}' starts at unknown label '{}'",
                    name, mode.value
                )));
            }
            if let Some((label, _)) = mode.values.iter().find(|(_, v)| !v.is_finite()) {
                return Err(ChoreoError::config(format!(
                    "mode '{}' label '{}' is not a finite number",
                    name, label
                )));
            }
        }
        for (action, script) in &self.actions {
            for (arm, steps) in script {
                for step in steps {
                    self.check_step(action, arm, step)?;
                }
            }
        }
        Ok(())
    }

    fn check_step(&self, action: &str, arm: &str, step: &ActionStep) -> Result<()> {
        let context = |what: String| ChoreoError::config(format!("action '{}': {}", action, what));
        if !step.time.is_finite() || step.time < 0.0 {
            return Err(context(format!("negative or non-finite step time {}", step.time)));
        }
        if let Some(pose) = &step.pose {
            let known = self
                .poses
                .get(arm)
                .is_some_and(|poses| poses.contains_key(pose));
            if !known {
                return Err(context(format!("arm '{}' has no pose '{}'", arm, pose)));
            }
        }
        for (mode, label) in &step.modes {
            let known = self
                .modes
                .get(mode)
                .is_some_and(|m| m.values.contains_key(label));
            if !known {
                return Err(context(format!("unknown mode value {}={}", mode, label)));
            }
        }
        for channel in step.annotations.keys() {
            if !self.annotations.contains(channel) {
                return Err(context(format!("undeclared annotation '{}'", channel)));
            }
        }
        Ok(())
    }

    pub fn arm_names(&self) -> Vec<String> {
        if self.arms.is_empty() {
            self.poses.keys().cloned().collect()
        } else {
            self.arms.clone()
        }
    }

    pub fn pose(&self, arm: &str, name: &str) -> Result<Pose> {
        self.poses
            .get(arm)
            .ok_or_else(|| ChoreoError::unknown_channel(arm))?
            .get(name)
            .map(PoseConfig::pose)
            .ok_or_else(|| ChoreoError::not_found("pose", format!("{}/{}", arm, name)))
    }

    /// The pose marked `default`, or the first by name.
    pub fn default_pose(&self, arm: &str) -> Result<Pose> {
        let poses = self
            .poses
            .get(arm)
            .ok_or_else(|| ChoreoError::unknown_channel(arm))?;
        poses
            .values()
            .find(|p| p.default)
            .or_else(|| poses.values().next())
            .map(PoseConfig::pose)
            .ok_or_else(|| ChoreoError::not_found("default pose", arm))
    }

    pub fn mode_value(&self, mode: &str, label: &str) -> Result<f64> {
        self.modes
            .get(mode)
            .ok_or_else(|| ChoreoError::unknown_channel(mode))?
            .values
            .get(label)
            .copied()
            .ok_or_else(|| ChoreoError::not_found("mode label", format!("{}={}", mode, label)))
    }

    /// The label whose value matches, if any.
    pub fn mode_label(&self, mode: &str, value: f64) -> Option<&str> {
        self.modes.get(mode)?.values.iter().find_map(|(label, v)| {
            ((v - value).abs() <= LABEL_TOLERANCE).then_some(label.as_str())
        })
    }

    /// The span of a mode's labelled values.
    pub fn mode_range(&self, mode: &str) -> Option<(f64, f64)> {
        let values = &self.modes.get(mode)?.values;
        let low = values.values().copied().fold(f64::INFINITY, f64::min);
        let high = values.values().copied().fold(f64::NEG_INFINITY, f64::max);
        (low <= high).then_some((low, high))
    }

    pub fn action(&self, name: &str) -> Result<&ActionScript> {
        self.actions
            .get(name)
            .ok_or_else(|| ChoreoError::not_found("action", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
annotations = ["speech"]

[modes.gripper]
values = { open = 1.0, closed = 0.0 }
value = "open"

[modes.speed]
values = { slow = 0.2, fast = 0.8 }
override = true
value = "slow"

[poses.left.home]
position = { x = 0.0, y = 0.0, z = 0.0 }
default = true

[poses.left.up]
position = { x = 0.0, y = 0.0, z = 1.0 }
orientation = { r = 0.0, p = 0.0, y = 1.5707963267948966 }

[poses.right.rest]
position = { x = 1.0, y = 0.0, z = 0.0 }

[actions.wave]
left = [
    { pose = "up", time = 0.0, modes = { gripper = "closed" } },
    { pose = "home", time = 2.0, annotations = { speech = "hello" } },
]
right = [
    { pose = "rest", time = 1.0 },
]
"#;

    #[test]
    fn test_parse_sample() {
        let config = DeploymentConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.arm_names(), vec!["left", "right"]);
        assert!(config.modes["speed"].override_active);
        assert_eq!(config.mode_value("gripper", "closed").unwrap(), 0.0);
        assert_eq!(config.action("wave").unwrap()["left"].len(), 2);
    }

    #[test]
    fn test_default_pose() {
        let config = DeploymentConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.default_pose("left").unwrap().position.z, 0.0);
        assert_eq!(config.default_pose("right").unwrap().position.x, 1.0);
        assert!(config.default_pose("tail").is_err());
    }

    #[test]
    fn test_mode_label_lookup() {
        let config = DeploymentConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.mode_label("speed", 0.8), Some("fast"));
        assert_eq!(config.mode_label("speed", 0.5), None);
        assert_eq!(config.mode_range("speed"), Some((0.2, 0.8)));
    }

    #[test]
    fn test_rejects_unknown_start_label() {
        let bad = r#"
[modes.gripper]
values = { open = 1.0 }
value = "ajar"
"#;
        assert!(DeploymentConfig::from_toml_str(bad).is_err());
    }

    #[test]
    fn test_rejects_action_with_unknown_pose() {
        let bad = r#"
[poses.left.home]
position = { x = 0.0, y = 0.0, z = 0.0 }

[actions.reach]
left = [{ pose = "far" }]
"#;
        let err = DeploymentConfig::from_toml_str(bad).unwrap_err();
        assert!(err.to_string().contains("far"));
    }

    #[test]
    fn test_rejects_arm_without_poses() {
        let bad = r#"arms = ["left"]"#;
        assert!(DeploymentConfig::from_toml_str(bad).is_err());
    }

    #[test]
    fn test_json_deployment() {
        let json = r#"{
            "poses": {"left": {"home": {"position": {"x": 0, "y": 0, "z": 0},
                                        "orientation": {"w": 1, "x": 0, "y": 0, "z": 0}}}}
        }"#;
        let config = DeploymentConfig::from_json_str(json).unwrap();
        assert_eq!(config.arm_names(), vec!["left"]);
    }
}
