//! Configuration loading for choreo.
//!
//! Engine configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.choreo/config.toml`)
//! 3. User config (`~/.choreo/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! Deployment descriptions (arms, poses, modes, scripted actions) are a
//! separate file handed to the state controller; see [`DeploymentConfig`].

mod deployment;

pub use deployment::{
    ActionScript, ActionStep, DeploymentConfig, ModeConfig, PoseConfig,
};

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ChoreoError, FailOpen, Result};

/// Name of the per-project and per-user configuration directory.
pub const CONFIG_DIR: &str = ".choreo";

/// Main configuration struct for choreo.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Transition time estimates.
    pub timing: TimingConfig,
    /// Interpreter limits.
    pub engine: EngineConfig,
    /// Future projection sampling.
    pub future: FutureConfig,
}

/// Policy used to estimate how long a channel takes to reach a goal.
///
/// `time_to_pose = max(linear * linear_rate, angular * angular_rate) + settle_margin`
/// and `time_to_mode = |delta| * mode_rate + settle_margin`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    /// Seconds per metre of travel.
    pub linear_rate: f64,
    /// Seconds per radian of rotation.
    pub angular_rate: f64,
    /// Fixed settling time added to every transition.
    pub settle_margin: f64,
    /// Seconds per unit of mode value change.
    pub mode_rate: f64,
}

impl TimingConfig {
    /// Rates and margins must be finite and non-negative.
    pub fn is_valid_rate(value: f64) -> bool {
        value.is_finite() && value >= 0.0
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            linear_rate: 5.0,
            angular_rate: 2.0,
            settle_margin: 0.5,
            mode_rate: 10.0,
        }
    }
}

/// Limits applied while executing or resolving programs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Iterations allowed per loop construct before execution fails.
    pub max_loop_iterations: u64,
    /// Alias hops allowed while resolving one reference.
    pub max_alias_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: 10_000,
            max_alias_depth: 64,
        }
    }
}

/// Sampling of future projections.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FutureConfig {
    /// Seconds ahead of now to project.
    pub horizon: f64,
    /// Samples per arm.
    pub pose_samples: usize,
    /// Samples per mode.
    pub mode_samples: usize,
}

impl Default for FutureConfig {
    fn default() -> Self {
        Self {
            horizon: 5.0,
            pose_samples: 10,
            mode_samples: 20,
        }
    }
}

impl Config {
    /// Load configuration with full precedence chain from the current directory.
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = Config::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = Config::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();

        config
    }

    fn load_user_config() -> Option<Config> {
        let path = choreo_home()?.join("config.toml");
        Self::load_optional(&path)
    }

    fn load_project_config(cwd: &Path) -> Option<Config> {
        let path = project_config_dir(cwd).join("config.toml");
        Self::load_optional(&path)
    }

    /// A missing file is silent; an unreadable or invalid one is reported.
    fn load_optional(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        Self::load_from_file(path)
            .map(Some)
            .fail_open_default(&format!("loading {}", path.display()))
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).map_err(|e| ChoreoError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| ChoreoError::config(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        override_from_env(
            "CHOREO_LINEAR_RATE",
            &mut self.timing.linear_rate,
            |v| TimingConfig::is_valid_rate(*v),
            "a non-negative number",
        );
        override_from_env(
            "CHOREO_ANGULAR_RATE",
            &mut self.timing.angular_rate,
            |v| TimingConfig::is_valid_rate(*v),
            "a non-negative number",
        );
        override_from_env(
            "CHOREO_SETTLE_MARGIN",
            &mut self.timing.settle_margin,
            |v| TimingConfig::is_valid_rate(*v),
            "a non-negative number",
        );
        override_from_env(
            "CHOREO_MODE_RATE",
            &mut self.timing.mode_rate,
            |v| TimingConfig::is_valid_rate(*v),
            "a non-negative number",
        );
        override_from_env(
            "CHOREO_MAX_LOOP_ITERATIONS",
            &mut self.engine.max_loop_iterations,
            |v| *v >= 1,
            "a positive integer",
        );
        override_from_env(
            "CHOREO_MAX_ALIAS_DEPTH",
            &mut self.engine.max_alias_depth,
            |v| *v >= 1,
            "a positive integer",
        );
    }

    /// Merge another config into this one, field by field.
    ///
    /// A value from `other` wins only when it differs from the default, so a
    /// layer cannot reset a lower layer's customization back to the default.
    fn merge(mut self, other: Config) -> Self {
        let timing = TimingConfig::default();
        if other.timing.linear_rate != timing.linear_rate {
            self.timing.linear_rate = other.timing.linear_rate;
        }
        if other.timing.angular_rate != timing.angular_rate {
            self.timing.angular_rate = other.timing.angular_rate;
        }
        if other.timing.settle_margin != timing.settle_margin {
            self.timing.settle_margin = other.timing.settle_margin;
        }
        if other.timing.mode_rate != timing.mode_rate {
            self.timing.mode_rate = other.timing.mode_rate;
        }

        let engine = EngineConfig::default();
        if other.engine.max_loop_iterations != engine.max_loop_iterations {
            self.engine.max_loop_iterations = other.engine.max_loop_iterations;
        }
        if other.engine.max_alias_depth != engine.max_alias_depth {
            self.engine.max_alias_depth = other.engine.max_alias_depth;
        }

        let future = FutureConfig::default();
        if other.future.horizon != future.horizon {
            self.future.horizon = other.future.horizon;
        }
        if other.future.pose_samples != future.pose_samples {
            self.future.pose_samples = other.future.pose_samples;
        }
        if other.future.mode_samples != future.mode_samples {
            self.future.mode_samples = other.future.mode_samples;
        }

        self
    }

    /// Save configuration to the project config file atomically.
    pub fn save_project(&self, cwd: &Path) -> Result<PathBuf> {
        let dir = cwd.join(CONFIG_DIR);
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| ChoreoError::storage(&dir, e))?;
        }

        let config_path = dir.join("config.toml");
        let content =
            toml::to_string_pretty(self).map_err(|e| ChoreoError::config(e.to_string()))?;

        let temp_path = dir.join(".config.toml.tmp");
        fs::write(&temp_path, &content).map_err(|e| ChoreoError::storage(&temp_path, e))?;
        let file = fs::File::open(&temp_path).map_err(|e| ChoreoError::storage(&temp_path, e))?;
        file.sync_all()
            .map_err(|e| ChoreoError::storage(&temp_path, e))?;
        drop(file);

        fs::rename(&temp_path, &config_path).map_err(|e| ChoreoError::storage(&config_path, e))?;

        Ok(config_path)
    }

    /// List (key, old_value, new_value) for every field that differs.
    pub fn diff(&self, other: &Config) -> Vec<(String, String, String)> {
        let mut changes = Vec::new();
        let mut push = |key: &str, old: String, new: String| {
            if old != new {
                changes.push((key.to_string(), old, new));
            }
        };

        push(
            "timing.linear_rate",
            self.timing.linear_rate.to_string(),
            other.timing.linear_rate.to_string(),
        );
        push(
            "timing.angular_rate",
            self.timing.angular_rate.to_string(),
            other.timing.angular_rate.to_string(),
        );
        push(
            "timing.settle_margin",
            self.timing.settle_margin.to_string(),
            other.timing.settle_margin.to_string(),
        );
        push(
            "timing.mode_rate",
            self.timing.mode_rate.to_string(),
            other.timing.mode_rate.to_string(),
        );
        push(
            "engine.max_loop_iterations",
            self.engine.max_loop_iterations.to_string(),
            other.engine.max_loop_iterations.to_string(),
        );
        push(
            "engine.max_alias_depth",
            self.engine.max_alias_depth.to_string(),
            other.engine.max_alias_depth.to_string(),
        );
        push(
            "future.horizon",
            self.future.horizon.to_string(),
            other.future.horizon.to_string(),
        );
        push(
            "future.pose_samples",
            self.future.pose_samples.to_string(),
            other.future.pose_samples.to_string(),
        );
        push(
            "future.mode_samples",
            self.future.mode_samples.to_string(),
            other.future.mode_samples.to_string(),
        );

        changes
    }
}

/// Replace `slot` with a parsed environment value when it is present and valid.
fn override_from_env<T>(name: &str, slot: &mut T, valid: impl Fn(&T) -> bool, expected: &str)
where
    T: FromStr + Display,
{
    let Ok(raw) = env::var(name) else {
        return;
    };
    match raw.parse::<T>() {
        Ok(value) if valid(&value) => *slot = value,
        _ => eprintln!(
            "Warning: Invalid {} value '{}'. Expected {}. Using '{}'.",
            name, raw, expected, slot
        ),
    }
}

/// Get the choreo home directory.
///
/// Checks `CHOREO_HOME` first, then falls back to `~/.choreo`.
pub fn choreo_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("CHOREO_HOME") {
        if home.is_empty() {
            tracing::warn!("CHOREO_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("CHOREO_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(CONFIG_DIR));
    }

    let fallback = env::temp_dir().join("choreo");
    tracing::warn!("HOME not set, using fallback location: {}", fallback.display());
    Some(fallback)
}

/// The nearest ancestor holding a `.choreo/` directory, or `cwd` itself.
pub fn find_project_root(cwd: &Path) -> PathBuf {
    cwd.ancestors()
        .find(|dir| dir.join(CONFIG_DIR).is_dir())
        .unwrap_or(cwd)
        .to_path_buf()
}

/// The project's `.choreo/` directory.
pub fn project_config_dir(cwd: &Path) -> PathBuf {
    find_project_root(cwd).join(CONFIG_DIR)
}

/// Directory used by the file-backed knowledge store.
pub fn knowledge_dir() -> Option<PathBuf> {
    choreo_home().map(|home| home.join("knowledge"))
}
