//! Config command for choreo.
//!
//! Shows the effective configuration after layering user, project and
//! environment settings, and which keys differ from the built-in defaults.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;

/// Options for the config command.
#[derive(Debug, Clone, Default)]
pub struct ConfigOptions {
    /// Directory to resolve the project config from.
    pub cwd: PathBuf,
    /// Write the effective config to the project's `.choreo/config.toml`.
    pub save: bool,
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// One key whose effective value differs from the default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigChange {
    pub key: String,
    pub default: String,
    pub effective: String,
}

/// Output format for the config command.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigOutput {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Config>,
    pub changes: Vec<ConfigChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConfigOutput {
    pub fn success(config: Config, saved_to: Option<PathBuf>) -> Self {
        let changes = Config::default()
            .diff(&config)
            .into_iter()
            .map(|(key, default, effective)| ConfigChange {
                key,
                default,
                effective,
            })
            .collect();
        Self {
            success: true,
            config: Some(config),
            changes,
            saved_to,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            config: None,
            changes: Vec::new(),
            saved_to: None,
            error: Some(error.into()),
        }
    }

    /// Format as human-readable text.
    pub fn format_text(&self) -> String {
        if !self.success {
            return format!(
                "Config failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            );
        }
        let Some(config) = &self.config else {
            return "No configuration loaded.".to_string();
        };

        let mut lines = vec![
            "[timing]".to_string(),
            format!("  linear_rate   = {}", config.timing.linear_rate),
            format!("  angular_rate  = {}", config.timing.angular_rate),
            format!("  settle_margin = {}", config.timing.settle_margin),
            format!("  mode_rate     = {}", config.timing.mode_rate),
            "[engine]".to_string(),
            format!("  max_loop_iterations = {}", config.engine.max_loop_iterations),
            format!("  max_alias_depth     = {}", config.engine.max_alias_depth),
            "[future]".to_string(),
            format!("  horizon      = {}", config.future.horizon),
            format!("  pose_samples = {}", config.future.pose_samples),
            format!("  mode_samples = {}", config.future.mode_samples),
        ];

        if self.changes.is_empty() {
            lines.push("All values are defaults.".to_string());
        } else {
            lines.push(format!("{} changed from default:", self.changes.len()));
            for change in &self.changes {
                lines.push(format!(
                    "  {}: {} -> {}",
                    change.key, change.default, change.effective
                ));
            }
        }
        if let Some(path) = &self.saved_to {
            lines.push(format!("Saved to {}", path.display()));
        }
        lines.join("\n")
    }
}

/// The config command implementation.
#[derive(Debug, Default)]
pub struct ConfigCommand;

impl ConfigCommand {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, options: &ConfigOptions) -> ConfigOutput {
        match self.show(options) {
            Ok(output) => output,
            Err(e) => ConfigOutput::failure(e.to_string()),
        }
    }

    /// Render `output` for the terminal according to `options`.
    pub fn format_output(&self, output: &ConfigOutput, options: &ConfigOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            output.format_text()
        }
    }

    fn show(&self, options: &ConfigOptions) -> Result<ConfigOutput> {
        let config = Config::load_from_cwd(&options.cwd);
        let saved_to = if options.save {
            Some(config.save_project(&options.cwd)?)
        } else {
            None
        };
        Ok(ConfigOutput::success(config, saved_to))
    }
}
