//! Plan command for choreo.
//!
//! Builds a state controller for a deployment on a manual clock, optionally
//! starts one of its scripted actions, jumps the clock forward and reports
//! the sampled state plus the projected future.

use std::path::PathBuf;

use serde::Serialize;

use crate::config::{Config, DeploymentConfig};
use crate::error::{ChoreoError, Result};
use crate::timeline::{CurrentState, Future, ManualClock, StateController};

/// Options for the plan command.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Deployment file (TOML or JSON).
    pub deployment: PathBuf,
    /// Scripted action to start at time zero.
    pub action: Option<String>,
    /// Seconds to advance the clock before sampling.
    pub at: f64,
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the plan command.
#[derive(Debug, Clone, Serialize)]
pub struct PlanOutput {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<CurrentState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub future: Option<Future>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlanOutput {
    pub fn success(
        action: Option<String>,
        group: Option<u64>,
        state: CurrentState,
        future: Future,
    ) -> Self {
        Self {
            success: true,
            action,
            group,
            state: Some(state),
            future: Some(future),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            action: None,
            group: None,
            state: None,
            future: None,
            error: Some(error.into()),
        }
    }

    /// Format as human-readable text.
    pub fn format_text(&self) -> String {
        if !self.success {
            return format!(
                "Plan failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            );
        }
        let Some(state) = &self.state else {
            return "No state sampled.".to_string();
        };

        let mut lines = Vec::new();
        match (&self.action, self.group) {
            (Some(action), Some(group)) => {
                lines.push(format!("Action {} (group {})", action, group))
            }
            _ => lines.push("No action started".to_string()),
        }
        lines.push(format!("State at t={:.2}s:", state.time));

        for (arm, pose) in &state.arms {
            let (roll, pitch, yaw) = pose.orientation.to_euler();
            lines.push(format!(
                "  {:<12} xyz=({:.3}, {:.3}, {:.3})  rpy=({:.3}, {:.3}, {:.3})",
                arm,
                pose.position.x,
                pose.position.y,
                pose.position.z,
                roll,
                pitch,
                yaw
            ));
        }
        for (mode, mode_state) in &state.modes {
            let layer = if mode_state.override_active {
                "override"
            } else {
                "deferred"
            };
            lines.push(format!(
                "  {:<12} {} ({:.3}, {})",
                mode, mode_state.label, mode_state.value, layer
            ));
        }
        for fired in &state.annotations {
            lines.push(format!(
                "  fired {} at {:.2}s: {}",
                fired.channel, fired.time, fired.payload
            ));
        }

        if let Some(future) = &self.future {
            let horizon = future
                .arms
                .iter()
                .flat_map(|a| a.times.last())
                .chain(future.modes.iter().flat_map(|m| m.times.last()))
                .fold(state.time, |acc, &t| acc.max(t));
            lines.push(format!(
                "Projected {} arms and {} modes to t={:.2}s",
                future.arms.len(),
                future.modes.len(),
                horizon
            ));
        }
        lines.join("\n")
    }
}

/// The plan command implementation.
pub struct PlanCommand {
    config: Config,
}

impl PlanCommand {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn run(&self, options: &PlanOptions) -> PlanOutput {
        match self.plan(options) {
            Ok(output) => output,
            Err(e) => PlanOutput::failure(e.to_string()),
        }
    }

    /// Render `output` for the terminal according to `options`.
    pub fn format_output(&self, output: &PlanOutput, options: &PlanOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            output.format_text()
        }
    }

    fn plan(&self, options: &PlanOptions) -> Result<PlanOutput> {
        if !options.at.is_finite() || options.at < 0.0 {
            return Err(ChoreoError::config(format!(
                "--at must be a non-negative number of seconds, got {}",
                options.at
            )));
        }

        let deployment = DeploymentConfig::load(&options.deployment)?;
        let mut controller =
            StateController::new(deployment, self.config.timing, ManualClock::new(0.0))?;

        let group = match &options.action {
            Some(action) => Some(controller.set_action(action)?.0),
            None => None,
        };

        controller.clock().advance(options.at);
        let state = controller.timestep();
        let future = controller.future(&self.config.future);
        Ok(PlanOutput::success(
            options.action.clone(),
            group,
            state,
            future,
        ))
    }
}
