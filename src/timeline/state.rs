//! Goal-level control on top of the event timeline.
//!
//! A [`StateController`] turns named poses, mode labels and scripted actions
//! from a [`DeploymentConfig`] into timed events, estimating how long each
//! transition takes with the configured [`TimingConfig`].

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};
use super::controller::{EventController, FiredAnnotation, ModeSeed};
use super::event::GroupId;
use crate::config::{ActionStep, DeploymentConfig, FutureConfig, TimingConfig};
use crate::error::{FailOpen, Result};
use crate::geometry::Pose;
use crate::trajectory::Annotation;

/// Reported label for a mode value that matches no declared label.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Sampled state of one mode channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeState {
    pub value: f64,
    pub label: String,
    #[serde(rename = "override")]
    pub override_active: bool,
}

/// Snapshot produced by [`StateController::timestep`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CurrentState {
    pub time: f64,
    pub arms: BTreeMap<String, Pose>,
    pub modes: BTreeMap<String, ModeState>,
    pub annotations: Vec<FiredAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArmFuture {
    pub name: String,
    pub times: Vec<f64>,
    pub poses: Vec<Pose>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeFuture {
    pub name: String,
    pub times: Vec<f64>,
    pub values: Vec<f64>,
}

/// Projection of every channel over the configured horizon.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Future {
    pub arms: Vec<ArmFuture>,
    pub modes: Vec<ModeFuture>,
}

pub struct StateController<C: Clock = SystemClock> {
    clock: C,
    deployment: DeploymentConfig,
    timing: TimingConfig,
    timeline: EventController,
    current: CurrentState,
}

impl<C: Clock> StateController<C> {
    pub fn new(deployment: DeploymentConfig, timing: TimingConfig, clock: C) -> Result<Self> {
        let timeline = seed_timeline(&deployment, clock.now())?;
        let mut controller = Self {
            clock,
            deployment,
            timing,
            timeline,
            current: CurrentState::default(),
        };
        controller.initialize()?;
        Ok(controller)
    }

    /// Reset every channel to its configured starting value at the current time.
    pub fn initialize(&mut self) -> Result<CurrentState> {
        self.timeline = seed_timeline(&self.deployment, self.clock.now())?;
        info!(
            arms = self.deployment.arm_names().len(),
            modes = self.deployment.modes.len(),
            "timeline initialized"
        );
        Ok(self.timestep())
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn timeline(&self) -> &EventController {
        &self.timeline
    }

    pub fn deployment(&self) -> &DeploymentConfig {
        &self.deployment
    }

    /// The snapshot taken by the last [`timestep`](Self::timestep).
    pub fn current(&self) -> &CurrentState {
        &self.current
    }

    pub fn time_to_pose(&self, current: &Pose, goal: &Pose) -> f64 {
        let (linear, angular) = current.distance_to(goal);
        let travel = (linear * self.timing.linear_rate).max(angular * self.timing.angular_rate);
        travel + self.timing.settle_margin
    }

    pub fn time_to_mode(&self, current: f64, goal: f64) -> f64 {
        (current - goal).abs() * self.timing.mode_rate + self.timing.settle_margin
    }

    /// Send an arm to a named pose, `offset` seconds from now or as soon as
    /// the timing estimate allows.
    pub fn set_pose(&mut self, arm: &str, name: &str, offset: Option<f64>) -> Result<GroupId> {
        let goal = self.deployment.pose(arm, name)?;
        let now = self.now();
        let current = self.timeline.pose_at(arm, now)?;
        let offset = offset.unwrap_or_else(|| self.time_to_pose(&current, &goal));
        let group = self.timeline.next_group_id();
        debug!(arm, pose = name, offset, %group, "setting pose");
        self.timeline
            .add_pose_at_time(now, now + offset, arm, goal, group)?;
        Ok(group)
    }

    /// Move a mode toward a labelled value.
    ///
    /// With `override_layer` the value is written to the override layer and
    /// the override is switched on. Otherwise the value lands in the deferred
    /// layer and only shows once no override is active.
    pub fn set_mode(&mut self, mode: &str, label: &str, override_layer: bool) -> Result<GroupId> {
        let goal = self.deployment.mode_value(mode, label)?;
        let now = self.now();
        let current = self.timeline.mode_at(mode, now)?;
        let at = now + self.time_to_mode(current, goal);
        let group = self.timeline.next_group_id();
        debug!(mode, label, override_layer, at, %group, "setting mode");
        self.timeline
            .add_mode_at_time(now, at, mode, goal, override_layer, group)?;
        if override_layer {
            self.timeline.set_mode_override(now, mode, true)?;
        }
        Ok(group)
    }

    /// Hand a mode back to its deferred layer.
    pub fn release_mode_override(&mut self, mode: &str) -> Result<()> {
        let now = self.now();
        self.timeline.set_mode_override(now, mode, false)
    }

    /// Queue an annotation for delivery on the next timestep.
    pub fn set_annotation(&mut self, name: &str, data: Annotation) -> Result<GroupId> {
        let now = self.now();
        let group = self.timeline.next_group_id();
        self.timeline
            .add_annotation_at_time(now, now, name, data, group)?;
        Ok(group)
    }

    /// Start a scripted action.
    ///
    /// Every arm's first step lands at the slowest first transition so the
    /// arms start in lock-step. The first step's `time` is ignored; each later
    /// step is delayed by its `time` relative to the step before. All writes
    /// share one group.
    pub fn set_action(&mut self, name: &str) -> Result<GroupId> {
        let script = self.deployment.action(name)?.clone();
        let now = self.now();

        let mut start = 0.0_f64;
        for (arm, steps) in &script {
            if let Some(first) = steps.first() {
                start = start.max(self.first_step_time(now, arm, first)?);
            }
        }

        let group = self.timeline.next_group_id();
        info!(action = name, start, %group, "starting action");
        for (arm, steps) in &script {
            let mut elapsed = 0.0;
            for (index, step) in steps.iter().enumerate() {
                if index > 0 {
                    elapsed += step.time;
                }
                let at = now + start + elapsed;
                if let Some(pose) = &step.pose {
                    let goal = self.deployment.pose(arm, pose)?;
                    self.timeline.add_pose_at_time(now, at, arm, goal, group)?;
                }
                for (mode, label) in &step.modes {
                    let value = self.deployment.mode_value(mode, label)?;
                    self.timeline
                        .add_mode_at_time(now, at, mode, value, false, group)?;
                }
                for (channel, payload) in &step.annotations {
                    self.timeline
                        .add_annotation_at_time(now, at, channel, payload.clone(), group)?;
                }
            }
        }
        Ok(group)
    }

    fn first_step_time(&self, now: f64, arm: &str, step: &ActionStep) -> Result<f64> {
        let mut estimate = 0.0_f64;
        if let Some(pose) = &step.pose {
            let goal = self.deployment.pose(arm, pose)?;
            let current = self.timeline.pose_at(arm, now)?;
            estimate = estimate.max(self.time_to_pose(&current, &goal));
        }
        for (mode, label) in &step.modes {
            let goal = self.deployment.mode_value(mode, label)?;
            let current = self.timeline.mode_at(mode, now)?;
            estimate = estimate.max(self.time_to_mode(current, goal));
        }
        Ok(estimate)
    }

    /// Advance the timeline to the clock's time and sample every channel.
    pub fn timestep(&mut self) -> CurrentState {
        let time = self.now();
        let annotations = self.timeline.timestep_to(time);

        let mut arms = BTreeMap::new();
        for arm in self.deployment.arm_names() {
            let sampled = self
                .timeline
                .pose_at(&arm, time)
                .map(Some)
                .fail_open_default("sampling arm");
            if let Some(pose) = sampled {
                arms.insert(arm, pose);
            }
        }

        let mut modes = BTreeMap::new();
        for mode in self.deployment.modes.keys() {
            let sampled = self
                .timeline
                .mode_at(mode, time)
                .and_then(|value| Ok((value, self.timeline.mode_override(mode)?)))
                .map(Some)
                .fail_open_default("sampling mode");
            let Some((value, override_active)) = sampled else {
                continue;
            };
            let label = match self.deployment.mode_label(mode, value) {
                Some(label) => label.to_string(),
                None => {
                    debug!(mode = mode.as_str(), value, "mode value between labels");
                    UNKNOWN_LABEL.to_string()
                }
            };
            modes.insert(
                mode.clone(),
                ModeState {
                    value,
                    label,
                    override_active,
                },
            );
        }

        self.current = CurrentState {
            time,
            arms,
            modes,
            annotations,
        };
        self.current.clone()
    }

    /// Sample every arm and mode over the next `config.horizon` seconds.
    pub fn future(&self, config: &FutureConfig) -> Future {
        let now = self.now();
        let arms = self
            .timeline
            .pose_channels()
            .map(|name| {
                let times = linspace(now, now + config.horizon, config.pose_samples);
                let poses = times
                    .iter()
                    .filter_map(|&t| self.timeline.pose_at(name, t).ok())
                    .collect();
                ArmFuture {
                    name: name.to_string(),
                    times,
                    poses,
                }
            })
            .collect();
        let modes = self
            .timeline
            .mode_channels()
            .map(|name| {
                let times = linspace(now, now + config.horizon, config.mode_samples);
                let values = times
                    .iter()
                    .filter_map(|&t| self.timeline.mode_at(name, t).ok())
                    .collect();
                ModeFuture {
                    name: name.to_string(),
                    times,
                    values,
                }
            })
            .collect();
        Future { arms, modes }
    }
}

fn seed_timeline(deployment: &DeploymentConfig, now: f64) -> Result<EventController> {
    let mut poses = BTreeMap::new();
    for arm in deployment.arm_names() {
        poses.insert(arm.clone(), deployment.default_pose(&arm)?);
    }
    let mut modes = BTreeMap::new();
    for (name, mode) in &deployment.modes {
        let seed = ModeSeed {
            value: deployment.mode_value(name, &mode.value)?,
            override_active: mode.override_active,
            range: deployment.mode_range(name),
        };
        modes.insert(name.clone(), seed);
    }
    EventController::new(now, poses, modes, deployment.annotations.iter().cloned())
}

/// `count` evenly spaced times from `start` to `end` inclusive.
fn linspace(start: f64, end: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}
