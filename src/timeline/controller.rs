//! The event timeline and its per-channel trajectories.
//!
//! Every mutation takes the caller's `now`. After a mutation the affected
//! channel trajectories are rebuilt from the channel's sampled value at `now`
//! followed by every event at or after `now`, so callers never observe a
//! trajectory that still contains retracted events.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::debug;

use super::event::{ChannelKind, ChannelRef, Event, GroupId};
use crate::error::{ChoreoError, Result};
use crate::geometry::Pose;
use crate::trajectory::{
    Annotation, AnnotationTrajectory, ModeTrajectory, PoseTrajectory, Trajectory, Waypoint,
    TIME_EPSILON,
};

/// Initial state of a mode channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeSeed {
    pub value: f64,
    pub override_active: bool,
    pub range: Option<(f64, f64)>,
}

impl ModeSeed {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            override_active: false,
            range: None,
        }
    }
}

#[derive(Debug, Clone)]
struct ModeChannel {
    trajectory: ModeTrajectory,
    override_active: bool,
    range: Option<(f64, f64)>,
}

/// An annotation payload delivered by [`EventController::timestep_to`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiredAnnotation {
    pub time: f64,
    pub channel: String,
    pub payload: Annotation,
}

/// Time-ordered events plus one rebuilt trajectory per channel.
#[derive(Debug, Clone)]
pub struct EventController {
    events: Vec<Event>,
    now: f64,
    poses: BTreeMap<String, PoseTrajectory>,
    modes: BTreeMap<String, ModeChannel>,
    annotations: BTreeMap<String, AnnotationTrajectory>,
    next_group: u64,
}

impl EventController {
    /// Seed every channel with a constant trajectory starting at `now`.
    pub fn new(
        now: f64,
        poses: BTreeMap<String, Pose>,
        modes: BTreeMap<String, ModeSeed>,
        annotations: impl IntoIterator<Item = String>,
    ) -> Result<Self> {
        let poses = poses
            .into_iter()
            .map(|(name, pose)| Ok((name, PoseTrajectory::constant(now, pose)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        let modes = modes
            .into_iter()
            .map(|(name, seed)| {
                let mut trajectory = ModeTrajectory::constant(now, seed.value)?;
                if let Some((min, max)) = seed.range {
                    trajectory = trajectory.with_range(min, max);
                }
                let channel = ModeChannel {
                    trajectory,
                    override_active: seed.override_active,
                    range: seed.range,
                };
                Ok((name, channel))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        let annotations = annotations
            .into_iter()
            .map(|name| (name, AnnotationTrajectory::default()))
            .collect();

        Ok(Self {
            events: Vec::new(),
            now,
            poses,
            modes,
            annotations,
            next_group: 1,
        })
    }

    /// Hand out a fresh group id.
    pub fn next_group_id(&mut self) -> GroupId {
        let id = GroupId(self.next_group);
        self.next_group += 1;
        id
    }

    /// The last time checkpoint seen by a mutation or tick.
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn event_at(&self, time: f64) -> Option<&Event> {
        self.find_event(time).ok().map(|i| &self.events[i])
    }

    pub fn pose_channels(&self) -> impl Iterator<Item = &str> {
        self.poses.keys().map(String::as_str)
    }

    pub fn mode_channels(&self) -> impl Iterator<Item = &str> {
        self.modes.keys().map(String::as_str)
    }

    pub fn annotation_channels(&self) -> impl Iterator<Item = &str> {
        self.annotations.keys().map(String::as_str)
    }

    pub fn pose_trajectory(&self, channel: &str) -> Result<&PoseTrajectory> {
        self.poses
            .get(channel)
            .ok_or_else(|| ChoreoError::unknown_channel(channel))
    }

    pub fn mode_trajectory(&self, channel: &str) -> Result<&ModeTrajectory> {
        self.mode_channel(channel).map(|c| &c.trajectory)
    }

    pub fn annotation_trajectory(&self, channel: &str) -> Result<&AnnotationTrajectory> {
        self.annotations
            .get(channel)
            .ok_or_else(|| ChoreoError::unknown_channel(channel))
    }

    pub fn pose_at(&self, channel: &str, time: f64) -> Result<Pose> {
        self.pose_trajectory(channel)?
            .sample(time)
            .ok_or_else(|| ChoreoError::not_found("pose sample", channel))
    }

    pub fn mode_at(&self, channel: &str, time: f64) -> Result<f64> {
        self.mode_trajectory(channel)?
            .sample(time)
            .ok_or_else(|| ChoreoError::not_found("mode sample", channel))
    }

    pub fn annotation_at(&self, channel: &str, time: f64) -> Result<Option<Annotation>> {
        Ok(self.annotation_trajectory(channel)?.sample(time))
    }

    /// Whether the override layer is the active one for a mode.
    pub fn mode_override(&self, channel: &str) -> Result<bool> {
        self.mode_channel(channel).map(|c| c.override_active)
    }

    pub fn mode_range(&self, channel: &str) -> Result<Option<(f64, f64)>> {
        self.mode_channel(channel).map(|c| c.range)
    }

    /// Schedule a pose for an arm channel.
    ///
    /// If the channel already holds an entry at `time` from another group,
    /// that whole group is retracted first.
    pub fn add_pose_at_time(
        &mut self,
        now: f64,
        time: f64,
        channel: &str,
        pose: Pose,
        group: GroupId,
    ) -> Result<()> {
        self.pose_trajectory(channel)?;
        let target = ChannelRef::new(ChannelKind::Pose, channel);
        let mut dirty = self.supersede(time, &target, group)?;
        self.event_entry(time).set_pose(channel, pose, group);
        dirty.insert(target);
        self.rebuild(now, dirty)
    }

    /// Schedule a mode value in the override or deferred layer.
    pub fn add_mode_at_time(
        &mut self,
        now: f64,
        time: f64,
        channel: &str,
        value: f64,
        override_layer: bool,
        group: GroupId,
    ) -> Result<()> {
        self.mode_channel(channel)?;
        if !value.is_finite() {
            return Err(ChoreoError::malformed(format!(
                "mode value for '{}' is not finite",
                channel
            )));
        }
        let target = ChannelRef::new(ChannelKind::Mode, channel);
        let mut dirty = self.supersede(time, &target, group)?;
        self.event_entry(time)
            .set_mode(channel, value, override_layer, group);
        dirty.insert(target);
        self.rebuild(now, dirty)
    }

    /// Schedule an annotation payload.
    pub fn add_annotation_at_time(
        &mut self,
        now: f64,
        time: f64,
        channel: &str,
        payload: Annotation,
        group: GroupId,
    ) -> Result<()> {
        self.annotation_trajectory(channel)?;
        let target = ChannelRef::new(ChannelKind::Annotation, channel);
        let mut dirty = self.supersede(time, &target, group)?;
        self.event_entry(time)
            .set_annotation(channel, payload, group);
        dirty.insert(target);
        self.rebuild(now, dirty)
    }

    /// Select the active layer of a mode channel.
    ///
    /// Turning the override on purges deferred values at or after `now`.
    pub fn set_mode_override(&mut self, now: f64, channel: &str, value: bool) -> Result<()> {
        let state = self
            .modes
            .get_mut(channel)
            .ok_or_else(|| ChoreoError::unknown_channel(channel))?;
        state.override_active = value;

        if value {
            let mut purged = 0usize;
            for event in self
                .events
                .iter_mut()
                .filter(|e| e.time >= now - TIME_EPSILON)
            {
                if event.clear_mode_layer(channel, false) {
                    purged += 1;
                }
            }
            self.events.retain(|e| !e.is_empty());
            debug!(channel, purged, "override enabled, deferred values purged");
        }

        let mut dirty = BTreeSet::new();
        dirty.insert(ChannelRef::new(ChannelKind::Mode, channel));
        self.rebuild(now, dirty)
    }

    /// Advance to `time`, firing due annotations and pruning past events.
    ///
    /// Trajectories are left as they are; they clamp outside their range.
    pub fn timestep_to(&mut self, time: f64) -> Vec<FiredAnnotation> {
        self.now = time;
        let mut fired = Vec::new();
        for event in self
            .events
            .iter_mut()
            .take_while(|e| e.time <= time + TIME_EPSILON)
        {
            let event_time = event.time;
            for (channel, tagged) in event.take_annotations() {
                fired.push(FiredAnnotation {
                    time: event_time,
                    channel,
                    payload: tagged.value,
                });
            }
        }
        self.events
            .retain(|e| e.time >= time - TIME_EPSILON && !e.is_empty());
        fired
    }

    /// Retract every entry written by `group` and rebuild what it touched.
    pub fn delete_all_with_group_id(&mut self, now: f64, group: GroupId) -> Result<()> {
        let dirty = self.retract(group);
        self.rebuild(now, dirty)
    }

    /// Drop a channel's entries at or after `time`.
    pub fn clear_channel_after(
        &mut self,
        now: f64,
        kind: ChannelKind,
        channel: &str,
        time: f64,
    ) -> Result<()> {
        let target = ChannelRef::new(kind, channel);
        self.check_channel(&target)?;
        for event in self
            .events
            .iter_mut()
            .filter(|e| e.time >= time - TIME_EPSILON)
        {
            event.remove(&target);
        }
        self.events.retain(|e| !e.is_empty());
        let mut dirty = BTreeSet::new();
        dirty.insert(target);
        self.rebuild(now, dirty)
    }

    pub fn clear_pose_after(&mut self, now: f64, channel: &str, time: f64) -> Result<()> {
        self.clear_channel_after(now, ChannelKind::Pose, channel, time)
    }

    pub fn clear_mode_after(&mut self, now: f64, channel: &str, time: f64) -> Result<()> {
        self.clear_channel_after(now, ChannelKind::Mode, channel, time)
    }

    pub fn clear_annotation_after(&mut self, now: f64, channel: &str, time: f64) -> Result<()> {
        self.clear_channel_after(now, ChannelKind::Annotation, channel, time)
    }

    fn mode_channel(&self, channel: &str) -> Result<&ModeChannel> {
        self.modes
            .get(channel)
            .ok_or_else(|| ChoreoError::unknown_channel(channel))
    }

    fn check_channel(&self, channel: &ChannelRef) -> Result<()> {
        let known = match channel.kind {
            ChannelKind::Pose => self.poses.contains_key(&channel.name),
            ChannelKind::Mode => self.modes.contains_key(&channel.name),
            ChannelKind::Annotation => self.annotations.contains_key(&channel.name),
        };
        if known {
            Ok(())
        } else {
            Err(ChoreoError::unknown_channel(channel.name.clone()))
        }
    }

    fn find_event(&self, time: f64) -> std::result::Result<usize, usize> {
        let index = self
            .events
            .partition_point(|e| e.time < time - TIME_EPSILON);
        match self.events.get(index) {
            Some(event) if (event.time - time).abs() <= TIME_EPSILON => Ok(index),
            _ => Err(index),
        }
    }

    fn event_entry(&mut self, time: f64) -> &mut Event {
        let index = match self.find_event(time) {
            Ok(index) => index,
            Err(index) => {
                self.events.insert(index, Event::new(time));
                index
            }
        };
        &mut self.events[index]
    }

    /// Retract the group currently holding `channel` at `time` if it differs.
    fn supersede(
        &mut self,
        time: f64,
        channel: &ChannelRef,
        group: GroupId,
    ) -> Result<BTreeSet<ChannelRef>> {
        if !time.is_finite() {
            return Err(ChoreoError::malformed(format!(
                "event time {} is not finite",
                time
            )));
        }
        let previous = self
            .find_event(time)
            .ok()
            .and_then(|i| self.events[i].group_of(channel));
        match previous {
            Some(old) if old != group => {
                debug!(%old, new = %group, channel = %channel.name, "superseding group");
                Ok(self.retract(old))
            }
            _ => Ok(BTreeSet::new()),
        }
    }

    fn retract(&mut self, group: GroupId) -> BTreeSet<ChannelRef> {
        let mut touched = BTreeSet::new();
        for event in &mut self.events {
            touched.extend(event.retract_group(group));
        }
        self.events.retain(|e| !e.is_empty());
        touched
    }

    fn rebuild(&mut self, now: f64, channels: BTreeSet<ChannelRef>) -> Result<()> {
        self.now = now;
        for channel in channels {
            match channel.kind {
                ChannelKind::Pose => self.rebuild_pose(now, &channel.name)?,
                ChannelKind::Mode => self.rebuild_mode(now, &channel.name)?,
                ChannelKind::Annotation => self.rebuild_annotation(now, &channel.name)?,
            }
        }
        Ok(())
    }

    fn rebuild_pose(&mut self, now: f64, channel: &str) -> Result<()> {
        let current = self.pose_trajectory(channel)?.sample(now);
        let upcoming = self.upcoming(now, |e| e.pose(channel).map(|t| t.value));
        let trajectory = PoseTrajectory::new(with_prefix(now, current, upcoming), false)?;
        self.poses.insert(channel.to_string(), trajectory);
        Ok(())
    }

    fn rebuild_mode(&mut self, now: f64, channel: &str) -> Result<()> {
        let state = self.mode_channel(channel)?;
        let (override_active, range) = (state.override_active, state.range);
        let current = state.trajectory.sample(now);
        let upcoming = self.upcoming(now, |e| {
            e.mode(channel)
                .and_then(|t| t.value.layer(override_active))
        });
        let mut trajectory = ModeTrajectory::new(with_prefix(now, current, upcoming), false)?;
        if let Some((min, max)) = range {
            trajectory = trajectory.with_range(min, max);
        }
        if let Some(state) = self.modes.get_mut(channel) {
            state.trajectory = trajectory;
        }
        Ok(())
    }

    fn rebuild_annotation(&mut self, now: f64, channel: &str) -> Result<()> {
        let upcoming = self.upcoming(now, |e| e.annotation(channel).map(|t| t.value.clone()));
        let trajectory = AnnotationTrajectory::new(upcoming)?;
        self.annotations.insert(channel.to_string(), trajectory);
        Ok(())
    }

    fn upcoming<T>(&self, now: f64, pick: impl Fn(&Event) -> Option<T>) -> Vec<Waypoint<T>> {
        self.events
            .iter()
            .filter(|e| e.time >= now - TIME_EPSILON)
            .filter_map(|e| pick(e).map(|value| Waypoint::new(e.time, value)))
            .collect()
    }
}

/// Put the sampled value at `now` in front unless an event already sits there.
fn with_prefix<T>(now: f64, current: Option<T>, upcoming: Vec<Waypoint<T>>) -> Vec<Waypoint<T>> {
    let starts_at_now = upcoming
        .first()
        .is_some_and(|w| (w.time - now).abs() <= TIME_EPSILON);
    match current {
        Some(value) if !starts_at_now => {
            let mut points = Vec::with_capacity(upcoming.len() + 1);
            points.push(Waypoint::new(now, value));
            points.extend(upcoming);
            points
        }
        _ => upcoming,
    }
}
