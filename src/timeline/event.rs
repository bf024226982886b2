//! Timestamped channel updates.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Pose;
use crate::trajectory::Annotation;

/// Tag tying together the channel writes issued by one goal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct GroupId(pub u64);

impl GroupId {
    /// Reserved for writes made while seeding a timeline.
    pub const INITIAL: GroupId = GroupId(0);
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group-{}", self.0)
    }
}

/// The kind of signal a channel carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Pose,
    Mode,
    Annotation,
}

/// A channel identified by kind and name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelRef {
    pub kind: ChannelKind,
    pub name: String,
}

impl ChannelRef {
    pub fn new(kind: ChannelKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

/// Layered value of a mode channel at one instant.
///
/// The override layer carries explicit operator intent, the deferred layer
/// ambient behaviour. Which one is read depends on the channel's flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Mode {
    pub override_value: Option<f64>,
    pub deferred_value: Option<f64>,
}

impl Mode {
    pub fn is_empty(&self) -> bool {
        self.override_value.is_none() && self.deferred_value.is_none()
    }

    pub fn has_override(&self) -> bool {
        self.override_value.is_some()
    }

    pub fn has_deferred(&self) -> bool {
        self.deferred_value.is_some()
    }

    /// The value held in the selected layer.
    pub fn layer(&self, override_layer: bool) -> Option<f64> {
        if override_layer {
            self.override_value
        } else {
            self.deferred_value
        }
    }

    pub fn set(&mut self, value: f64, override_layer: bool) {
        if override_layer {
            self.override_value = Some(value);
        } else {
            self.deferred_value = Some(value);
        }
    }

    pub fn clear(&mut self, override_layer: bool) {
        if override_layer {
            self.override_value = None;
        } else {
            self.deferred_value = None;
        }
    }
}

/// A payload together with the group that wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tagged<T> {
    pub value: T,
    pub group: GroupId,
}

/// Every channel update scheduled for one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: f64,
    poses: BTreeMap<String, Tagged<Pose>>,
    modes: BTreeMap<String, Tagged<Mode>>,
    annotations: BTreeMap<String, Tagged<Annotation>>,
}

impl Event {
    pub fn new(time: f64) -> Self {
        Self {
            time,
            poses: BTreeMap::new(),
            modes: BTreeMap::new(),
            annotations: BTreeMap::new(),
        }
    }

    /// True once no channel holds data at this instant.
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty() && self.modes.is_empty() && self.annotations.is_empty()
    }

    pub fn pose(&self, channel: &str) -> Option<&Tagged<Pose>> {
        self.poses.get(channel)
    }

    pub fn mode(&self, channel: &str) -> Option<&Tagged<Mode>> {
        self.modes.get(channel)
    }

    pub fn annotation(&self, channel: &str) -> Option<&Tagged<Annotation>> {
        self.annotations.get(channel)
    }

    pub fn poses(&self) -> impl Iterator<Item = (&String, &Tagged<Pose>)> {
        self.poses.iter()
    }

    pub fn modes(&self) -> impl Iterator<Item = (&String, &Tagged<Mode>)> {
        self.modes.iter()
    }

    pub fn annotations(&self) -> impl Iterator<Item = (&String, &Tagged<Annotation>)> {
        self.annotations.iter()
    }

    /// Group that currently owns a channel's entry, if any.
    pub fn group_of(&self, channel: &ChannelRef) -> Option<GroupId> {
        let name = channel.name.as_str();
        match channel.kind {
            ChannelKind::Pose => self.poses.get(name).map(|t| t.group),
            ChannelKind::Mode => self.modes.get(name).map(|t| t.group),
            ChannelKind::Annotation => self.annotations.get(name).map(|t| t.group),
        }
    }

    pub fn set_pose(&mut self, channel: &str, pose: Pose, group: GroupId) {
        self.poses.insert(
            channel.to_string(),
            Tagged {
                value: pose,
                group,
            },
        );
    }

    /// Write one layer of a mode, keeping the other layer intact.
    pub fn set_mode(&mut self, channel: &str, value: f64, override_layer: bool, group: GroupId) {
        let entry = self.modes.entry(channel.to_string()).or_insert(Tagged {
            value: Mode::default(),
            group,
        });
        entry.value.set(value, override_layer);
        entry.group = group;
    }

    pub fn set_annotation(&mut self, channel: &str, payload: Annotation, group: GroupId) {
        self.annotations.insert(
            channel.to_string(),
            Tagged {
                value: payload,
                group,
            },
        );
    }

    /// Clear one layer of a mode, dropping the entry once both are unset.
    pub fn clear_mode_layer(&mut self, channel: &str, override_layer: bool) -> bool {
        let Some(entry) = self.modes.get_mut(channel) else {
            return false;
        };
        if entry.value.layer(override_layer).is_none() {
            return false;
        }
        entry.value.clear(override_layer);
        if entry.value.is_empty() {
            self.modes.remove(channel);
        }
        true
    }

    /// Remove a channel's entry. Returns whether anything was removed.
    pub fn remove(&mut self, channel: &ChannelRef) -> bool {
        let name = channel.name.as_str();
        match channel.kind {
            ChannelKind::Pose => self.poses.remove(name).is_some(),
            ChannelKind::Mode => self.modes.remove(name).is_some(),
            ChannelKind::Annotation => self.annotations.remove(name).is_some(),
        }
    }

    /// Remove every entry written by `group`, returning the touched channels.
    pub fn retract_group(&mut self, group: GroupId) -> Vec<ChannelRef> {
        let mut touched = Vec::new();
        self.poses.retain(|name, tagged| {
            let keep = tagged.group != group;
            if !keep {
                touched.push(ChannelRef::new(ChannelKind::Pose, name.clone()));
            }
            keep
        });
        self.modes.retain(|name, tagged| {
            let keep = tagged.group != group;
            if !keep {
                touched.push(ChannelRef::new(ChannelKind::Mode, name.clone()));
            }
            keep
        });
        self.annotations.retain(|name, tagged| {
            let keep = tagged.group != group;
            if !keep {
                touched.push(ChannelRef::new(ChannelKind::Annotation, name.clone()));
            }
            keep
        });
        touched
    }

    /// Drain every annotation payload from this event.
    pub fn take_annotations(&mut self) -> BTreeMap<String, Tagged<Annotation>> {
        std::mem::take(&mut self.annotations)
    }
}
