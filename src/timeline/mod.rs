//! Event timeline and goal-level state control.
//!
//! [`EventController`] owns timestamped [`Event`]s and keeps one trajectory
//! per channel in step with them. [`StateController`] sits on top and turns
//! named goals from a deployment into events.

mod clock;
mod controller;
mod event;
mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{EventController, FiredAnnotation, ModeSeed};
pub use event::{ChannelKind, ChannelRef, Event, GroupId, Mode, Tagged};
pub use state::{
    ArmFuture, CurrentState, Future, ModeFuture, ModeState, StateController, UNKNOWN_LABEL,
};
