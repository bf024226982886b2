//! choreo - action grounding and motion timelines for robot arms
//!
//! Two halves share one crate. The [`program`] module holds a small action
//! language: a knowledge base of primitives and composite actions, a scoped
//! evaluation context over a world of things, and an interpreter that grounds
//! an action into the primitive calls a robot would run. The [`timeline`]
//! module keeps a time-ordered list of pose, mode and annotation events per
//! channel and samples interpolated [`trajectory`] curves from it, so callers
//! can ask where every arm is and will be.

pub mod cli;
pub mod config;
pub mod error;
pub mod geometry;
pub mod program;
pub mod storage;
pub mod timeline;
pub mod trajectory;

pub use config::{Config, DeploymentConfig};
pub use error::{ChoreoError, Result};
pub use geometry::{Orientation, Pose, Position};
pub use program::{
    Action, Context, Executable, GroundedCall, Interpreter, KnowledgeBase, Primitive,
    ProgramDocument, Thing, Value,
};
pub use storage::{FileKnowledgeStore, KnowledgeStore, MemoryKnowledgeStore};
pub use timeline::{CurrentState, EventController, Future, ManualClock, StateController};
pub use trajectory::{ModeTrajectory, PoseTrajectory};

// CLI commands
pub use cli::{ConfigCommand, PlanCommand, ResolveCommand};
