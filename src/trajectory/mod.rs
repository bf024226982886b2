//! Continuous-time trajectories over sparse waypoints.
//!
//! A trajectory owns a time-sorted waypoint list and a fitted query function
//! built at construction. Malformed input fails there, never at query time.
//! Trajectories are rebuilt rather than edited when channel content changes.

mod annotation;
mod curve;
mod mode;
mod pose;

pub use annotation::{Annotation, AnnotationTrajectory};
pub use curve::Curve;
pub use mode::ModeTrajectory;
pub use pose::PoseTrajectory;

use serde::{Deserialize, Serialize};

use crate::error::{ChoreoError, Result};

/// Two times closer than this are treated as the same instant.
pub const TIME_EPSILON: f64 = 1e-9;

/// Tolerance for circular endpoint matching.
pub const ENDPOINT_TOLERANCE: f64 = 1e-6;

/// A time-stamped payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint<T> {
    pub time: f64,
    pub value: T,
}

impl<T> Waypoint<T> {
    pub fn new(time: f64, value: T) -> Self {
        Self { time, value }
    }
}

/// Common query surface of every trajectory kind.
pub trait Trajectory {
    /// Payload type produced by a query.
    type Value: Clone;

    /// Waypoints in time order.
    fn waypoints(&self) -> &[Waypoint<Self::Value>];

    /// Whether queries wrap around the waypoint span.
    fn is_circular(&self) -> bool;

    /// Value at `time`, or `None` when there is nothing to report.
    fn sample(&self, time: f64) -> Option<Self::Value>;

    fn is_empty(&self) -> bool {
        self.waypoints().is_empty()
    }

    fn start(&self) -> Option<f64> {
        self.waypoints().first().map(|w| w.time)
    }

    fn end(&self) -> Option<f64> {
        self.waypoints().last().map(|w| w.time)
    }

    /// Length of the covered time interval; zero for fewer than two waypoints.
    fn span(&self) -> f64 {
        match (self.start(), self.end()) {
            (Some(start), Some(end)) => end - start,
            _ => 0.0,
        }
    }
}

/// Most samples a single resample may produce.
pub const MAX_RESAMPLE_POINTS: usize = 1_000_000;

/// Uniform sample times from `start` to `end` inclusive.
pub(crate) fn sample_grid(start: f64, end: f64, resolution: f64) -> Result<Vec<f64>> {
    if !(resolution.is_finite() && resolution > 0.0) {
        return Err(ChoreoError::malformed(format!(
            "resample resolution must be positive, got {}",
            resolution
        )));
    }
    let steps = ((end - start) / resolution).floor();
    if steps.is_nan() || steps >= MAX_RESAMPLE_POINTS as f64 {
        return Err(ChoreoError::malformed(format!(
            "resample of {} s at resolution {} exceeds {} points",
            end - start,
            resolution,
            MAX_RESAMPLE_POINTS
        )));
    }
    let steps = steps as usize;
    let mut times: Vec<f64> = (0..=steps).map(|i| start + i as f64 * resolution).collect();
    let last = times.len() - 1;
    if end - times[last] > TIME_EPSILON {
        times.push(end);
    } else {
        times[last] = end;
    }
    Ok(times)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_grid_includes_end() {
        let grid = sample_grid(0.0, 1.0, 0.3).unwrap();
        assert_eq!(grid.len(), 5);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[4], 1.0);
    }

    #[test]
    fn test_sample_grid_exact_multiple() {
        let grid = sample_grid(0.0, 1.0, 0.25).unwrap();
        assert_eq!(grid, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_sample_grid_degenerate_span() {
        assert_eq!(sample_grid(2.0, 2.0, 0.5).unwrap(), vec![2.0]);
    }

    #[test]
    fn test_sample_grid_rejects_bad_resolution() {
        assert!(sample_grid(0.0, 1.0, 0.0).is_err());
        assert!(sample_grid(0.0, 1.0, -1.0).is_err());
    }

    #[test]
    fn test_sample_grid_rejects_too_many_points() {
        let err = sample_grid(0.0, 3.0, 1e-300).unwrap_err();
        assert!(matches!(err, ChoreoError::MalformedTrajectory { .. }));
        assert!(sample_grid(0.0, 1.0, 1e-7).is_err());
        assert!(sample_grid(0.0, 1.0, 1e-5).is_ok());
    }
}
