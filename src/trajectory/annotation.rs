//! Discrete annotation channels.

use super::curve::check_increasing;
use super::{Trajectory, Waypoint, TIME_EPSILON};
use crate::error::Result;

/// Annotation payloads are free-form documents.
pub type Annotation = serde_json::Value;

/// A trajectory of discrete payloads with no interpolation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationTrajectory {
    waypoints: Vec<Waypoint<Annotation>>,
}

impl AnnotationTrajectory {
    pub fn new(waypoints: Vec<Waypoint<Annotation>>) -> Result<Self> {
        let times: Vec<f64> = waypoints.iter().map(|w| w.time).collect();
        check_increasing(&times)?;
        Ok(Self { waypoints })
    }

    /// Payloads recorded within `[from, to]`.
    pub fn between(&self, from: f64, to: f64) -> impl Iterator<Item = &Waypoint<Annotation>> {
        self.waypoints
            .iter()
            .filter(move |w| w.time >= from - TIME_EPSILON && w.time <= to + TIME_EPSILON)
    }
}

impl Trajectory for AnnotationTrajectory {
    type Value = Annotation;

    fn waypoints(&self) -> &[Waypoint<Annotation>] {
        &self.waypoints
    }

    fn is_circular(&self) -> bool {
        false
    }

    /// The payload recorded exactly at `time`, if any.
    fn sample(&self, time: f64) -> Option<Annotation> {
        let index = self
            .waypoints
            .partition_point(|w| w.time < time - TIME_EPSILON);
        self.waypoints
            .get(index)
            .filter(|w| (w.time - time).abs() <= TIME_EPSILON)
            .map(|w| w.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_exact_time_only() {
        let traj = AnnotationTrajectory::new(vec![
            Waypoint::new(1.0, json!("wave")),
            Waypoint::new(2.0, json!({"say": "hello"})),
        ])
        .unwrap();
        assert_eq!(traj.sample(1.0), Some(json!("wave")));
        assert_eq!(traj.sample(2.0), Some(json!({"say": "hello"})));
        assert_eq!(traj.sample(1.5), None);
        assert_eq!(traj.sample(0.0), None);
        assert_eq!(traj.sample(3.0), None);
    }

    #[test]
    fn test_between() {
        let traj = AnnotationTrajectory::new(vec![
            Waypoint::new(1.0, json!(1)),
            Waypoint::new(2.0, json!(2)),
            Waypoint::new(3.0, json!(3)),
        ])
        .unwrap();
        let hits: Vec<f64> = traj.between(1.5, 3.0).map(|w| w.time).collect();
        assert_eq!(hits, vec![2.0, 3.0]);
    }

    #[test]
    fn test_rejects_duplicate_times() {
        let result = AnnotationTrajectory::new(vec![
            Waypoint::new(1.0, json!(1)),
            Waypoint::new(1.0, json!(2)),
        ]);
        assert!(result.is_err());
    }
}
