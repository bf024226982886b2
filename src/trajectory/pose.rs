//! Pose trajectories: spline-fit positions and SLERP orientations.

use super::curve::{check_increasing, Curve, Domain};
use super::{sample_grid, Trajectory, Waypoint, ENDPOINT_TOLERANCE, TIME_EPSILON};
use crate::error::{ChoreoError, Result};
use crate::geometry::{Orientation, Pose, Position};

/// Per-axis position curves plus the query domain.
#[derive(Debug, Clone, PartialEq)]
struct Fit {
    domain: Domain,
    x: Curve,
    y: Curve,
    z: Curve,
}

/// A trajectory over [`Pose`] waypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseTrajectory {
    waypoints: Vec<Waypoint<Pose>>,
    circular: bool,
    fit: Option<Fit>,
}

impl PoseTrajectory {
    /// Build a trajectory, validating and fitting it up front.
    ///
    /// An empty list is accepted and yields a trajectory whose queries
    /// return `None`.
    pub fn new(waypoints: Vec<Waypoint<Pose>>, circular: bool) -> Result<Self> {
        let times: Vec<f64> = waypoints.iter().map(|w| w.time).collect();
        check_increasing(&times)?;
        if waypoints.iter().any(|w| !w.value.position.is_finite()) {
            return Err(ChoreoError::malformed("pose waypoint has non-finite position"));
        }
        if waypoints.is_empty() {
            if circular {
                return Err(ChoreoError::malformed(
                    "circular trajectory needs at least two waypoints",
                ));
            }
            return Ok(Self {
                waypoints,
                circular,
                fit: None,
            });
        }
        if circular {
            check_closed(&waypoints)?;
        }

        let fit_axis = |axis: fn(&Position) -> f64| -> Result<Curve> {
            let values: Vec<f64> = waypoints.iter().map(|w| axis(&w.value.position)).collect();
            if circular {
                Curve::fit_circular(&times, &values)
            } else {
                Curve::fit_padded(&times, &values)
            }
        };
        let fit = Fit {
            domain: Domain {
                start: times[0],
                end: times[times.len() - 1],
                circular,
            },
            x: fit_axis(|p| p.x)?,
            y: fit_axis(|p| p.y)?,
            z: fit_axis(|p| p.z)?,
        };

        Ok(Self {
            waypoints,
            circular,
            fit: Some(fit),
        })
    }

    /// A one-waypoint trajectory holding `pose` forever.
    pub fn constant(time: f64, pose: Pose) -> Result<Self> {
        Self::new(vec![Waypoint::new(time, pose)], false)
    }

    /// Re-sample onto a uniform time grid.
    ///
    /// An empty trajectory is returned unchanged.
    pub fn resample(&self, resolution: f64) -> Result<Self> {
        let (Some(start), Some(end)) = (self.start(), self.end()) else {
            return Ok(self.clone());
        };
        let waypoints = sample_grid(start, end, resolution)?
            .into_iter()
            .filter_map(|t| self.sample(t).map(|pose| Waypoint::new(t, pose)))
            .collect();
        Self::new(waypoints, self.circular)
    }

    fn orientation_at(&self, time: f64) -> Orientation {
        let points = &self.waypoints;
        let first = &points[0];
        let last = &points[points.len() - 1];
        if time <= first.time {
            return first.value.orientation;
        }
        if time >= last.time {
            return last.value.orientation;
        }
        let upper = points.partition_point(|w| w.time <= time);
        let (a, b) = (&points[upper - 1], &points[upper]);
        if (time - a.time).abs() < TIME_EPSILON {
            return a.value.orientation;
        }
        let fraction = (time - a.time) / (b.time - a.time);
        a.value.orientation.slerp(&b.value.orientation, fraction)
    }
}

impl Trajectory for PoseTrajectory {
    type Value = Pose;

    fn waypoints(&self) -> &[Waypoint<Pose>] {
        &self.waypoints
    }

    fn is_circular(&self) -> bool {
        self.circular
    }

    fn sample(&self, time: f64) -> Option<Pose> {
        let fit = self.fit.as_ref()?;
        let t = fit.domain.reduce(time);
        let position = Position::new(fit.x.evaluate(t), fit.y.evaluate(t), fit.z.evaluate(t));
        Some(Pose::new(position, self.orientation_at(t)))
    }
}

fn check_closed(waypoints: &[Waypoint<Pose>]) -> Result<()> {
    if waypoints.len() < 2 {
        return Err(ChoreoError::malformed(
            "circular trajectory needs at least two waypoints",
        ));
    }
    let first = &waypoints[0].value;
    let last = &waypoints[waypoints.len() - 1].value;
    if !first.approx_eq(last, ENDPOINT_TOLERANCE) {
        return Err(ChoreoError::malformed(
            "circular trajectory must end at its starting pose",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn at(time: f64, x: f64, y: f64, z: f64) -> Waypoint<Pose> {
        Waypoint::new(time, Pose::new(Position::new(x, y, z), Orientation::identity()))
    }

    #[test]
    fn test_boundary_values_and_clamping() {
        let traj = PoseTrajectory::new(
            vec![at(0.0, 0.0, 0.0, 0.0), at(2.0, 2.0, 1.0, 0.0), at(6.0, 2.0, 2.0, 1.0)],
            false,
        )
        .unwrap();

        let start = traj.sample(0.0).unwrap();
        let end = traj.sample(6.0).unwrap();
        assert!(start.position.approx_eq(&Position::new(0.0, 0.0, 0.0), 1e-12));
        assert!(end.position.approx_eq(&Position::new(2.0, 2.0, 1.0), 1e-12));
        assert_eq!(traj.sample(-3.0), traj.sample(0.0));
        assert_eq!(traj.sample(42.0), traj.sample(6.0));
    }

    #[test]
    fn test_query_between_waypoints_stays_in_box() {
        let traj = PoseTrajectory::new(
            vec![at(0.0, 0.0, 0.0, 0.0), at(2.0, 2.0, 1.0, 0.0), at(6.0, 2.0, 2.0, 1.0)],
            false,
        )
        .unwrap();

        let p = traj.sample(4.0).unwrap().position;
        assert!((p.x - 2.0).abs() < 1e-12);
        assert!(p.y > 1.0 && p.y < 2.0, "y = {}", p.y);
        assert!(p.z > 0.0 && p.z < 1.0, "z = {}", p.z);
    }

    #[test]
    fn test_orientation_slerps_between_samples() {
        let q1 = Orientation::identity();
        let q2 = Orientation::from_euler(0.0, 0.0, PI / 2.0);
        let traj = PoseTrajectory::new(
            vec![
                Waypoint::new(0.0, Pose::new(Position::default(), q1)),
                Waypoint::new(1.0, Pose::new(Position::default(), q2)),
            ],
            false,
        )
        .unwrap();

        let mid = traj.sample(0.5).unwrap().orientation;
        assert!((q1.angular_distance(&mid) - PI / 4.0).abs() < 1e-9);
        assert_eq!(traj.sample(-1.0).unwrap().orientation, q1);
        assert_eq!(traj.sample(2.0).unwrap().orientation, q2);
    }

    #[test]
    fn test_empty_trajectory() {
        let traj = PoseTrajectory::new(vec![], false).unwrap();
        assert!(traj.is_empty());
        assert!(traj.sample(1.0).is_none());
        assert_eq!(traj.resample(0.1).unwrap(), traj);
    }

    #[test]
    fn test_single_waypoint_is_constant() {
        let traj = PoseTrajectory::constant(5.0, at(0.0, 1.0, 2.0, 3.0).value).unwrap();
        let expected = Position::new(1.0, 2.0, 3.0);
        assert_eq!(traj.sample(0.0).unwrap().position, expected);
        assert_eq!(traj.sample(100.0).unwrap().position, expected);
    }

    #[test]
    fn test_rejects_unordered_times() {
        let result = PoseTrajectory::new(vec![at(1.0, 0.0, 0.0, 0.0), at(1.0, 1.0, 0.0, 0.0)], false);
        assert!(matches!(
            result,
            Err(ChoreoError::MalformedTrajectory { .. })
        ));
    }

    #[test]
    fn test_circular_requires_closed_loop() {
        let open = vec![at(0.0, 0.0, 0.0, 0.0), at(1.0, 1.0, 0.0, 0.0)];
        assert!(PoseTrajectory::new(open, true).is_err());
        assert!(PoseTrajectory::new(vec![at(0.0, 0.0, 0.0, 0.0)], true).is_err());
    }

    #[test]
    fn test_circular_wraps_queries() {
        let traj = PoseTrajectory::new(
            vec![
                at(0.0, 0.0, 0.0, 0.0),
                at(1.0, 1.0, 0.0, 0.0),
                at(2.0, 1.0, 1.0, 0.0),
                at(3.0, 0.0, 0.0, 0.0),
            ],
            true,
        )
        .unwrap();

        let a = traj.sample(0.4).unwrap().position;
        let b = traj.sample(3.4).unwrap().position;
        let c = traj.sample(-2.6).unwrap().position;
        assert!(a.approx_eq(&b, 1e-9));
        assert!(a.approx_eq(&c, 1e-9));
    }

    #[test]
    fn test_resample_keeps_endpoints() {
        let traj = PoseTrajectory::new(
            vec![at(0.0, 0.0, 0.0, 0.0), at(1.0, 1.0, 0.0, 0.0), at(3.0, 1.0, 2.0, 0.0)],
            false,
        )
        .unwrap();
        let dense = traj.resample(0.5).unwrap();
        assert_eq!(dense.waypoints().len(), 7);
        assert_eq!(dense.start(), Some(0.0));
        assert_eq!(dense.end(), Some(3.0));
        assert!(dense
            .sample(3.0)
            .unwrap()
            .position
            .approx_eq(&Position::new(1.0, 2.0, 0.0), 1e-12));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_waypoints() -> impl Strategy<Value = Vec<Waypoint<Pose>>> {
            prop::collection::vec(
                (0.1f64..5.0, -2.0f64..2.0, -2.0f64..2.0, -2.0f64..2.0, -PI..PI),
                1..7,
            )
            .prop_map(|steps| {
                let mut time = 0.0;
                steps
                    .into_iter()
                    .map(|(step, x, y, z, yaw)| {
                        time += step;
                        let orientation = Orientation::from_euler(0.0, 0.0, yaw);
                        Waypoint::new(time, Pose::new(Position::new(x, y, z), orientation))
                    })
                    .collect()
            })
        }

        proptest! {
            // Property: every waypoint is reproduced exactly at its time
            #[test]
            fn prop_hits_waypoints(waypoints in arb_waypoints()) {
                let traj = PoseTrajectory::new(waypoints.clone(), false).unwrap();
                for w in &waypoints {
                    let pose = traj.sample(w.time).unwrap();
                    prop_assert!(pose.position.approx_eq(&w.value.position, 1e-9));
                    prop_assert!(pose.orientation.approx_eq(&w.value.orientation, 1e-6));
                }
            }

            // Property: queries outside the span equal the boundary samples
            #[test]
            fn prop_clamps_outside_span(
                waypoints in arb_waypoints(),
                before in 0.01f64..100.0,
                after in 0.01f64..100.0,
            ) {
                let traj = PoseTrajectory::new(waypoints.clone(), false).unwrap();
                let start = waypoints[0].time;
                let end = waypoints[waypoints.len() - 1].time;
                prop_assert_eq!(traj.sample(start - before), traj.sample(start));
                prop_assert_eq!(traj.sample(end + after), traj.sample(end));
            }

            // Property: a closed loop repeats with its period
            #[test]
            fn prop_circular_is_periodic(
                waypoints in arb_waypoints(),
                t in 0.0f64..1.0,
                cycles in 1i32..5,
            ) {
                let mut waypoints = waypoints;
                let start = waypoints[0].time;
                let period_end = waypoints[waypoints.len() - 1].time + 1.0;
                let home = waypoints[0].value;
                waypoints.push(Waypoint::new(period_end, home));
                let traj = PoseTrajectory::new(waypoints, true).unwrap();

                let period = period_end - start;
                let query = start + t * period;
                let a = traj.sample(query).unwrap();
                let b = traj.sample(query + f64::from(cycles) * period).unwrap();
                prop_assert!(a.position.approx_eq(&b.position, 1e-6));
                prop_assert!(a.orientation.angular_distance(&b.orientation) < 1e-6);
            }
        }
    }
}
