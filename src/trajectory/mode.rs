//! Scalar mode trajectories.

use super::curve::{check_increasing, Curve, Domain};
use super::{sample_grid, Trajectory, Waypoint, ENDPOINT_TOLERANCE};
use crate::error::{ChoreoError, Result};

/// A trajectory over scalar mode values.
///
/// Queries are clamped to the range spanned by the waypoint values and,
/// when one is set, to the channel's configured range.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeTrajectory {
    waypoints: Vec<Waypoint<f64>>,
    circular: bool,
    fit: Option<(Domain, Curve)>,
    bounds: Option<(f64, f64)>,
}

impl ModeTrajectory {
    pub fn new(waypoints: Vec<Waypoint<f64>>, circular: bool) -> Result<Self> {
        let times: Vec<f64> = waypoints.iter().map(|w| w.time).collect();
        let values: Vec<f64> = waypoints.iter().map(|w| w.value).collect();
        check_increasing(&times)?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ChoreoError::malformed("mode waypoint value is not finite"));
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
                bounds: None,
            });
        }

        let curve = if circular {
            if values.len() < 2 {
                return Err(ChoreoError::malformed(
                    "circular trajectory needs at least two waypoints",
                ));
            }
            if (values[0] - values[values.len() - 1]).abs() > ENDPOINT_TOLERANCE {
                return Err(ChoreoError::malformed(
                    "circular trajectory must end at its starting value",
                ));
            }
            Curve::fit_circular(&times, &values)?
        } else {
            Curve::fit_padded(&times, &values)?
        };

        let low = values.iter().copied().fold(f64::INFINITY, f64::min);
        let high = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let domain = Domain {
            start: times[0],
            end: times[times.len() - 1],
            circular,
        };

        Ok(Self {
            waypoints,
            circular,
            fit: Some((domain, curve)),
            bounds: Some((low, high)),
        })
    }

    /// A one-waypoint trajectory holding `value` forever.
    pub fn constant(time: f64, value: f64) -> Result<Self> {
        Self::new(vec![Waypoint::new(time, value)], false)
    }

    /// Narrow the output range to `[min, max]` as well.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.bounds = self
            .bounds
            .map(|(low, high)| (low.max(min), high.min(max)))
            .filter(|(low, high)| low <= high)
            .or(Some((min, max)));
        self
    }

    /// Re-sample onto a uniform time grid. An empty trajectory is returned unchanged.
    pub fn resample(&self, resolution: f64) -> Result<Self> {
        let (Some(start), Some(end)) = (self.start(), self.end()) else {
            return Ok(self.clone());
        };
        let waypoints = sample_grid(start, end, resolution)?
            .into_iter()
            .filter_map(|t| self.sample(t).map(|v| Waypoint::new(t, v)))
            .collect();
        let mut resampled = Self::new(waypoints, self.circular)?;
        resampled.bounds = self.bounds;
        Ok(resampled)
    }
}

impl Trajectory for ModeTrajectory {
    type Value = f64;

    fn waypoints(&self) -> &[Waypoint<f64>] {
        &self.waypoints
    }

    fn is_circular(&self) -> bool {
        self.circular
    }

    fn sample(&self, time: f64) -> Option<f64> {
        let (domain, curve) = self.fit.as_ref()?;
        let value = curve.evaluate(domain.reduce(time));
        Some(match self.bounds {
            Some((low, high)) => value.clamp(low, high),
            None => value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(samples: &[(f64, f64)]) -> Vec<Waypoint<f64>> {
        samples.iter().map(|&(t, v)| Waypoint::new(t, v)).collect()
    }

    #[test]
    fn test_hits_waypoints() {
        let traj = ModeTrajectory::new(points(&[(0.0, 0.0), (1.0, 1.0), (3.0, 0.5)]), false).unwrap();
        assert_eq!(traj.sample(0.0), Some(0.0));
        assert_eq!(traj.sample(1.0), Some(1.0));
        assert_eq!(traj.sample(3.0), Some(0.5));
        assert_eq!(traj.sample(10.0), Some(0.5));
    }

    #[test]
    fn test_stays_within_value_range() {
        let traj = ModeTrajectory::new(
            points(&[(0.0, 0.0), (0.5, 1.0), (1.0, 0.0), (1.5, 1.0), (2.0, 0.0)]),
            false,
        )
        .unwrap();
        for i in 0..=40 {
            let v = traj.sample(i as f64 * 0.05).unwrap();
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_with_range_clamps() {
        let traj = ModeTrajectory::new(points(&[(0.0, 0.0), (1.0, 10.0)]), false)
            .unwrap()
            .with_range(0.0, 5.0);
        assert_eq!(traj.sample(1.0), Some(5.0));
    }

    #[test]
    fn test_circular_mode() {
        let traj =
            ModeTrajectory::new(points(&[(0.0, 0.0), (1.0, 1.0), (2.0, 0.0)]), true).unwrap();
        let a = traj.sample(0.25).unwrap();
        let b = traj.sample(4.25).unwrap();
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_circular_mismatch_fails() {
        assert!(ModeTrajectory::new(points(&[(0.0, 0.0), (1.0, 1.0)]), true).is_err());
    }

    #[test]
    fn test_non_finite_value_fails() {
        assert!(ModeTrajectory::new(points(&[(0.0, f64::NAN)]), false).is_err());
    }

    #[test]
    fn test_empty_is_noop() {
        let traj = ModeTrajectory::new(vec![], false).unwrap();
        assert_eq!(traj.sample(0.0), None);
        assert_eq!(traj.resample(1.0).unwrap(), traj);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        /// Strictly increasing times paired with values in [-10, 10].
        fn arb_samples() -> impl Strategy<Value = Vec<(f64, f64)>> {
            prop::collection::vec((0.1f64..5.0, -10.0f64..10.0), 1..8).prop_map(|steps| {
                let mut time = 0.0;
                steps
                    .into_iter()
                    .map(|(step, value)| {
                        time += step;
                        (time, value)
                    })
                    .collect()
            })
        }

        proptest! {
            // Property: the curve passes through every waypoint
            #[test]
            fn prop_hits_waypoints(samples in arb_samples()) {
                let traj = ModeTrajectory::new(points(&samples), false).unwrap();
                for &(t, v) in &samples {
                    prop_assert!((traj.sample(t).unwrap() - v).abs() < 1e-9);
                }
            }

            // Property: samples never leave the range spanned by the waypoints
            #[test]
            fn prop_no_overshoot(samples in arb_samples(), t in -50.0f64..80.0) {
                let traj = ModeTrajectory::new(points(&samples), false).unwrap();
                let low = samples.iter().map(|s| s.1).fold(f64::INFINITY, f64::min);
                let high = samples.iter().map(|s| s.1).fold(f64::NEG_INFINITY, f64::max);
                let v = traj.sample(t).unwrap();
                prop_assert!(v >= low - 1e-9 && v <= high + 1e-9);
            }

            // Property: queries outside the span return the boundary values
            #[test]
            fn prop_clamps_outside_span(samples in arb_samples(), before in 0.01f64..100.0, after in 0.01f64..100.0) {
                let traj = ModeTrajectory::new(points(&samples), false).unwrap();
                let (first, last) = (samples[0], samples[samples.len() - 1]);
                prop_assert!((traj.sample(first.0 - before).unwrap() - first.1).abs() < 1e-9);
                prop_assert!((traj.sample(last.0 + after).unwrap() - last.1).abs() < 1e-9);
            }

            // Property: a circular channel repeats with its period
            #[test]
            fn prop_circular_is_periodic(samples in arb_samples(), t in 0.0f64..1.0, cycles in 1i32..5) {
                let mut samples = samples;
                let period_end = samples[samples.len() - 1].0 + 1.0;
                samples.push((period_end, samples[0].1));
                let traj = ModeTrajectory::new(points(&samples), true).unwrap();

                let start = samples[0].0;
                let period = period_end - start;
                let query = start + t * period;
                let a = traj.sample(query).unwrap();
                let b = traj.sample(query + f64::from(cycles) * period).unwrap();
                prop_assert!((a - b).abs() < 1e-6);
            }
        }
    }
}
