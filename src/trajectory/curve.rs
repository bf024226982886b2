//! Scalar curve fitting over time-stamped samples.
//!
//! Curves are monotone piecewise-cubic Hermite interpolants (Fritsch-Carlson
//! slopes with the one-sided edge rule). They pass through every knot and
//! never overshoot between neighbouring knots, which keeps padded ends flat.

use crate::error::{ChoreoError, Result};

/// Offsets used to pad a non-circular channel before its first sample.
const LEAD_PADDING: [f64; 4] = [-20.0, -15.0, -10.0, -5.0];

/// Offsets used to pad a non-circular channel after its last sample.
const TRAIL_PADDING: [f64; 3] = [5.0, 10.0, 15.0];

/// Channels with fewer samples than this get leading padding as well.
const MIN_UNPADDED: usize = 4;

/// The interval a query time is mapped into before evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Domain {
    pub start: f64,
    pub end: f64,
    pub circular: bool,
}

impl Domain {
    /// Clamp (open domain) or wrap (circular domain) a query time.
    pub fn reduce(&self, time: f64) -> f64 {
        let span = self.end - self.start;
        if self.circular && span > 0.0 {
            self.start + (time - self.start).rem_euclid(span)
        } else {
            time.clamp(self.start, self.end)
        }
    }
}

/// A fitted scalar function of time.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    knots: Vec<f64>,
    values: Vec<f64>,
    slopes: Vec<f64>,
}

impl Curve {
    /// Fit a curve through raw knots. Times must be strictly increasing.
    pub fn fit(knots: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        if knots.is_empty() || knots.len() != values.len() {
            return Err(ChoreoError::malformed(format!(
                "curve needs matching, non-empty knots and values ({} vs {})",
                knots.len(),
                values.len()
            )));
        }
        check_increasing(&knots)?;
        let slopes = pchip_slopes(&knots, &values);
        Ok(Self {
            knots,
            values,
            slopes,
        })
    }

    /// Fit an open-domain channel, padding both ends with repeated samples.
    pub fn fit_padded(times: &[f64], values: &[f64]) -> Result<Self> {
        let (first_t, first_v) = match (times.first(), values.first()) {
            (Some(t), Some(v)) => (*t, *v),
            _ => return Err(ChoreoError::malformed("cannot fit an empty channel")),
        };
        let (last_t, last_v) = (times[times.len() - 1], values[values.len() - 1]);

        let mut knots = Vec::with_capacity(times.len() + 7);
        let mut padded = Vec::with_capacity(values.len() + 7);
        if times.len() < MIN_UNPADDED {
            for offset in LEAD_PADDING {
                knots.push(first_t + offset);
                padded.push(first_v);
            }
        }
        knots.extend_from_slice(times);
        padded.extend_from_slice(values);
        for offset in TRAIL_PADDING {
            knots.push(last_t + offset);
            padded.push(last_v);
        }
        Self::fit(knots, padded)
    }

    /// Fit a periodic channel by repeating one period on each side.
    ///
    /// The last sample closes the loop and must match the first.
    pub fn fit_circular(times: &[f64], values: &[f64]) -> Result<Self> {
        let n = times.len();
        if n < 2 || values.len() != n {
            return Err(ChoreoError::malformed(
                "circular channel needs at least two samples",
            ));
        }
        let period = times[n - 1] - times[0];
        let mut knots = Vec::with_capacity(3 * n);
        let mut extended = Vec::with_capacity(3 * n);
        for i in 0..n - 1 {
            knots.push(times[i] - period);
            extended.push(values[i]);
        }
        knots.extend_from_slice(times);
        extended.extend_from_slice(values);
        for i in 1..n {
            knots.push(times[i] + period);
            extended.push(values[i]);
        }
        Self::fit(knots, extended)
    }

    /// Evaluate the curve. Times outside the knot range clamp to the ends.
    pub fn evaluate(&self, time: f64) -> f64 {
        let n = self.knots.len();
        if n == 1 || time <= self.knots[0] {
            return self.values[0];
        }
        if time >= self.knots[n - 1] {
            return self.values[n - 1];
        }
        let k = self.knots.partition_point(|&knot| knot <= time) - 1;
        let h = self.knots[k + 1] - self.knots[k];
        let s = (time - self.knots[k]) / h;
        let s2 = s * s;
        let s3 = s2 * s;
        let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
        let h10 = s3 - 2.0 * s2 + s;
        let h01 = -2.0 * s3 + 3.0 * s2;
        let h11 = s3 - s2;
        h00 * self.values[k]
            + h10 * h * self.slopes[k]
            + h01 * self.values[k + 1]
            + h11 * h * self.slopes[k + 1]
    }
}

/// Reject non-finite or non-increasing times.
pub(crate) fn check_increasing(times: &[f64]) -> Result<()> {
    if let Some(bad) = times.iter().find(|t| !t.is_finite()) {
        return Err(ChoreoError::malformed(format!(
            "waypoint time {} is not finite",
            bad
        )));
    }
    if let Some(pair) = times.windows(2).find(|w| w[1] <= w[0]) {
        return Err(ChoreoError::malformed(format!(
            "waypoint times must increase strictly ({} then {})",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

fn pchip_slopes(knots: &[f64], values: &[f64]) -> Vec<f64> {
    let n = knots.len();
    match n {
        1 => return vec![0.0],
        2 => {
            let d = (values[1] - values[0]) / (knots[1] - knots[0]);
            return vec![d, d];
        }
        _ => {}
    }

    let h: Vec<f64> = knots.windows(2).map(|w| w[1] - w[0]).collect();
    let d: Vec<f64> = values
        .windows(2)
        .zip(&h)
        .map(|(w, h)| (w[1] - w[0]) / h)
        .collect();

    let mut slopes = vec![0.0; n];
    for k in 1..n - 1 {
        if d[k - 1] * d[k] > 0.0 {
            let w1 = 2.0 * h[k] + h[k - 1];
            let w2 = h[k] + 2.0 * h[k - 1];
            slopes[k] = (w1 + w2) / (w1 / d[k - 1] + w2 / d[k]);
        }
    }
    slopes[0] = edge_slope(h[0], h[1], d[0], d[1]);
    slopes[n - 1] = edge_slope(h[n - 2], h[n - 3], d[n - 2], d[n - 3]);
    slopes
}

/// One-sided three-point slope, limited so the end segment stays monotone.
fn edge_slope(h0: f64, h1: f64, d0: f64, d1: f64) -> f64 {
    let m = ((2.0 * h0 + h1) * d0 - h0 * d1) / (h0 + h1);
    if sign(m) != sign(d0) {
        0.0
    } else if sign(d0) != sign(d1) && m.abs() > 3.0 * d0.abs() {
        3.0 * d0
    } else {
        m
    }
}

/// Sign with an explicit zero, unlike `f64::signum`.
fn sign(x: f64) -> i8 {
    if x > 0.0 {
        1
    } else if x < 0.0 {
        -1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_through_knots() {
        let curve = Curve::fit(vec![0.0, 1.0, 3.0, 4.0], vec![0.0, 2.0, 1.0, 5.0]).unwrap();
        assert_eq!(curve.evaluate(0.0), 0.0);
        assert_eq!(curve.evaluate(1.0), 2.0);
        assert_eq!(curve.evaluate(3.0), 1.0);
        assert_eq!(curve.evaluate(4.0), 5.0);
    }

    #[test]
    fn test_no_overshoot_on_plateau() {
        let curve = Curve::fit_padded(&[0.0, 2.0, 6.0], &[0.0, 2.0, 2.0]).unwrap();
        for i in 0..=40 {
            let t = 2.0 + i as f64 * 0.1;
            let v = curve.evaluate(t);
            assert!((v - 2.0).abs() < 1e-12, "value {} at {}", v, t);
        }
    }

    #[test]
    fn test_monotone_between_increasing_knots() {
        let curve = Curve::fit_padded(&[0.0, 2.0, 6.0], &[0.0, 1.0, 2.0]).unwrap();
        let mut previous = curve.evaluate(0.0);
        for i in 1..=60 {
            let v = curve.evaluate(i as f64 * 0.1);
            assert!(v >= previous - 1e-12);
            previous = v;
        }
    }

    #[test]
    fn test_two_knots_are_linear() {
        let curve = Curve::fit(vec![0.0, 2.0], vec![1.0, 3.0]).unwrap();
        assert!((curve.evaluate(0.5) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_single_knot_is_constant() {
        let curve = Curve::fit_padded(&[3.0], &[7.5]).unwrap();
        assert_eq!(curve.evaluate(-100.0), 7.5);
        assert_eq!(curve.evaluate(3.0), 7.5);
        assert_eq!(curve.evaluate(100.0), 7.5);
    }

    #[test]
    fn test_rejects_non_increasing_times() {
        assert!(Curve::fit(vec![0.0, 1.0, 1.0], vec![0.0, 1.0, 2.0]).is_err());
        assert!(Curve::fit(vec![0.0, f64::NAN], vec![0.0, 1.0]).is_err());
        assert!(Curve::fit(vec![], vec![]).is_err());
    }

    #[test]
    fn test_circular_wraps_smoothly() {
        let curve = Curve::fit_circular(&[0.0, 1.0, 2.0, 3.0, 4.0], &[0.0, 1.0, 0.0, -1.0, 0.0])
            .unwrap();
        // Both sides of the seam see the same slope sign.
        assert!(curve.evaluate(0.1) > 0.0);
        assert!(curve.evaluate(3.9) < 0.0);
        assert_eq!(curve.evaluate(4.0), 0.0);
    }

    #[test]
    fn test_domain_reduce() {
        let open = Domain {
            start: 1.0,
            end: 3.0,
            circular: false,
        };
        assert_eq!(open.reduce(0.0), 1.0);
        assert_eq!(open.reduce(5.0), 3.0);

        let circular = Domain {
            circular: true,
            ..open
        };
        assert!((circular.reduce(4.5) - 2.5).abs() < 1e-12);
        assert!((circular.reduce(-0.5) - 1.5).abs() < 1e-12);
    }
}
