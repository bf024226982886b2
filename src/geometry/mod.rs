//! Geometric value types: positions, orientations and poses.
//!
//! These are plain records. Wire formats and message types live outside the
//! crate; everything here only needs three reals for a position and a unit
//! quaternion (or Euler triple) for an orientation.

mod orientation;

pub use orientation::Orientation;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A point in Cartesian space, in metres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to another position.
    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.to_vector() - other.to_vector()).norm()
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Component-wise sum.
    pub fn add(&self, other: &Position) -> Position {
        (self.to_vector() + other.to_vector()).into()
    }

    /// Component-wise difference.
    pub fn sub(&self, other: &Position) -> Position {
        (self.to_vector() - other.to_vector()).into()
    }

    pub fn scale(&self, factor: f64) -> Position {
        (self.to_vector() * factor).into()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn approx_eq(&self, other: &Position, tolerance: f64) -> bool {
        self.distance_to(other) <= tolerance
    }
}

impl From<Vector3<f64>> for Position {
    fn from(v: Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// A position paired with an orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position,
    pub orientation: Orientation,
}

impl Pose {
    pub fn new(position: Position, orientation: Orientation) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Linear (metres) and angular (radians) distance to another pose.
    ///
    /// The two are never folded into a single number; callers weigh them.
    pub fn distance_to(&self, other: &Pose) -> (f64, f64) {
        (
            self.position.distance_to(&other.position),
            self.orientation.angular_distance(&other.orientation),
        )
    }

    pub fn approx_eq(&self, other: &Pose, tolerance: f64) -> bool {
        self.position.approx_eq(&other.position, tolerance)
            && self.orientation.approx_eq(&other.orientation, tolerance)
    }
}
