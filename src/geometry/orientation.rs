//! Unit quaternion orientation backed by `nalgebra`.

use nalgebra::{Quaternion, UnitQuaternion};
use serde::{Deserialize, Serialize};

use crate::error::{ChoreoError, Result};

/// Quaternions shorter than this cannot be normalized.
const MIN_NORM: f64 = 1e-12;

/// A rotation stored as a normalized quaternion.
///
/// Euler conversions use roll about X, then pitch about Y, then yaw about Z,
/// all about the fixed frame axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OrientationDoc", into = "QuaternionDoc")]
pub struct Orientation {
    rotation: UnitQuaternion<f64>,
}

impl Orientation {
    /// Build an orientation from quaternion components, normalizing them.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Result<Self> {
        let raw = Quaternion::new(w, x, y, z);
        if !raw.coords.iter().all(|c| c.is_finite()) {
            return Err(ChoreoError::geometry("quaternion has non-finite components"));
        }
        if raw.norm() < MIN_NORM {
            return Err(ChoreoError::geometry("quaternion has zero norm"));
        }
        Ok(Self {
            rotation: UnitQuaternion::from_quaternion(raw),
        })
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Build an orientation from roll, pitch and yaw in radians.
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            rotation: UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        }
    }

    /// Roll, pitch and yaw in radians.
    pub fn to_euler(&self) -> (f64, f64, f64) {
        self.rotation.euler_angles()
    }

    pub fn w(&self) -> f64 {
        self.rotation.quaternion().w
    }

    pub fn x(&self) -> f64 {
        self.rotation.quaternion().i
    }

    pub fn y(&self) -> f64 {
        self.rotation.quaternion().j
    }

    pub fn z(&self) -> f64 {
        self.rotation.quaternion().k
    }

    /// The underlying `nalgebra` rotation.
    pub fn as_unit_quaternion(&self) -> &UnitQuaternion<f64> {
        &self.rotation
    }

    /// Geodesic distance: the rotation angle in `[0, π]` between the two.
    pub fn angular_distance(&self, other: &Orientation) -> f64 {
        self.rotation.angle_to(&other.rotation)
    }

    /// Spherical linear interpolation along the shorter arc.
    ///
    /// `t` is clamped to `[0, 1]`. Nearly identical inputs fall back to a
    /// normalized linear blend.
    pub fn slerp(&self, other: &Orientation, t: f64) -> Orientation {
        let t = t.clamp(0.0, 1.0);
        let rotation = self
            .rotation
            .try_slerp(&other.rotation, t, 1.0e-9)
            .unwrap_or_else(|| self.rotation.nlerp(&other.rotation, t));
        Orientation { rotation }
    }

    /// Whether both orientations describe the same rotation within `tolerance` radians.
    pub fn approx_eq(&self, other: &Orientation, tolerance: f64) -> bool {
        self.angular_distance(other) <= tolerance
    }
}

impl Default for Orientation {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<UnitQuaternion<f64>> for Orientation {
    fn from(rotation: UnitQuaternion<f64>) -> Self {
        Self { rotation }
    }
}

#[derive(Serialize, Deserialize)]
struct QuaternionDoc {
    w: f64,
    x: f64,
    y: f64,
    z: f64,
}

/// Accepted document shapes: a quaternion or an Euler triple.
#[derive(Deserialize)]
#[serde(untagged)]
enum OrientationDoc {
    Quaternion { w: f64, x: f64, y: f64, z: f64 },
    Euler { r: f64, p: f64, y: f64 },
}

impl TryFrom<OrientationDoc> for Orientation {
    type Error = ChoreoError;

    fn try_from(doc: OrientationDoc) -> Result<Self> {
        match doc {
            OrientationDoc::Quaternion { w, x, y, z } => Orientation::new(w, x, y, z),
            OrientationDoc::Euler { r, p, y } => Ok(Orientation::from_euler(r, p, y)),
        }
    }
}

impl From<Orientation> for QuaternionDoc {
    fn from(o: Orientation) -> Self {
        Self {
            w: o.w(),
            x: o.x(),
            y: o.y(),
            z: o.z(),
        }
    }
}
