//! Canonical coordinate record

use std::fmt;

use serde::{Deserialize, Serialize};

/// A canonical 3D coordinate.
///
/// Every coordinate that leaves the Normalizer has this shape; a missing
/// third component defaults to `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    /// Create a new coordinate
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Point3 { x, y, z }
    }

    /// Origin
    pub const ZERO: Point3 = Point3::new(0.0, 0.0, 0.0);

    /// Create a 2D coordinate with `z = 0.0`
    pub const fn from_xy(x: f64, y: f64) -> Self {
        Point3::new(x, y, 0.0)
    }

    /// Component-wise absolute difference is below `eps` for all axes
    pub fn approx_eq(&self, other: &Point3, eps: f64) -> bool {
        (self.x - other.x).abs() < eps
            && (self.y - other.y).abs() < eps
            && (self.z - other.z).abs() < eps
    }
}

impl Default for Point3 {
    fn default() -> Self {
        Point3::ZERO
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}
