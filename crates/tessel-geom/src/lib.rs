//! Minimal geometry types shared by the tile crates.
#![forbid(unsafe_code)]

use core::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };
    pub const ONE: Vec3 = Vec3 {
        x: 1.0,
        y: 1.0,
        z: 1.0,
    };

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    #[inline]
    pub fn min(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x.min(rhs.x), self.y.min(rhs.y), self.z.min(rhs.z))
    }

    #[inline]
    pub fn max(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x.max(rhs.x), self.y.max(rhs.y), self.z.max(rhs.z))
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    #[inline]
    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Vec3::new(v[0], v[1], v[2])
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    #[inline]
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    #[inline]
    fn add_assign(&mut self, rhs: Vec3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    #[inline]
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;
    #[inline]
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Axis-aligned box used for area fill/erase. Both corners are inclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub struct TileBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl TileBounds {
    /// Builds bounds from two arbitrary corners.
    #[inline]
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    #[inline]
    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

/// A position after quantization to the store's fixed decimal precision.
///
/// Each component is `round(world * 10^precision)`; equality on this type is the
/// only position equality the tile crates rely on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuantizedPos {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl QuantizedPos {
    #[inline]
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn offset(self, dx: i64, dy: i64, dz: i64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Converts back to world units given the quantization scale (`10^precision`).
    #[inline]
    pub fn to_world(self, scale: i64) -> Vec3 {
        let s = scale as f64;
        Vec3::new(
            (self.x as f64 / s) as f32,
            (self.y as f64 / s) as f32,
            (self.z as f64 / s) as f32,
        )
    }
}

/// Integer region coordinate, as wide as a quantized axis. Never stored as
/// authoritative data; always recomputed from a quantized position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId {
    pub rx: i64,
    pub ry: i64,
    pub rz: i64,
}

impl RegionId {
    #[inline]
    pub const fn new(rx: i64, ry: i64, rz: i64) -> Self {
        Self { rx, ry, rz }
    }

    /// Region holding `pos` when each region spans `extent` quantized units per axis.
    #[inline]
    pub fn containing(pos: QuantizedPos, extent: i64) -> Self {
        debug_assert!(extent > 0);
        Self {
            rx: pos.x.div_euclid(extent),
            ry: pos.y.div_euclid(extent),
            rz: pos.z.div_euclid(extent),
        }
    }

    #[inline]
    pub fn offset(self, dx: i64, dy: i64, dz: i64) -> Self {
        Self {
            rx: self.rx + dx,
            ry: self.ry + dy,
            rz: self.rz + dz,
        }
    }
}

impl From<(i64, i64, i64)> for RegionId {
    fn from(value: (i64, i64, i64)) -> Self {
        Self::new(value.0, value.1, value.2)
    }
}

impl From<RegionId> for (i64, i64, i64) {
    fn from(value: RegionId) -> Self {
        (value.rx, value.ry, value.rz)
    }
}

impl core::fmt::Display for RegionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {}, {})", self.rx, self.ry, self.rz)
    }
}
