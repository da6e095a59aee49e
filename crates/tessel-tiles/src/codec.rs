//! Tile key encoding.
//!
//! Key layout (128 bits, most significant first):
//! `x:40 | y:40 | z:40 | orientation:8`, each axis stored with a `2^39` bias so
//! keys order by x, then y, then z, then orientation.

use serde::{Deserialize, Serialize};
use tessel_geom::{QuantizedPos, Vec3};

use crate::error::TileError;
use crate::types::Orientation;

const AXIS_BITS: u32 = 40;
const AXIS_MASK: u128 = (1u128 << AXIS_BITS) - 1;
const AXIS_BIAS: i64 = 1i64 << (AXIS_BITS - 1);
/// Largest quantized magnitude a key can hold on any axis.
pub const AXIS_LIMIT: i64 = AXIS_BIAS - 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileKey(pub u128);

impl core::fmt::Display for TileKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Quantizes positions and packs them with an orientation into a [`TileKey`].
///
/// Placement, removal and preview must all go through the same codec value so
/// that equal quantized positions always produce identical keys.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileKeyCodec {
    precision: u8,
    scale: i64,
}

impl TileKeyCodec {
    pub fn new(precision: u8) -> Self {
        Self {
            precision,
            scale: 10i64.pow(u32::from(precision)),
        }
    }

    #[inline]
    pub fn precision(&self) -> u8 {
        self.precision
    }

    #[inline]
    pub fn scale(&self) -> i64 {
        self.scale
    }

    pub fn quantize(&self, p: Vec3) -> Result<QuantizedPos, TileError> {
        let out_of_range = || TileError::PositionOutOfRange {
            x: p.x,
            y: p.y,
            z: p.z,
        };
        let s = self.scale as f64;
        let q = |v: f32| -> Option<i64> {
            if !v.is_finite() {
                return None;
            }
            let r = (f64::from(v) * s).round();
            if r.abs() > AXIS_LIMIT as f64 {
                return None;
            }
            Some(r as i64)
        };
        match (q(p.x), q(p.y), q(p.z)) {
            (Some(x), Some(y), Some(z)) => Ok(QuantizedPos::new(x, y, z)),
            _ => Err(out_of_range()),
        }
    }

    #[inline]
    pub fn dequantize(&self, q: QuantizedPos) -> Vec3 {
        q.to_world(self.scale)
    }

    pub fn encode(&self, p: Vec3, orientation: Orientation) -> Result<TileKey, TileError> {
        let q = self.quantize(p)?;
        self.encode_quantized(q, orientation)
    }

    /// Encodes a raw orientation value, rejecting values outside the enum.
    pub fn encode_raw(&self, p: Vec3, orientation: u8) -> Result<TileKey, TileError> {
        let orientation = Orientation::from_u8(orientation)?;
        self.encode(p, orientation)
    }

    pub fn encode_quantized(
        &self,
        q: QuantizedPos,
        orientation: Orientation,
    ) -> Result<TileKey, TileError> {
        if q.x.abs() > AXIS_LIMIT || q.y.abs() > AXIS_LIMIT || q.z.abs() > AXIS_LIMIT {
            let w = self.dequantize(q);
            return Err(TileError::PositionOutOfRange {
                x: w.x,
                y: w.y,
                z: w.z,
            });
        }
        let field = |v: i64| (v + AXIS_BIAS) as u128 & AXIS_MASK;
        let key = (field(q.x) << (AXIS_BITS * 2 + 8))
            | (field(q.y) << (AXIS_BITS + 8))
            | (field(q.z) << 8)
            | u128::from(orientation.as_u8());
        Ok(TileKey(key))
    }

    pub fn decode(&self, key: TileKey) -> Result<(QuantizedPos, Orientation), TileError> {
        let orientation = Orientation::from_u8((key.0 & 0xFF) as u8)?;
        let axis = |shift: u32| -> Result<i64, TileError> {
            let raw = ((key.0 >> shift) & AXIS_MASK) as i64;
            // A zero field would decode to -2^39, which no encode can produce.
            if raw == 0 {
                return Err(TileError::MalformedKey(key.0));
            }
            Ok(raw - AXIS_BIAS)
        };
        let x = axis(AXIS_BITS * 2 + 8)?;
        let y = axis(AXIS_BITS + 8)?;
        let z = axis(8)?;
        Ok((QuantizedPos::new(x, y, z), orientation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_after_quantization_means_equal_key() {
        let codec = TileKeyCodec::new(3);
        let a = codec.encode(Vec3::new(1.0004, 2.0, -3.0), Orientation::Floor).unwrap();
        let b = codec.encode(Vec3::new(0.9996, 2.0, -3.0), Orientation::Floor).unwrap();
        assert_eq!(a, b);
        let c = codec.encode(Vec3::new(1.002, 2.0, -3.0), Orientation::Floor).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn orientation_is_part_of_the_key() {
        let codec = TileKeyCodec::new(3);
        let p = Vec3::new(4.0, 0.0, 4.0);
        let floor = codec.encode(p, Orientation::Floor).unwrap();
        let wall = codec.encode(p, Orientation::WallNorth).unwrap();
        assert_ne!(floor, wall);
    }

    #[test]
    fn raw_orientation_out_of_range_fails() {
        let codec = TileKeyCodec::new(3);
        assert_eq!(
            codec.encode_raw(Vec3::ZERO, 42),
            Err(TileError::InvalidOrientation(42))
        );
    }

    #[test]
    fn non_finite_and_huge_positions_fail() {
        let codec = TileKeyCodec::new(3);
        assert!(matches!(
            codec.encode(Vec3::new(f32::NAN, 0.0, 0.0), Orientation::Floor),
            Err(TileError::PositionOutOfRange { .. })
        ));
        assert!(matches!(
            codec.encode(Vec3::new(1.0e12, 0.0, 0.0), Orientation::Floor),
            Err(TileError::PositionOutOfRange { .. })
        ));
    }

    #[test]
    fn malformed_keys_are_rejected() {
        let codec = TileKeyCodec::new(3);
        assert_eq!(codec.decode(TileKey(0)), Err(TileError::MalformedKey(0)));
        let good = codec.encode(Vec3::ZERO, Orientation::Ceiling).unwrap();
        let bad_orientation = TileKey((good.0 & !0xFF) | 0xEE);
        assert_eq!(
            codec.decode(bad_orientation),
            Err(TileError::InvalidOrientation(0xEE))
        );
    }

    #[test]
    fn keys_order_by_x_first() {
        let codec = TileKeyCodec::new(3);
        let a = codec.encode(Vec3::new(-1.0, 9.0, 9.0), Orientation::WallWestTiltUp).unwrap();
        let b = codec.encode(Vec3::new(0.0, -9.0, -9.0), Orientation::Floor).unwrap();
        assert!(a < b);
    }
}
