use serde::{Deserialize, Serialize};
use tessel_geom::{QuantizedPos, Vec3};

use crate::error::TileError;

/// Storage family of a tile. Repeat variants of box/prism share their base
/// family's registry and differ only in how the texture is tiled.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryType {
    Square,
    Triangle,
    Box,
    Prism,
}

impl GeometryType {
    pub const COUNT: usize = 4;
    pub const ALL: [GeometryType; Self::COUNT] = [
        GeometryType::Square,
        GeometryType::Triangle,
        GeometryType::Box,
        GeometryType::Prism,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            GeometryType::Square => "square",
            GeometryType::Triangle => "triangle",
            GeometryType::Box => "box",
            GeometryType::Prism => "prism",
        }
    }

    /// Mesh modes that fold into this geometry type.
    pub fn mesh_modes(self) -> &'static [MeshMode] {
        match self {
            GeometryType::Square => &[MeshMode::Square],
            GeometryType::Triangle => &[MeshMode::Triangle],
            GeometryType::Box => &[MeshMode::Box, MeshMode::BoxRepeat],
            GeometryType::Prism => &[MeshMode::Prism, MeshMode::PrismRepeat],
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MeshMode {
    #[default]
    Square = 0,
    Triangle = 1,
    Box = 2,
    BoxRepeat = 3,
    Prism = 4,
    PrismRepeat = 5,
}

impl MeshMode {
    pub const COUNT: usize = 6;
    pub const ALL: [MeshMode; Self::COUNT] = [
        MeshMode::Square,
        MeshMode::Triangle,
        MeshMode::Box,
        MeshMode::BoxRepeat,
        MeshMode::Prism,
        MeshMode::PrismRepeat,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_u8(v: u8) -> Result<Self, TileError> {
        Self::ALL
            .get(v as usize)
            .copied()
            .ok_or(TileError::InvalidMeshMode(v))
    }

    #[inline]
    pub fn geometry(self) -> GeometryType {
        match self {
            MeshMode::Square => GeometryType::Square,
            MeshMode::Triangle => GeometryType::Triangle,
            MeshMode::Box | MeshMode::BoxRepeat => GeometryType::Box,
            MeshMode::Prism | MeshMode::PrismRepeat => GeometryType::Prism,
        }
    }

    #[inline]
    pub fn is_repeat(self) -> bool {
        matches!(self, MeshMode::BoxRepeat | MeshMode::PrismRepeat)
    }

    pub fn name(self) -> &'static str {
        match self {
            MeshMode::Square => "square",
            MeshMode::Triangle => "triangle",
            MeshMode::Box => "box",
            MeshMode::BoxRepeat => "box_repeat",
            MeshMode::Prism => "prism",
            MeshMode::PrismRepeat => "prism_repeat",
        }
    }
}

/// Discrete placement orientation: the six axis-aligned planes plus twelve
/// 45-degree tilts (floor and ceiling tilted along each horizontal axis, and
/// each wall tilted up or down).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Orientation {
    #[default]
    Floor = 0,
    Ceiling = 1,
    WallNorth = 2,
    WallSouth = 3,
    WallEast = 4,
    WallWest = 5,
    FloorTiltPosX = 6,
    FloorTiltNegX = 7,
    FloorTiltPosZ = 8,
    FloorTiltNegZ = 9,
    CeilingTiltPosX = 10,
    CeilingTiltNegX = 11,
    CeilingTiltPosZ = 12,
    CeilingTiltNegZ = 13,
    WallNorthTiltUp = 14,
    WallSouthTiltUp = 15,
    WallEastTiltUp = 16,
    WallWestTiltUp = 17,
}

impl Orientation {
    pub const COUNT: usize = 18;
    pub const ALL: [Orientation; Self::COUNT] = [
        Orientation::Floor,
        Orientation::Ceiling,
        Orientation::WallNorth,
        Orientation::WallSouth,
        Orientation::WallEast,
        Orientation::WallWest,
        Orientation::FloorTiltPosX,
        Orientation::FloorTiltNegX,
        Orientation::FloorTiltPosZ,
        Orientation::FloorTiltNegZ,
        Orientation::CeilingTiltPosX,
        Orientation::CeilingTiltNegX,
        Orientation::CeilingTiltPosZ,
        Orientation::CeilingTiltNegZ,
        Orientation::WallNorthTiltUp,
        Orientation::WallSouthTiltUp,
        Orientation::WallEastTiltUp,
        Orientation::WallWestTiltUp,
    ];

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(v: u8) -> Result<Self, TileError> {
        Self::ALL
            .get(v as usize)
            .copied()
            .ok_or(TileError::InvalidOrientation(v))
    }
}

/// Per-tile bitset. Bits outside the named flags are preserved untouched.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TileFlags(pub u16);

impl TileFlags {
    pub const NONE: TileFlags = TileFlags(0);
    pub const FLIP_U: TileFlags = TileFlags(1 << 0);
    pub const FLIP_V: TileFlags = TileFlags(1 << 1);
    pub const NO_COLLISION: TileFlags = TileFlags(1 << 2);
    pub const HIDDEN: TileFlags = TileFlags(1 << 3);

    #[inline]
    pub fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    pub fn contains(self, other: TileFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn with(self, other: TileFlags) -> TileFlags {
        TileFlags(self.0 | other.0)
    }
}

/// Optional per-tile adjustment on top of the grid placement.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformOverride {
    #[serde(default)]
    pub offset: Vec3,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
    /// Rotation about the tile's surface normal, in degrees.
    #[serde(default)]
    pub spin_degrees: f32,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

impl Default for TransformOverride {
    fn default() -> Self {
        Self {
            offset: Vec3::ZERO,
            scale: Vec3::ONE,
            spin_degrees: 0.0,
        }
    }
}

impl TransformOverride {
    /// Serialized footprint of one override entry (offset + scale + spin).
    pub const BYTES: usize = 12 + 12 + 4;
}

/// One placed tile as held by the columnar store.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    pub position: QuantizedPos,
    pub mesh_mode: MeshMode,
    pub orientation: Orientation,
    #[serde(default)]
    pub transform: Option<TransformOverride>,
    #[serde(default)]
    pub flags: TileFlags,
}

impl TileRecord {
    #[inline]
    pub fn geometry(&self) -> GeometryType {
        self.mesh_mode.geometry()
    }

    /// Orientation, mesh mode and flags packed the way the columnar format
    /// stores them: `orientation | mesh_mode << 8 | flags << 16`.
    #[inline]
    pub fn packed_state(&self) -> u32 {
        u32::from(self.orientation.as_u8())
            | (u32::from(self.mesh_mode as u8) << 8)
            | (u32::from(self.flags.bits()) << 16)
    }

    pub fn unpack_state(packed: u32) -> Result<(Orientation, MeshMode, TileFlags), TileError> {
        let orientation = Orientation::from_u8((packed & 0xFF) as u8)?;
        let mesh_mode = MeshMode::from_u8(((packed >> 8) & 0xFF) as u8)?;
        let flags = TileFlags((packed >> 16) as u16);
        Ok((orientation, mesh_mode, flags))
    }
}

/// Caller-facing placement request in world units; quantized by the codec.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaceRequest {
    pub position: Vec3,
    #[serde(default)]
    pub mesh_mode: MeshMode,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub transform: Option<TransformOverride>,
    #[serde(default)]
    pub flags: TileFlags,
}

impl PlaceRequest {
    pub fn new(position: Vec3, mesh_mode: MeshMode, orientation: Orientation) -> Self {
        Self {
            position,
            mesh_mode,
            orientation,
            transform: None,
            flags: TileFlags::NONE,
        }
    }

    pub fn at(self, position: Vec3) -> Self {
        Self { position, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_modes_fold_into_base_geometry() {
        assert_eq!(MeshMode::BoxRepeat.geometry(), GeometryType::Box);
        assert_eq!(MeshMode::PrismRepeat.geometry(), GeometryType::Prism);
        assert!(MeshMode::BoxRepeat.is_repeat());
        assert!(!MeshMode::Box.is_repeat());
        for g in GeometryType::ALL {
            for m in g.mesh_modes() {
                assert_eq!(m.geometry(), g);
            }
        }
    }

    #[test]
    fn packed_state_roundtrip() {
        let rec = TileRecord {
            position: QuantizedPos::new(1, 2, 3),
            mesh_mode: MeshMode::PrismRepeat,
            orientation: Orientation::WallWestTiltUp,
            transform: None,
            flags: TileFlags::FLIP_U.with(TileFlags::HIDDEN),
        };
        let (o, m, f) = TileRecord::unpack_state(rec.packed_state()).unwrap();
        assert_eq!(o, rec.orientation);
        assert_eq!(m, rec.mesh_mode);
        assert_eq!(f, rec.flags);
    }

    #[test]
    fn out_of_range_enums_are_rejected() {
        assert_eq!(Orientation::from_u8(18), Err(TileError::InvalidOrientation(18)));
        assert_eq!(MeshMode::from_u8(6), Err(TileError::InvalidMeshMode(6)));
        assert!(TileRecord::unpack_state(0xFF).is_err());
    }
}
