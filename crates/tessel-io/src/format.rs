use serde::{Deserialize, Serialize};
use tessel_store::ColumnarTileStore;
use tessel_tiles::{
    MeshMode, Orientation, TileFlags, TileKeyCodec, TileRecord, TransformOverride,
};

use crate::error::SceneError;

/// Layout written by [`crate::save_scene`]. Version 1 files only ever carried
/// the legacy list.
pub const FORMAT_VERSION: u32 = 2;

fn default_version() -> u32 {
    1
}

/// On-disk scene. Either section may be empty; both being non-empty means a
/// migration was interrupted.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneFile {
    #[serde(default = "default_version")]
    pub format_version: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub legacy: Vec<LegacyTile>,
    #[serde(default)]
    pub columnar: ColumnarData,
}

/// One entry of the list-of-records layout. Enum fields are raw integers and
/// are validated on load.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LegacyTile {
    pub position: [f32; 3],
    #[serde(default)]
    pub mesh_mode: u8,
    #[serde(default)]
    pub orientation: u8,
    #[serde(default)]
    pub transform: Option<TransformOverride>,
    #[serde(default)]
    pub flags: u16,
}

impl LegacyTile {
    pub fn to_record(&self, codec: &TileKeyCodec) -> Result<TileRecord, SceneError> {
        Ok(TileRecord {
            position: codec.quantize(self.position.into())?,
            mesh_mode: MeshMode::from_u8(self.mesh_mode)?,
            orientation: Orientation::from_u8(self.orientation)?,
            transform: self.transform,
            flags: TileFlags(self.flags),
        })
    }

    pub fn from_record(record: &TileRecord, codec: &TileKeyCodec) -> Self {
        Self {
            position: codec.dequantize(record.position).to_array(),
            mesh_mode: record.mesh_mode as u8,
            orientation: record.orientation.as_u8(),
            transform: record.transform,
            flags: record.flags.bits(),
        }
    }
}

/// Parallel-array layout. `transform_index[i]` is `-1` for rows without an
/// override, otherwise an index into `transforms`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnarData {
    #[serde(default)]
    pub positions: Vec<[f32; 3]>,
    /// `orientation | mesh_mode << 8 | flags << 16`
    #[serde(default)]
    pub packed: Vec<u32>,
    #[serde(default)]
    pub transform_index: Vec<i32>,
    #[serde(default)]
    pub transforms: Vec<TransformOverride>,
}

impl ColumnarData {
    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Copies the store's columns, keeping its sparse transform table as is.
    pub fn from_store(store: &ColumnarTileStore, codec: &TileKeyCodec) -> Self {
        let cols = store.columns();
        let positions = cols
            .positions
            .iter()
            .map(|p| codec.dequantize(*p).to_array())
            .collect();
        let packed = cols
            .orientations
            .iter()
            .zip(cols.mesh_modes)
            .zip(cols.flags)
            .map(|((o, m), f)| {
                u32::from(o.as_u8()) | (u32::from(*m as u8) << 8) | (u32::from(f.bits()) << 16)
            })
            .collect();
        Self {
            positions,
            packed,
            transform_index: cols.transform_index.to_vec(),
            transforms: cols.transforms.to_vec(),
        }
    }

    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a TileRecord>,
        codec: &TileKeyCodec,
    ) -> Self {
        let mut out = Self::default();
        for r in records {
            out.positions.push(codec.dequantize(r.position).to_array());
            out.packed.push(r.packed_state());
            match r.transform {
                Some(t) => {
                    out.transform_index.push(out.transforms.len() as i32);
                    out.transforms.push(t);
                }
                None => out.transform_index.push(-1),
            }
        }
        out
    }

    pub fn to_records(&self, codec: &TileKeyCodec) -> Result<Vec<TileRecord>, SceneError> {
        let n = self.positions.len();
        if self.packed.len() != n || self.transform_index.len() != n {
            return Err(SceneError::Columnar(format!(
                "column lengths differ: positions {}, packed {}, transform_index {}",
                n,
                self.packed.len(),
                self.transform_index.len()
            )));
        }
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let (orientation, mesh_mode, flags) = TileRecord::unpack_state(self.packed[i])?;
            let transform = match self.transform_index[i] {
                -1 => None,
                t => {
                    let slot = usize::try_from(t)
                        .ok()
                        .and_then(|t| self.transforms.get(t))
                        .ok_or_else(|| {
                            SceneError::Columnar(format!(
                                "row {} transform index {} out of range ({} transforms)",
                                i,
                                t,
                                self.transforms.len()
                            ))
                        })?;
                    Some(*slot)
                }
            };
            out.push(TileRecord {
                position: codec.quantize(self.positions[i].into())?,
                mesh_mode,
                orientation,
                transform,
                flags,
            });
        }
        Ok(out)
    }
}
