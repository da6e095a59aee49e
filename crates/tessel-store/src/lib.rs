//! Canonical columnar record of every placed tile.
#![forbid(unsafe_code)]

use hashbrown::HashMap;
use tessel_geom::QuantizedPos;
use tessel_tiles::{MeshMode, Orientation, TileFlags, TileKey, TileRecord, TransformOverride};

/// Row value in `transform_index` meaning "no override".
pub const NO_TRANSFORM: i32 = -1;

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub tiles: usize,
    pub transforms: usize,
    pub by_mesh_mode: [usize; MeshMode::COUNT],
}

/// Struct-of-arrays tile store. Rows are dense; removal swaps the last row into
/// the hole. Transform overrides live in a sparse side array addressed through
/// `transform_index` (`-1` = none).
///
/// This is the single source of truth: chunk registries and the lookup index
/// can always be rebuilt from it.
#[derive(Default, Debug, Clone)]
pub struct ColumnarTileStore {
    keys: Vec<TileKey>,
    positions: Vec<QuantizedPos>,
    mesh_modes: Vec<MeshMode>,
    orientations: Vec<Orientation>,
    flags: Vec<TileFlags>,
    transform_index: Vec<i32>,
    transforms: Vec<TransformOverride>,
    // Row that owns transforms[i]; kept so the sparse array can be compacted.
    transform_owner: Vec<u32>,
    rows: HashMap<TileKey, u32>,
}

impl ColumnarTileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            keys: Vec::with_capacity(n),
            positions: Vec::with_capacity(n),
            mesh_modes: Vec::with_capacity(n),
            orientations: Vec::with_capacity(n),
            flags: Vec::with_capacity(n),
            transform_index: Vec::with_capacity(n),
            transforms: Vec::new(),
            transform_owner: Vec::new(),
            rows: HashMap::with_capacity(n),
        }
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    #[inline]
    pub fn exists(&self, key: TileKey) -> bool {
        self.rows.contains_key(&key)
    }

    #[inline]
    pub fn transform_count(&self) -> usize {
        self.transforms.len()
    }

    pub fn get(&self, key: TileKey) -> Option<TileRecord> {
        let row = *self.rows.get(&key)?;
        Some(self.record_at(row as usize))
    }

    /// Inserts or replaces the tile at `key`, returning the prior record.
    pub fn upsert(&mut self, key: TileKey, record: TileRecord) -> Option<TileRecord> {
        if let Some(&row) = self.rows.get(&key) {
            let row = row as usize;
            let prior = self.record_at(row);
            self.positions[row] = record.position;
            self.mesh_modes[row] = record.mesh_mode;
            self.orientations[row] = record.orientation;
            self.flags[row] = record.flags;
            self.set_transform_at(row, record.transform);
            return Some(prior);
        }
        let row = self.keys.len();
        self.keys.push(key);
        self.positions.push(record.position);
        self.mesh_modes.push(record.mesh_mode);
        self.orientations.push(record.orientation);
        self.flags.push(record.flags);
        self.transform_index.push(NO_TRANSFORM);
        self.set_transform_at(row, record.transform);
        self.rows.insert(key, row as u32);
        None
    }

    pub fn remove(&mut self, key: TileKey) -> bool {
        self.take(key).is_some()
    }

    /// Removes and returns the record at `key`.
    pub fn take(&mut self, key: TileKey) -> Option<TileRecord> {
        let row = self.rows.remove(&key)? as usize;
        let record = self.record_at(row);
        self.set_transform_at(row, None);
        let last = self.keys.len() - 1;
        self.keys.swap_remove(row);
        self.positions.swap_remove(row);
        self.mesh_modes.swap_remove(row);
        self.orientations.swap_remove(row);
        self.flags.swap_remove(row);
        self.transform_index.swap_remove(row);
        if row != last {
            let moved = self.keys[row];
            self.rows.insert(moved, row as u32);
            let t = self.transform_index[row];
            if t >= 0 {
                self.transform_owner[t as usize] = row as u32;
            }
        }
        Some(record)
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.positions.clear();
        self.mesh_modes.clear();
        self.orientations.clear();
        self.flags.clear();
        self.transform_index.clear();
        self.transforms.clear();
        self.transform_owner.clear();
        self.rows.clear();
    }

    /// Lazily yields every tile in row order. Calling again restarts.
    pub fn iter(&self) -> impl Iterator<Item = (TileKey, TileRecord)> + '_ {
        (0..self.keys.len()).map(move |row| (self.keys[row], self.record_at(row)))
    }

    pub fn keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.keys.iter().copied()
    }

    /// Raw columns in row order, for writers of the columnar file format.
    pub fn columns(&self) -> StoreColumns<'_> {
        StoreColumns {
            keys: &self.keys,
            positions: &self.positions,
            mesh_modes: &self.mesh_modes,
            orientations: &self.orientations,
            flags: &self.flags,
            transform_index: &self.transform_index,
            transforms: &self.transforms,
        }
    }

    pub fn count_by_mesh_mode(&self) -> [usize; MeshMode::COUNT] {
        let mut out = [0usize; MeshMode::COUNT];
        for m in &self.mesh_modes {
            out[m.index()] += 1;
        }
        out
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            tiles: self.count(),
            transforms: self.transform_count(),
            by_mesh_mode: self.count_by_mesh_mode(),
        }
    }

    fn record_at(&self, row: usize) -> TileRecord {
        let t = self.transform_index[row];
        TileRecord {
            position: self.positions[row],
            mesh_mode: self.mesh_modes[row],
            orientation: self.orientations[row],
            transform: if t >= 0 {
                self.transforms.get(t as usize).copied()
            } else {
                None
            },
            flags: self.flags[row],
        }
    }

    fn set_transform_at(&mut self, row: usize, transform: Option<TransformOverride>) {
        let current = self.transform_index[row];
        match (current >= 0, transform) {
            (true, Some(t)) => self.transforms[current as usize] = t,
            (false, Some(t)) => {
                self.transform_index[row] = self.transforms.len() as i32;
                self.transforms.push(t);
                self.transform_owner.push(row as u32);
            }
            (true, None) => {
                let slot = current as usize;
                let last = self.transforms.len() - 1;
                self.transforms.swap_remove(slot);
                self.transform_owner.swap_remove(slot);
                if slot != last {
                    let owner = self.transform_owner[slot] as usize;
                    self.transform_index[owner] = slot as i32;
                }
                self.transform_index[row] = NO_TRANSFORM;
            }
            (false, None) => {}
        }
    }
}

/// Borrowed view of the store's columns.
#[derive(Clone, Copy, Debug)]
pub struct StoreColumns<'a> {
    pub keys: &'a [TileKey],
    pub positions: &'a [QuantizedPos],
    pub mesh_modes: &'a [MeshMode],
    pub orientations: &'a [Orientation],
    pub flags: &'a [TileFlags],
    pub transform_index: &'a [i32],
    pub transforms: &'a [TransformOverride],
}

impl FromIterator<(TileKey, TileRecord)> for ColumnarTileStore {
    fn from_iter<I: IntoIterator<Item = (TileKey, TileRecord)>>(iter: I) -> Self {
        let mut store = ColumnarTileStore::new();
        for (k, r) in iter {
            store.upsert(k, r);
        }
        store
    }
}
