use hashbrown::HashMap;
use tessel_tiles::{GeometryType, TileKey};

use crate::arena::ChunkHandle;

/// Where a tile's visible instance lives.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TileLocation {
    pub chunk: ChunkHandle,
    pub slot: u32,
}

impl TileLocation {
    #[inline]
    pub fn geometry(&self) -> GeometryType {
        self.chunk.geometry
    }
}

/// Key to chunk-slot map. Derived data: rebuilt from the store on load and
/// kept in step with every chunk compaction.
#[derive(Debug, Clone, Default)]
pub struct TileLookupIndex {
    map: HashMap<TileKey, TileLocation>,
}

impl TileLookupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn resolve(&self, key: TileKey) -> Option<TileLocation> {
        self.map.get(&key).copied()
    }

    pub fn insert(&mut self, key: TileKey, location: TileLocation) -> Option<TileLocation> {
        self.map.insert(key, location)
    }

    /// Re-points an existing entry. Returns false if `key` was not indexed.
    pub fn update_location(&mut self, key: TileKey, location: TileLocation) -> bool {
        match self.map.get_mut(&key) {
            Some(entry) => {
                *entry = location;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, key: TileKey) -> Option<TileLocation> {
        self.map.remove(&key)
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileKey, TileLocation)> + '_ {
        self.map.iter().map(|(k, v)| (*k, *v))
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }
}
