use hashbrown::HashMap;
use tessel_chunk::{InstanceChunk, SlotRemoval};
use tessel_geom::RegionId;
use tessel_tiles::{GeometryType, TileKey, TileRecord};

use crate::arena::{ChunkArena, ChunkHandle, ChunkId};

/// Where a placement landed inside a registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChunkPlacement {
    pub handle: ChunkHandle,
    pub slot: u32,
    /// A fresh chunk was allocated for this placement.
    pub created: bool,
}

/// Outcome of freeing an instance through the registry.
#[derive(Clone, Debug)]
pub struct ChunkRelease {
    pub removal: SlotRemoval,
    /// The chunk became empty and was dropped from its region list.
    pub chunk_dropped: bool,
}

/// Region-partitioned list of chunks for one geometry type.
///
/// Every geometry type gets an instance of the same registry; the behaviour
/// does not branch on geometry. Regions with no chunks have no entry.
#[derive(Debug, Clone)]
pub struct ChunkRegistry {
    geometry: GeometryType,
    capacity: usize,
    arena: ChunkArena,
    regions: HashMap<RegionId, Vec<ChunkId>>,
    // Bookkeeping counter kept alongside the lists; audits compare the two.
    chunk_counter: usize,
}

impl ChunkRegistry {
    /// `capacity` is clamped to at least one instance per chunk.
    pub fn new(geometry: GeometryType, capacity: usize) -> Self {
        Self {
            geometry,
            capacity: capacity.max(1),
            arena: ChunkArena::new(),
            regions: HashMap::new(),
            chunk_counter: 0,
        }
    }

    #[inline]
    pub fn geometry(&self) -> GeometryType {
        self.geometry
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts into the first chunk of `region` with room, allocating a new
    /// chunk when every existing one is full.
    pub fn place(&mut self, region: RegionId, key: TileKey, record: TileRecord) -> ChunkPlacement {
        let list = self.regions.entry(region).or_default();
        for &id in list.iter() {
            let Some(chunk) = self.arena.get_mut(id) else {
                continue;
            };
            if let Ok(slot) = chunk.try_insert(key, record) {
                return ChunkPlacement {
                    handle: ChunkHandle {
                        geometry: self.geometry,
                        region,
                        id,
                    },
                    slot,
                    created: false,
                };
            }
        }
        let mut chunk = InstanceChunk::new(self.geometry, region, self.capacity);
        // A new chunk has room for at least one instance (capacity >= 1).
        let slot = chunk.try_insert(key, record).unwrap_or_default();
        let id = self.arena.insert(chunk);
        list.push(id);
        self.chunk_counter += 1;
        log::debug!(
            target: "chunks",
            "allocated {} chunk {}:{} in region {} ({} in region)",
            self.geometry.name(),
            id.index,
            id.generation,
            region,
            list.len()
        );
        ChunkPlacement {
            handle: ChunkHandle {
                geometry: self.geometry,
                region,
                id,
            },
            slot,
            created: true,
        }
    }

    /// Frees `key` from the chunk behind `handle`. Empty chunks are released
    /// and empty regions are dropped from the map.
    pub fn release(&mut self, handle: ChunkHandle, key: TileKey) -> Option<ChunkRelease> {
        let chunk = self.arena.get_mut(handle.id)?;
        let removal = chunk.remove(key)?;
        let chunk_dropped = chunk.is_empty();
        if chunk_dropped {
            self.arena.remove(handle.id);
            if let Some(list) = self.regions.get_mut(&handle.region) {
                list.retain(|&id| id != handle.id);
                if list.is_empty() {
                    self.regions.remove(&handle.region);
                }
            }
            self.chunk_counter = self.chunk_counter.saturating_sub(1);
            log::debug!(
                target: "chunks",
                "released empty {} chunk {}:{} in region {}",
                self.geometry.name(),
                handle.id.index,
                handle.id.generation,
                handle.region
            );
        }
        Some(ChunkRelease {
            removal,
            chunk_dropped,
        })
    }

    /// Overwrites the record held for `key` without moving it.
    pub fn update(&mut self, handle: ChunkHandle, key: TileKey, record: TileRecord) -> Option<u32> {
        self.arena.get_mut(handle.id)?.update_record(key, record)
    }

    pub fn chunk(&self, handle: ChunkHandle) -> Option<&InstanceChunk> {
        if handle.geometry != self.geometry {
            return None;
        }
        self.arena.get(handle.id)
    }

    pub fn chunks_in(&self, region: RegionId) -> impl Iterator<Item = (ChunkHandle, &InstanceChunk)> {
        let geometry = self.geometry;
        self.regions
            .get(&region)
            .into_iter()
            .flat_map(|list| list.iter())
            .filter_map(move |&id| {
                self.arena
                    .get(id)
                    .map(|c| (ChunkHandle { geometry, region, id }, c))
            })
    }

    pub fn regions(&self) -> impl Iterator<Item = RegionId> + '_ {
        self.regions.keys().copied()
    }

    #[inline]
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Chunks per region as recorded in the region lists.
    pub fn region_lists(&self) -> impl Iterator<Item = (RegionId, usize)> + '_ {
        self.regions.iter().map(|(r, l)| (*r, l.len()))
    }

    /// Sum of region list lengths.
    pub fn listed_chunks(&self) -> usize {
        self.regions.values().map(Vec::len).sum()
    }

    /// Flat bookkeeping counter.
    #[inline]
    pub fn chunk_counter(&self) -> usize {
        self.chunk_counter
    }

    /// Chunks actually alive in the arena.
    #[inline]
    pub fn live_chunks(&self) -> usize {
        self.arena.len()
    }

    pub fn iter_chunks(&self) -> impl Iterator<Item = (ChunkHandle, &InstanceChunk)> {
        let geometry = self.geometry;
        self.arena.iter().map(move |(id, c)| {
            (
                ChunkHandle {
                    geometry,
                    region: c.region(),
                    id,
                },
                c,
            )
        })
    }

    pub fn instance_count(&self) -> usize {
        self.arena.iter().map(|(_, c)| c.occupied()).sum()
    }

    pub fn clear(&mut self) {
        self.arena.clear();
        self.regions.clear();
        self.chunk_counter = 0;
    }

    #[cfg(any(test, feature = "fault-injection"))]
    pub(crate) fn chunk_mut(&mut self, handle: ChunkHandle) -> Option<&mut InstanceChunk> {
        self.arena.get_mut(handle.id)
    }

    #[cfg(any(test, feature = "fault-injection"))]
    pub(crate) fn debug_skew_counter(&mut self, delta: isize) {
        self.chunk_counter = self.chunk_counter.saturating_add_signed(delta);
    }
}

/// One registry per geometry type, indexed by [`GeometryType::index`].
#[derive(Debug, Clone)]
pub struct RegistryTable {
    registries: [ChunkRegistry; GeometryType::COUNT],
}

impl RegistryTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            registries: GeometryType::ALL.map(|g| ChunkRegistry::new(g, capacity)),
        }
    }

    #[inline]
    pub fn get(&self, geometry: GeometryType) -> &ChunkRegistry {
        &self.registries[geometry.index()]
    }

    #[inline]
    pub fn get_mut(&mut self, geometry: GeometryType) -> &mut ChunkRegistry {
        &mut self.registries[geometry.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkRegistry> {
        self.registries.iter()
    }

    pub fn chunk(&self, handle: ChunkHandle) -> Option<&InstanceChunk> {
        self.get(handle.geometry).chunk(handle)
    }

    pub fn total_chunks(&self) -> usize {
        self.registries.iter().map(ChunkRegistry::live_chunks).sum()
    }

    pub fn clear(&mut self) {
        for r in &mut self.registries {
            r.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_geom::QuantizedPos;
    use tessel_tiles::{MeshMode, Orientation, TileFlags};

    fn record(i: i64) -> TileRecord {
        TileRecord {
            position: QuantizedPos::new(i, 0, 0),
            mesh_mode: MeshMode::Box,
            orientation: Orientation::Floor,
            transform: None,
            flags: TileFlags::NONE,
        }
    }

    #[test]
    fn zero_capacity_still_stores_every_tile() {
        let mut reg = ChunkRegistry::new(GeometryType::Box, 0);
        let r = RegionId::new(0, 0, 0);
        for i in 1..=2 {
            let p = reg.place(r, TileKey(i), record(i as i64));
            let chunk = reg.chunk(p.handle).unwrap();
            assert_eq!(chunk.slot_of(TileKey(i)), Some(p.slot));
            assert_eq!(chunk.occupied(), 1);
        }
        assert_eq!(reg.live_chunks(), 2);
    }

    #[test]
    fn overflow_allocates_second_chunk_in_same_region() {
        let mut reg = ChunkRegistry::new(GeometryType::Box, 2);
        let r = RegionId::new(0, 0, 0);
        let a = reg.place(r, TileKey(1), record(1));
        let b = reg.place(r, TileKey(2), record(2));
        let c = reg.place(r, TileKey(3), record(3));
        assert!(a.created && !b.created && c.created);
        assert_eq!(a.handle, b.handle);
        assert_ne!(a.handle, c.handle);
        assert_eq!(reg.listed_chunks(), 2);
        assert_eq!(reg.chunk_counter(), 2);
        assert_eq!(reg.chunks_in(r).count(), 2);
    }

    #[test]
    fn freed_slot_in_earlier_chunk_is_reused() {
        let mut reg = ChunkRegistry::new(GeometryType::Box, 2);
        let r = RegionId::new(0, 0, 0);
        let a = reg.place(r, TileKey(1), record(1));
        reg.place(r, TileKey(2), record(2));
        reg.place(r, TileKey(3), record(3));
        let rel = reg.release(a.handle, TileKey(1)).unwrap();
        assert!(!rel.chunk_dropped);
        let d = reg.place(r, TileKey(4), record(4));
        assert_eq!(d.handle, a.handle);
        assert_eq!(reg.live_chunks(), 2);
    }

    #[test]
    fn empty_chunk_and_region_are_dropped() {
        let mut reg = ChunkRegistry::new(GeometryType::Box, 4);
        let r = RegionId::new(1, 0, -1);
        let p = reg.place(r, TileKey(7), record(7));
        let rel = reg.release(p.handle, TileKey(7)).unwrap();
        assert!(rel.chunk_dropped);
        assert_eq!(reg.region_count(), 0);
        assert_eq!(reg.chunk_counter(), 0);
        assert_eq!(reg.live_chunks(), 0);
        assert!(reg.release(p.handle, TileKey(7)).is_none());
    }
}
