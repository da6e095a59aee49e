use tessel_geom::{RegionId, Vec3};
use tessel_store::ColumnarTileStore;
use tessel_tiles::{
    GeometryType, MeshMode, Orientation, PlaceRequest, RegionIndexer, StoreConfig, TileError,
    TileFlags, TileKey, TileKeyCodec, TileRecord, TransformOverride,
};

use crate::lookup::{TileLocation, TileLookupIndex};
use crate::registry::RegistryTable;
use crate::tracker::{
    OperationId, OperationKind, OperationSummary, PlacementTracker, TrackedChange, TrackerError,
};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PlaceOutcome {
    pub key: TileKey,
    pub region: RegionId,
    /// Record previously held at `key`, if the placement replaced one.
    pub replaced: Option<TileRecord>,
}

/// Read-only view of a placed tile. Never exposes chunk slots.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TileView {
    pub key: TileKey,
    pub record: TileRecord,
    pub region: RegionId,
    pub position: Vec3,
}

impl TileView {
    #[inline]
    pub fn geometry(&self) -> GeometryType {
        self.record.geometry()
    }
}

#[derive(Default, Debug, Clone, Copy)]
pub struct WorldStats {
    pub tiles: usize,
    pub transforms: usize,
    pub lookup_entries: usize,
    pub tracked: usize,
    pub chunks_by_geometry: [usize; GeometryType::COUNT],
    pub regions_by_geometry: [usize; GeometryType::COUNT],
    pub tiles_by_mesh_mode: [usize; MeshMode::COUNT],
}

impl WorldStats {
    pub fn chunks(&self) -> usize {
        self.chunks_by_geometry.iter().sum()
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildSummary {
    pub tiles: usize,
    pub chunks: usize,
    pub regions: usize,
}

/// Owner of the canonical store and every index derived from it.
///
/// All mutation goes through `&mut self`, so the store, lookup index, chunk
/// registries and tracker are updated together or not at all.
#[derive(Debug, Clone)]
pub struct TileWorld {
    config: StoreConfig,
    codec: TileKeyCodec,
    regions: RegionIndexer,
    store: ColumnarTileStore,
    lookup: TileLookupIndex,
    registries: RegistryTable,
    tracker: PlacementTracker,
}

impl TileWorld {
    pub fn new(config: StoreConfig) -> Result<Self, TileError> {
        config.validate()?;
        Ok(Self {
            codec: config.codec(),
            regions: config.region_indexer(),
            store: ColumnarTileStore::new(),
            lookup: TileLookupIndex::new(),
            registries: RegistryTable::new(config.chunk_capacity),
            tracker: PlacementTracker::new(),
            config,
        })
    }

    /// Builds a world from saved records and derives every index from them.
    pub fn from_records(
        config: StoreConfig,
        records: impl IntoIterator<Item = TileRecord>,
    ) -> Result<Self, TileError> {
        let mut world = Self::new(config)?;
        for record in records {
            let key = world
                .codec
                .encode_quantized(record.position, record.orientation)?;
            world.store.upsert(key, record);
        }
        let summary = world.rebuild_indexes();
        log::info!(
            target: "tiles",
            "loaded {} tiles into {} chunks across {} regions",
            summary.tiles,
            summary.chunks,
            summary.regions
        );
        Ok(world)
    }

    #[inline]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[inline]
    pub fn codec(&self) -> &TileKeyCodec {
        &self.codec
    }

    #[inline]
    pub fn region_indexer(&self) -> &RegionIndexer {
        &self.regions
    }

    #[inline]
    pub fn store(&self) -> &ColumnarTileStore {
        &self.store
    }

    #[inline]
    pub fn lookup(&self) -> &TileLookupIndex {
        &self.lookup
    }

    #[inline]
    pub fn registries(&self) -> &RegistryTable {
        &self.registries
    }

    #[inline]
    pub fn tracker(&self) -> &PlacementTracker {
        &self.tracker
    }

    // ---- queries -------------------------------------------------------

    #[inline]
    pub fn count(&self) -> usize {
        self.store.count()
    }

    #[inline]
    pub fn exists(&self, key: TileKey) -> bool {
        self.store.exists(key)
    }

    pub fn get(&self, key: TileKey) -> Option<TileRecord> {
        self.store.get(key)
    }

    pub fn view(&self, key: TileKey) -> Option<TileView> {
        self.store.get(key).map(|record| self.make_view(key, record))
    }

    /// Lazy, restartable walk over every placed tile in store order.
    pub fn iter(&self) -> impl Iterator<Item = TileView> + '_ {
        self.store
            .iter()
            .map(move |(key, record)| self.make_view(key, record))
    }

    /// Tiles of one geometry inside `region`, walked through its chunk list.
    pub fn tiles_in_region(
        &self,
        geometry: GeometryType,
        region: RegionId,
    ) -> impl Iterator<Item = TileView> + '_ {
        self.registries
            .get(geometry)
            .chunks_in(region)
            .flat_map(|(_, chunk)| chunk.instances())
            .map(move |inst| self.make_view(inst.key, inst.record))
    }

    pub fn key_for(&self, position: Vec3, orientation: Orientation) -> Result<TileKey, TileError> {
        self.codec.encode(position, orientation)
    }

    pub fn region_of(&self, position: Vec3) -> Result<RegionId, TileError> {
        Ok(self.regions.region_of(self.codec.quantize(position)?))
    }

    pub fn stats(&self) -> WorldStats {
        let store = self.store.stats();
        let mut out = WorldStats {
            tiles: store.tiles,
            transforms: store.transforms,
            lookup_entries: self.lookup.count(),
            tracked: self.tracker.tracked_count(),
            tiles_by_mesh_mode: store.by_mesh_mode,
            ..WorldStats::default()
        };
        for reg in self.registries.iter() {
            let g = reg.geometry().index();
            out.chunks_by_geometry[g] = reg.live_chunks();
            out.regions_by_geometry[g] = reg.region_count();
        }
        out
    }

    fn make_view(&self, key: TileKey, record: TileRecord) -> TileView {
        TileView {
            key,
            record,
            region: self.regions.region_of(record.position),
            position: self.codec.dequantize(record.position),
        }
    }

    // ---- mutation ------------------------------------------------------

    /// Places a tile, replacing whatever is already held at its key.
    pub fn place(&mut self, request: PlaceRequest) -> Result<PlaceOutcome, TileError> {
        let (key, record) = self.prepare(&request)?;
        let replaced = self.place_keyed(key, record);
        log::trace!(target: "tiles", "placed {} at {:?} ({})", key, record.position, record.mesh_mode.name());
        Ok(PlaceOutcome {
            key,
            region: self.regions.region_of(record.position),
            replaced,
        })
    }

    /// Removes the tile at `key`. Absent keys yield `None`.
    pub fn remove(&mut self, key: TileKey) -> Option<TileRecord> {
        let Some(location) = self.lookup.resolve(key) else {
            if self.store.exists(key) {
                log::warn!(target: "tiles", "tile {} is saved but not indexed; not removed", key);
            }
            return None;
        };
        self.detach(key, location);
        let prior = self.store.take(key);
        match prior {
            Some(record) => self.tracker.record_erase(key, record),
            None => log::warn!(target: "tiles", "tile {} was indexed but not saved", key),
        }
        prior
    }

    pub fn remove_at(
        &mut self,
        position: Vec3,
        orientation: Orientation,
    ) -> Result<Option<TileRecord>, TileError> {
        let key = self.codec.encode(position, orientation)?;
        Ok(self.remove(key))
    }

    /// Re-keys a tile under a new orientation. A tile already at the
    /// destination key is replaced. Returns the new key, or `None` if `key`
    /// is not placed.
    pub fn set_orientation(
        &mut self,
        key: TileKey,
        orientation: Orientation,
    ) -> Result<Option<TileKey>, TileError> {
        let Some(record) = self.store.get(key) else {
            return Ok(None);
        };
        if record.orientation == orientation {
            return Ok(Some(key));
        }
        let new_key = self.codec.encode_quantized(record.position, orientation)?;
        self.remove(key);
        self.place_keyed(
            new_key,
            TileRecord {
                orientation,
                ..record
            },
        );
        Ok(Some(new_key))
    }

    /// Changes the mesh mode; moves the tile between registries when the
    /// geometry changes.
    pub fn set_mesh_mode(&mut self, key: TileKey, mesh_mode: MeshMode) -> bool {
        self.edit(key, |r| r.mesh_mode = mesh_mode)
    }

    pub fn set_transform(&mut self, key: TileKey, transform: Option<TransformOverride>) -> bool {
        self.edit(key, |r| r.transform = transform)
    }

    pub fn set_flags(&mut self, key: TileKey, flags: TileFlags) -> bool {
        self.edit(key, |r| r.flags = flags)
    }

    fn edit(&mut self, key: TileKey, f: impl FnOnce(&mut TileRecord)) -> bool {
        let Some(mut record) = self.store.get(key) else {
            return false;
        };
        f(&mut record);
        self.place_keyed(key, record);
        true
    }

    /// Discards the lookup index and every chunk, then replays the store
    /// through the normal placement path.
    pub fn rebuild_indexes(&mut self) -> RebuildSummary {
        self.lookup.clear();
        self.registries.clear();
        let rows: Vec<(TileKey, TileRecord)> = self.store.iter().collect();
        for (key, record) in &rows {
            self.attach(*key, *record);
        }
        self.tracker.reset(self.store.count());
        let summary = RebuildSummary {
            tiles: rows.len(),
            chunks: self.registries.total_chunks(),
            regions: self.registries.iter().map(|r| r.region_count()).sum(),
        };
        log::debug!(target: "chunks", "rebuilt indexes: {:?}", summary);
        summary
    }

    // ---- operations ----------------------------------------------------

    pub fn begin_operation(&mut self, kind: OperationKind) -> Result<OperationId, TrackerError> {
        let id = self.tracker.begin(kind)?;
        log::debug!(target: "tiles", "begin {} operation {}", kind, id.0);
        Ok(id)
    }

    pub fn commit_operation(&mut self) -> Result<OperationSummary, TrackerError> {
        let summary = self.tracker.commit()?;
        log::debug!(
            target: "tiles",
            "commit {} operation {}: {} touched, net {:+}",
            summary.kind,
            summary.id.0,
            summary.touched,
            summary.net
        );
        Ok(summary)
    }

    /// Reverts every change of the pending operation, newest first.
    pub fn abort_operation(&mut self) -> Result<OperationSummary, TrackerError> {
        let (summary, changes) = self.tracker.take_for_abort()?;
        for change in changes.into_iter().rev() {
            match change {
                TrackedChange::Placed { key, prior: None } => {
                    self.remove(key);
                }
                TrackedChange::Placed {
                    key,
                    prior: Some(prior),
                } => {
                    self.place_keyed(key, prior);
                }
                TrackedChange::Erased { key, prior } => {
                    self.place_keyed(key, prior);
                }
            }
        }
        log::info!(
            target: "tiles",
            "aborted {} operation {}: reverted {} changes",
            summary.kind,
            summary.id.0,
            summary.touched
        );
        Ok(summary)
    }

    // ---- internals -----------------------------------------------------

    pub(crate) fn prepare(&self, request: &PlaceRequest) -> Result<(TileKey, TileRecord), TileError> {
        let position = self.codec.quantize(request.position)?;
        let key = self.codec.encode_quantized(position, request.orientation)?;
        Ok((
            key,
            TileRecord {
                position,
                mesh_mode: request.mesh_mode,
                orientation: request.orientation,
                transform: request.transform,
                flags: request.flags,
            },
        ))
    }

    /// Upserts `record` under `key` in the store and all indexes.
    pub(crate) fn place_keyed(&mut self, key: TileKey, record: TileRecord) -> Option<TileRecord> {
        match self.lookup.resolve(key) {
            Some(location) if location.geometry() == record.geometry() => {
                let updated = self
                    .registries
                    .get_mut(location.geometry())
                    .update(location.chunk, key, record);
                if updated.is_none() {
                    log::warn!(target: "chunks", "tile {} missing from its chunk; re-placing", key);
                    self.lookup.remove(key);
                    self.attach(key, record);
                }
            }
            Some(location) => {
                self.detach(key, location);
                self.attach(key, record);
            }
            None => self.attach(key, record),
        }
        let prior = self.store.upsert(key, record);
        self.tracker.record_place(key, prior);
        prior
    }

    fn attach(&mut self, key: TileKey, record: TileRecord) {
        let region = self.regions.region_of(record.position);
        let placement = self
            .registries
            .get_mut(record.geometry())
            .place(region, key, record);
        self.lookup.insert(
            key,
            TileLocation {
                chunk: placement.handle,
                slot: placement.slot,
            },
        );
    }

    /// Frees the chunk slot behind `location` and re-points whichever tile
    /// compaction moved into it.
    fn detach(&mut self, key: TileKey, location: TileLocation) {
        self.lookup.remove(key);
        let released = self
            .registries
            .get_mut(location.geometry())
            .release(location.chunk, key);
        match released {
            Some(release) => {
                if let Some(moved) = release.removal.moved {
                    let relocated = self.lookup.update_location(
                        moved.key,
                        TileLocation {
                            chunk: location.chunk,
                            slot: moved.to,
                        },
                    );
                    if !relocated {
                        log::warn!(target: "chunks", "moved tile {} had no lookup entry", moved.key);
                    }
                }
            }
            None => log::warn!(target: "chunks", "tile {} missing from its chunk", key),
        }
    }
}

/// Helpers that break cross-index invariants on purpose. Each one leaves the
/// world in a state the integrity checker should flag.
#[cfg(any(test, feature = "fault-injection"))]
impl TileWorld {
    /// Drops the lookup entry for `key`, leaving store and chunk intact.
    pub fn debug_corrupt_drop_lookup(&mut self, key: TileKey) -> bool {
        self.lookup.remove(key).is_some()
    }

    /// Points the chunk's own key map for `key` at a slot past the table.
    pub fn debug_corrupt_orphan_slot(&mut self, key: TileKey) -> bool {
        let Some(location) = self.lookup.resolve(key) else {
            return false;
        };
        match self
            .registries
            .get_mut(location.geometry())
            .chunk_mut(location.chunk)
        {
            Some(chunk) => {
                let past_end = chunk.capacity() as u32 + 1;
                chunk.debug_point_key_at(key, past_end);
                true
            }
            None => false,
        }
    }

    /// Writes a record to the store only, bypassing chunks and lookup.
    pub fn debug_corrupt_store_only(&mut self, record: TileRecord) -> Result<TileKey, TileError> {
        let key = self
            .codec
            .encode_quantized(record.position, record.orientation)?;
        self.store.upsert(key, record);
        Ok(key)
    }

    /// Changes the stored mesh mode without moving the chunk instance.
    pub fn debug_corrupt_mesh_mode(&mut self, key: TileKey, mesh_mode: MeshMode) -> bool {
        let Some(record) = self.store.get(key) else {
            return false;
        };
        self.store.upsert(
            key,
            TileRecord {
                mesh_mode,
                ..record
            },
        );
        true
    }

    pub fn debug_corrupt_tracker(&mut self, delta: isize) {
        self.tracker.debug_skew(delta);
    }

    pub fn debug_corrupt_chunk_counter(&mut self, geometry: GeometryType, delta: isize) {
        self.registries.get_mut(geometry).debug_skew_counter(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> TileWorld {
        TileWorld::new(StoreConfig::default()).unwrap()
    }

    fn sq(x: f32, z: f32) -> PlaceRequest {
        PlaceRequest::new(Vec3::new(x, 0.0, z), MeshMode::Square, Orientation::Floor)
    }

    fn assert_counts_agree(w: &TileWorld) {
        let visible: usize = w
            .registries()
            .iter()
            .map(|r| r.instance_count())
            .sum();
        assert_eq!(w.store().count(), w.lookup().count());
        assert_eq!(w.store().count(), visible);
        assert_eq!(w.store().count(), w.tracker().tracked_count());
    }

    #[test]
    fn placing_at_occupied_key_replaces() {
        let mut w = world();
        let a = w.place(sq(1.0, 1.0)).unwrap();
        assert!(a.replaced.is_none());
        let mut req = sq(1.0, 1.0);
        req.flags = TileFlags::HIDDEN;
        let b = w.place(req).unwrap();
        assert_eq!(a.key, b.key);
        assert!(b.replaced.is_some());
        assert_eq!(w.count(), 1);
        assert_eq!(w.get(a.key).unwrap().flags, TileFlags::HIDDEN);
        assert_counts_agree(&w);
    }

    #[test]
    fn remove_absent_key_is_none() {
        let mut w = world();
        assert!(w.remove(TileKey(12345)).is_none());
        assert_eq!(w.count(), 0);
    }

    #[test]
    fn mesh_mode_change_moves_between_registries() {
        let mut w = world();
        let key = w.place(sq(2.0, 2.0)).unwrap().key;
        assert!(w.set_mesh_mode(key, MeshMode::PrismRepeat));
        let loc = w.lookup().resolve(key).unwrap();
        assert_eq!(loc.geometry(), GeometryType::Prism);
        assert_eq!(w.registries().get(GeometryType::Square).live_chunks(), 0);
        assert_eq!(w.registries().get(GeometryType::Prism).live_chunks(), 1);
        assert_counts_agree(&w);
    }

    #[test]
    fn repeat_flip_stays_in_place() {
        let mut w = world();
        let req = PlaceRequest::new(Vec3::ZERO, MeshMode::Box, Orientation::Floor);
        let key = w.place(req).unwrap().key;
        let before = w.lookup().resolve(key).unwrap();
        assert!(w.set_mesh_mode(key, MeshMode::BoxRepeat));
        assert_eq!(w.lookup().resolve(key).unwrap(), before);
        assert_eq!(w.get(key).unwrap().mesh_mode, MeshMode::BoxRepeat);
    }

    #[test]
    fn set_orientation_rekeys() {
        let mut w = world();
        let key = w.place(sq(3.0, 3.0)).unwrap().key;
        let new_key = w.set_orientation(key, Orientation::Ceiling).unwrap().unwrap();
        assert_ne!(key, new_key);
        assert!(!w.exists(key));
        assert_eq!(w.get(new_key).unwrap().orientation, Orientation::Ceiling);
        assert_eq!(w.count(), 1);
        assert_counts_agree(&w);
    }

    #[test]
    fn set_transform_updates_store() {
        let mut w = world();
        let key = w.place(sq(0.5, 0.5)).unwrap().key;
        let t = TransformOverride {
            spin_degrees: 90.0,
            ..TransformOverride::default()
        };
        assert!(w.set_transform(key, Some(t)));
        assert_eq!(w.store().transform_count(), 1);
        assert!(w.set_transform(key, None));
        assert_eq!(w.store().transform_count(), 0);
        assert!(!w.set_transform(TileKey(1), None));
    }

    #[test]
    fn abort_reverts_pending_operation() {
        let mut w = world();
        let kept = w.place(sq(0.0, 0.0)).unwrap().key;
        w.begin_operation(OperationKind::Paint).unwrap();
        w.place(sq(1.0, 0.0)).unwrap();
        w.place(sq(2.0, 0.0)).unwrap();
        w.remove(kept);
        assert_eq!(w.tracker().pending_count(), 3);
        let summary = w.abort_operation().unwrap();
        assert_eq!(summary.touched, 3);
        assert_eq!(w.count(), 1);
        assert!(w.exists(kept));
        assert_eq!(w.tracker().pending_count(), 0);
        assert_counts_agree(&w);
    }

    #[test]
    fn rebuild_restores_dropped_lookup() {
        let mut w = world();
        let key = w.place(sq(4.0, 4.0)).unwrap().key;
        w.place(sq(5.0, 4.0)).unwrap();
        assert!(w.debug_corrupt_drop_lookup(key));
        assert_eq!(w.lookup().count(), 1);
        let summary = w.rebuild_indexes();
        assert_eq!(summary.tiles, 2);
        assert_eq!(summary.chunks, 1);
        assert!(w.lookup().resolve(key).is_some());
        assert_counts_agree(&w);
    }

    #[test]
    fn views_hide_slots_and_carry_region() {
        let mut w = world();
        w.place(sq(60.0, 0.0)).unwrap();
        let views: Vec<TileView> = w.iter().collect();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].region, RegionId::new(1, 0, 0));
        assert_eq!(
            w.tiles_in_region(GeometryType::Square, RegionId::new(1, 0, 0)).count(),
            1
        );
        assert_eq!(
            w.tiles_in_region(GeometryType::Square, RegionId::new(0, 0, 0)).count(),
            0
        );
    }
}
