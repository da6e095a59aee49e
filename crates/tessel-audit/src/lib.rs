//! Read-only integrity auditing of a tile world.
#![forbid(unsafe_code)]

mod report;

use std::collections::BTreeMap;
use std::fmt;

use tessel_geom::RegionId;
use tessel_runtime::TileWorld;
use tessel_tiles::{GeometryType, MeshMode, StoreConfig, TransformOverride};

/// Fixed per-tile column costs in bytes: position, packed state, transform index.
pub const POSITION_BYTES: usize = 12;
pub const STATE_BYTES: usize = 4;
pub const TRANSFORM_INDEX_BYTES: usize = 4;

/// The four tallies that must agree. Only `tracked` may lag while an
/// operation is pending.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCounts {
    pub saved: usize,
    pub lookup: usize,
    pub visible: usize,
    pub tracked: usize,
    /// Tiles touched by an operation still in flight.
    pub pending: usize,
}

impl TileCounts {
    /// Store, lookup index and chunks hold the same number of tiles.
    pub fn storage_agrees(&self) -> bool {
        self.saved == self.lookup && self.saved == self.visible
    }

    pub fn agree(&self) -> bool {
        self.storage_agrees() && self.saved == self.tracked
    }
}

/// Mesh-mode distribution of one geometry, from the store and from its chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryBreakdown {
    pub geometry: GeometryType,
    pub saved_by_mode: Vec<(MeshMode, usize)>,
    pub chunked_by_mode: Vec<(MeshMode, usize)>,
}

impl GeometryBreakdown {
    pub fn saved_total(&self) -> usize {
        self.saved_by_mode.iter().map(|(_, n)| n).sum()
    }

    pub fn chunked_total(&self) -> usize {
        self.chunked_by_mode.iter().map(|(_, n)| n).sum()
    }

    pub fn consistent(&self) -> bool {
        self.saved_by_mode == self.chunked_by_mode
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionOccupancy {
    pub geometry: GeometryType,
    pub region: RegionId,
    pub chunks: usize,
    pub tiles: usize,
    /// Percent of capacity, averaged over the region's chunks.
    pub average_pct: f32,
    pub peak_pct: f32,
    pub nearly_full: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryTally {
    pub geometry: GeometryType,
    /// Sum of region list lengths.
    pub listed: usize,
    /// Flat bookkeeping counter.
    pub counter: usize,
    /// Chunks alive in the arena.
    pub live: usize,
    pub regions: usize,
}

impl RegistryTally {
    pub fn consistent(&self) -> bool {
        self.listed == self.counter && self.listed == self.live
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StorageEstimate {
    pub tiles: usize,
    pub transforms: usize,
    pub total_bytes: usize,
    pub bytes_per_tile: f32,
}

impl StorageEstimate {
    pub fn new(tiles: usize, transforms: usize) -> Self {
        let total_bytes = tiles * (POSITION_BYTES + STATE_BYTES + TRANSFORM_INDEX_BYTES)
            + transforms * TransformOverride::BYTES;
        let bytes_per_tile = if tiles == 0 {
            0.0
        } else {
            total_bytes as f32 / tiles as f32
        };
        Self {
            tiles,
            transforms,
            total_bytes,
            bytes_per_tile,
        }
    }
}

/// A divergence between indexes. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    CountMismatch { counts: TileCounts },
    OperationPending { touched: usize },
    MeshModeMismatch { geometry: GeometryType, saved: usize, chunked: usize },
    OrphanedReferences { count: usize },
    UnindexedInstances { count: usize },
    SavedWithoutLookup { count: usize },
    LookupWithoutSave { count: usize },
    MisfiledInstances { geometry: GeometryType, count: usize },
    RegistryMismatch(RegistryTally),
    OverCapacity { geometry: GeometryType, chunks: usize },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityIssue::CountMismatch { counts } => write!(
                f,
                "count mismatch: saved {} / lookup {} / visible {} / tracked {}",
                counts.saved, counts.lookup, counts.visible, counts.tracked
            ),
            IntegrityIssue::OperationPending { touched } => write!(
                f,
                "an operation is still pending ({} tiles touched); tracked count not settled",
                touched
            ),
            IntegrityIssue::MeshModeMismatch {
                geometry,
                saved,
                chunked,
            } => write!(
                f,
                "{} mesh-mode distribution differs: {} saved vs {} in chunks",
                geometry.name(),
                saved,
                chunked
            ),
            IntegrityIssue::OrphanedReferences { count } => write!(
                f,
                "{} orphaned references (slot past occupancy or occupant key differs)",
                count
            ),
            IntegrityIssue::UnindexedInstances { count } => {
                write!(f, "{} chunk instances missing from their chunk's key map", count)
            }
            IntegrityIssue::SavedWithoutLookup { count } => {
                write!(f, "{} saved tiles have no lookup entry", count)
            }
            IntegrityIssue::LookupWithoutSave { count } => {
                write!(f, "{} lookup entries have no saved tile", count)
            }
            IntegrityIssue::MisfiledInstances { geometry, count } => write!(
                f,
                "{} instances in {} chunks belong to another geometry",
                count,
                geometry.name()
            ),
            IntegrityIssue::RegistryMismatch(t) => write!(
                f,
                "{} registry: region lists hold {} chunks, counter says {}, arena holds {}",
                t.geometry.name(),
                t.listed,
                t.counter,
                t.live
            ),
            IntegrityIssue::OverCapacity { geometry, chunks } => write!(
                f,
                "{} {} chunks exceed their capacity",
                chunks,
                geometry.name()
            ),
        }
    }
}

/// Point-in-time result of [`IntegrityChecker::check`].
#[derive(Debug, Clone)]
pub struct IntegrityReport {
    pub counts: TileCounts,
    pub geometries: Vec<GeometryBreakdown>,
    pub registries: Vec<RegistryTally>,
    pub regions: Vec<RegionOccupancy>,
    pub orphaned: usize,
    pub storage: StorageEstimate,
    pub nearly_full_threshold: f32,
    pub issues: Vec<IntegrityIssue>,
    /// Free-form context from the caller, such as how the scene was loaded.
    pub notes: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn nearly_full_regions(&self) -> impl Iterator<Item = &RegionOccupancy> {
        self.regions.iter().filter(|r| r.nearly_full)
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}

/// Recomputes every tally independently and compares them. Holds only a
/// shared borrow, so it cannot observe a half-applied mutation.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityChecker {
    nearly_full_threshold: f32,
}

impl Default for IntegrityChecker {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

impl IntegrityChecker {
    pub fn from_config(config: &StoreConfig) -> Self {
        Self {
            nearly_full_threshold: config.nearly_full_threshold,
        }
    }

    pub fn with_threshold(nearly_full_threshold: f32) -> Self {
        Self {
            nearly_full_threshold,
        }
    }

    pub fn generate_report(&self, world: &TileWorld) -> String {
        self.check(world).render()
    }

    pub fn check(&self, world: &TileWorld) -> IntegrityReport {
        let mut issues = Vec::new();

        // (a) totals
        let counts = TileCounts {
            saved: world.store().count(),
            lookup: world.lookup().count(),
            visible: world
                .registries()
                .iter()
                .flat_map(|r| r.iter_chunks())
                .map(|(_, c)| c.visible_instances())
                .sum(),
            tracked: world.tracker().tracked_count(),
            pending: world.tracker().pending_count(),
        };
        let settled = world.tracker().is_settled();
        if !settled {
            issues.push(IntegrityIssue::OperationPending {
                touched: counts.pending,
            });
        }
        if !counts.storage_agrees() || (settled && !counts.agree()) {
            issues.push(IntegrityIssue::CountMismatch { counts });
        }

        // (b) mesh-mode distribution, repeat variants folded into their base geometry
        let saved_modes = world.store().count_by_mesh_mode();
        let mut chunk_modes = [0usize; MeshMode::COUNT];
        let mut geometries = Vec::with_capacity(GeometryType::COUNT);
        for reg in world.registries().iter() {
            let geometry = reg.geometry();
            let mut misfiled = 0;
            let mut over = 0;
            for (_, chunk) in reg.iter_chunks() {
                if chunk.audit().over_capacity {
                    over += 1;
                }
                for inst in chunk.instances() {
                    chunk_modes[inst.record.mesh_mode.index()] += 1;
                    if inst.record.geometry() != geometry {
                        misfiled += 1;
                    }
                }
            }
            if misfiled > 0 {
                issues.push(IntegrityIssue::MisfiledInstances {
                    geometry,
                    count: misfiled,
                });
            }
            if over > 0 {
                issues.push(IntegrityIssue::OverCapacity {
                    geometry,
                    chunks: over,
                });
            }
        }
        for geometry in GeometryType::ALL {
            let modes = geometry.mesh_modes();
            let breakdown = GeometryBreakdown {
                geometry,
                saved_by_mode: modes.iter().map(|m| (*m, saved_modes[m.index()])).collect(),
                chunked_by_mode: modes.iter().map(|m| (*m, chunk_modes[m.index()])).collect(),
            };
            if !breakdown.consistent() {
                issues.push(IntegrityIssue::MeshModeMismatch {
                    geometry,
                    saved: breakdown.saved_total(),
                    chunked: breakdown.chunked_total(),
                });
            }
            geometries.push(breakdown);
        }

        // (c) orphaned references, from each chunk's own key map and from the lookup index
        let mut orphaned = 0;
        let mut unindexed = 0;
        for reg in world.registries().iter() {
            for (_, chunk) in reg.iter_chunks() {
                let audit = chunk.audit();
                orphaned += audit.orphaned();
                unindexed += audit.unindexed;
            }
        }
        let mut lookup_without_save = 0;
        for (key, loc) in world.lookup().iter() {
            let resolves = world
                .registries()
                .chunk(loc.chunk)
                .and_then(|c| c.instance(loc.slot))
                .is_some_and(|inst| inst.key == key);
            if !resolves {
                orphaned += 1;
            }
            if !world.store().exists(key) {
                lookup_without_save += 1;
            }
        }
        let saved_without_lookup = world
            .store()
            .keys()
            .filter(|k| world.lookup().resolve(*k).is_none())
            .count();
        if orphaned > 0 {
            issues.push(IntegrityIssue::OrphanedReferences { count: orphaned });
        }
        if unindexed > 0 {
            issues.push(IntegrityIssue::UnindexedInstances { count: unindexed });
        }
        if saved_without_lookup > 0 {
            issues.push(IntegrityIssue::SavedWithoutLookup {
                count: saved_without_lookup,
            });
        }
        if lookup_without_save > 0 {
            issues.push(IntegrityIssue::LookupWithoutSave {
                count: lookup_without_save,
            });
        }

        // (d) registry lists vs flat counter vs arena
        let mut registries = Vec::with_capacity(GeometryType::COUNT);
        for reg in world.registries().iter() {
            let tally = RegistryTally {
                geometry: reg.geometry(),
                listed: reg.listed_chunks(),
                counter: reg.chunk_counter(),
                live: reg.live_chunks(),
                regions: reg.region_count(),
            };
            if !tally.consistent() {
                issues.push(IntegrityIssue::RegistryMismatch(tally));
            }
            registries.push(tally);
        }

        let regions = self.region_occupancy(world);
        let stats = world.store().stats();
        let storage = StorageEstimate::new(stats.tiles, stats.transforms);

        for issue in &issues {
            log::warn!(target: "audit", "{}", issue);
        }
        log::info!(
            target: "audit",
            "checked {} tiles: {} issues",
            counts.saved,
            issues.len()
        );

        IntegrityReport {
            counts,
            geometries,
            registries,
            regions,
            orphaned,
            storage,
            nearly_full_threshold: self.nearly_full_threshold,
            issues,
            notes: Vec::new(),
        }
    }

    fn region_occupancy(&self, world: &TileWorld) -> Vec<RegionOccupancy> {
        let mut out = Vec::new();
        for reg in world.registries().iter() {
            let mut by_region: BTreeMap<RegionId, Vec<f32>> = BTreeMap::new();
            let mut tiles: BTreeMap<RegionId, usize> = BTreeMap::new();
            for region in reg.regions() {
                for (_, chunk) in reg.chunks_in(region) {
                    by_region.entry(region).or_default().push(chunk.occupancy());
                    *tiles.entry(region).or_default() += chunk.occupied();
                }
            }
            for (region, fractions) in by_region {
                let peak = fractions.iter().copied().fold(0.0f32, f32::max);
                let average = fractions.iter().sum::<f32>() / fractions.len() as f32;
                out.push(RegionOccupancy {
                    geometry: reg.geometry(),
                    region,
                    chunks: fractions.len(),
                    tiles: tiles.get(&region).copied().unwrap_or(0),
                    average_pct: average * 100.0,
                    peak_pct: peak * 100.0,
                    nearly_full: peak >= self.nearly_full_threshold,
                });
            }
        }
        out
    }
}
