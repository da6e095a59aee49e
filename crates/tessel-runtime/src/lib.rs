//! Tile world runtime: chunk arena, per-geometry registries, lookup index and placement tracking.
#![forbid(unsafe_code)]

mod arena;
mod batch;
mod lookup;
mod registry;
mod tracker;
mod world;

pub use arena::{ChunkArena, ChunkHandle, ChunkId};
pub use batch::{BatchOutcome, FillJob, FillProgress, GridCells};
pub use lookup::{TileLocation, TileLookupIndex};
pub use registry::{ChunkPlacement, ChunkRegistry, ChunkRelease, RegistryTable};
pub use tracker::{
    OperationId, OperationKind, OperationSummary, PlacementTracker, TrackedChange, TrackerError,
};
pub use world::{PlaceOutcome, RebuildSummary, TileView, TileWorld, WorldStats};

// Re-exported so callers can name chunk types without a direct dependency.
pub use tessel_chunk::{ChunkAudit, InstanceChunk};
