//! Tile vocabulary, store configuration, and the key/region codecs.
#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod error;
pub mod region;
pub mod types;

pub use codec::{TileKey, TileKeyCodec};
pub use config::StoreConfig;
pub use error::TileError;
pub use region::RegionIndexer;
pub use types::{
    GeometryType, MeshMode, Orientation, PlaceRequest, TileFlags, TileRecord, TransformOverride,
};
