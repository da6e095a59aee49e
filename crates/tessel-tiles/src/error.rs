use thiserror::Error;

/// Input errors raised at the encode/decode boundary or by batch limits.
///
/// Absence of a tile is never an error; lookups return `Option`/`bool`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TileError {
    #[error("orientation value {0} is outside the declared range")]
    InvalidOrientation(u8),
    #[error("mesh mode value {0} is outside the declared range")]
    InvalidMeshMode(u8),
    #[error("malformed tile key {0:#034x}")]
    MalformedKey(u128),
    #[error("position ({x}, {y}, {z}) cannot be quantized into a tile key")]
    PositionOutOfRange { x: f32, y: f32, z: f32 },
    #[error("batch of {requested} tiles exceeds the limit of {limit}")]
    BatchTooLarge { requested: usize, limit: usize },
    #[error("grid step {0} must be finite and > 0")]
    InvalidStep(f32),
    #[error("invalid store config: {0}")]
    InvalidConfig(String),
}
