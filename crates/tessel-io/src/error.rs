use std::path::PathBuf;

use tessel_tiles::TileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("columnar data: {0}")]
    Columnar(String),
    #[error("unsupported scene format version {0}")]
    Version(u32),
    #[error(transparent)]
    Tile(#[from] TileError),
}
