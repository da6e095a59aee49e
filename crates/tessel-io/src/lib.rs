//! Scene persistence: legacy and columnar layouts, load/save and migration.
#![forbid(unsafe_code)]

mod error;
mod format;

use std::fmt;
use std::path::Path;

use tessel_store::ColumnarTileStore;
use tessel_tiles::{TileKeyCodec, TileRecord};

pub use error::SceneError;
pub use format::{ColumnarData, FORMAT_VERSION, LegacyTile, SceneFile};

/// Which layout a load was served from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadSource {
    Empty,
    Columnar,
    MigratedFromLegacy { count: usize },
    /// Both layouts carried data. The columnar rows were used and the legacy
    /// list ignored; saving completes the migration.
    PartialMigration { legacy: usize, columnar: usize },
}

impl LoadSource {
    /// Whether saving would change the on-disk layout.
    pub fn needs_save(&self) -> bool {
        matches!(
            self,
            LoadSource::MigratedFromLegacy { .. } | LoadSource::PartialMigration { .. }
        )
    }
}

impl fmt::Display for LoadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadSource::Empty => f.write_str("empty scene"),
            LoadSource::Columnar => f.write_str("columnar"),
            LoadSource::MigratedFromLegacy { count } => {
                write!(f, "migrated {} tiles from legacy list", count)
            }
            LoadSource::PartialMigration { legacy, columnar } => write!(
                f,
                "partial migration: {} legacy and {} columnar tiles present, columnar used",
                legacy, columnar
            ),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SceneLoad {
    pub records: Vec<TileRecord>,
    pub source: LoadSource,
}

pub fn parse_scene(s: &str) -> Result<SceneFile, SceneError> {
    let scene: SceneFile = toml::from_str(s)?;
    if scene.format_version > FORMAT_VERSION {
        return Err(SceneError::Version(scene.format_version));
    }
    Ok(scene)
}

/// Resolves a parsed scene into records, migrating legacy data when it is
/// the only layout present.
pub fn resolve_scene(scene: &SceneFile, codec: &TileKeyCodec) -> Result<SceneLoad, SceneError> {
    let legacy = scene.legacy.len();
    let columnar = scene.columnar.len();
    match (legacy, columnar) {
        (0, 0) => Ok(SceneLoad {
            records: Vec::new(),
            source: LoadSource::Empty,
        }),
        (0, _) => Ok(SceneLoad {
            records: scene.columnar.to_records(codec)?,
            source: LoadSource::Columnar,
        }),
        (count, 0) => {
            let records = scene
                .legacy
                .iter()
                .map(|t| t.to_record(codec))
                .collect::<Result<Vec<_>, _>>()?;
            log::info!(target: "io", "migrating {} legacy tiles to columnar", count);
            Ok(SceneLoad {
                records,
                source: LoadSource::MigratedFromLegacy { count },
            })
        }
        (legacy, columnar) => {
            log::warn!(
                target: "io",
                "scene holds both {} legacy and {} columnar tiles; loading columnar",
                legacy,
                columnar
            );
            Ok(SceneLoad {
                records: scene.columnar.to_records(codec)?,
                source: LoadSource::PartialMigration { legacy, columnar },
            })
        }
    }
}

pub fn load_scene_str(s: &str, codec: &TileKeyCodec) -> Result<SceneLoad, SceneError> {
    resolve_scene(&parse_scene(s)?, codec)
}

pub fn load_scene(path: impl AsRef<Path>, codec: &TileKeyCodec) -> Result<SceneLoad, SceneError> {
    let path = path.as_ref();
    let s = std::fs::read_to_string(path).map_err(|source| SceneError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let load = load_scene_str(&s, codec)?;
    log::debug!(target: "io", "loaded {} ({}, {} tiles)", path.display(), load.source, load.records.len());
    Ok(load)
}

/// Serializes the store in the columnar layout only.
pub fn scene_to_string(store: &ColumnarTileStore, codec: &TileKeyCodec) -> Result<String, SceneError> {
    let scene = SceneFile {
        format_version: FORMAT_VERSION,
        legacy: Vec::new(),
        columnar: ColumnarData::from_store(store, codec),
    };
    Ok(toml::to_string(&scene)?)
}

pub fn save_scene(
    path: impl AsRef<Path>,
    store: &ColumnarTileStore,
    codec: &TileKeyCodec,
) -> Result<(), SceneError> {
    let path = path.as_ref();
    let s = scene_to_string(store, codec)?;
    std::fs::write(path, s).map_err(|source| SceneError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    log::info!(target: "io", "saved {} tiles to {}", store.count(), path.display());
    Ok(())
}

/// Writes a version 1 scene holding only the legacy list.
pub fn legacy_scene_to_string(
    records: &[TileRecord],
    codec: &TileKeyCodec,
) -> Result<String, SceneError> {
    let scene = SceneFile {
        format_version: 1,
        legacy: records
            .iter()
            .map(|r| LegacyTile::from_record(r, codec))
            .collect(),
        columnar: ColumnarData::default(),
    };
    Ok(toml::to_string(&scene)?)
}
