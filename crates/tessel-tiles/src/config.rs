use std::error::Error;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::codec::TileKeyCodec;
use crate::error::TileError;
use crate::region::RegionIndexer;

/// Store-wide tuning. One instance is threaded through every component so the
/// key precision and region size are never duplicated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Decimal places kept when quantizing positions into keys.
    #[serde(default = "default_key_precision")]
    pub key_precision: u8,
    /// Edge length of a region cube in world units.
    #[serde(default = "default_region_size")]
    pub region_size: f32,
    /// Instance slots per chunk.
    #[serde(default = "default_chunk_capacity")]
    pub chunk_capacity: usize,
    /// Occupancy fraction at which the report flags a chunk as nearly full.
    #[serde(default = "default_nearly_full_threshold")]
    pub nearly_full_threshold: f32,
    /// Upper bound on tiles touched by a single batch operation.
    #[serde(default = "default_max_batch_tiles")]
    pub max_batch_tiles: usize,
    /// Minimum spacing between incremental fill steps.
    #[serde(default = "default_fill_step_interval_ms")]
    pub fill_step_interval_ms: u64,
    /// Tiles placed per incremental fill step.
    #[serde(default = "default_fill_step_budget")]
    pub fill_step_budget: usize,
}

fn default_key_precision() -> u8 {
    3
}
fn default_region_size() -> f32 {
    50.0
}
fn default_chunk_capacity() -> usize {
    1000
}
fn default_nearly_full_threshold() -> f32 {
    0.95
}
fn default_max_batch_tiles() -> usize {
    10_000
}
fn default_fill_step_interval_ms() -> u64 {
    16
}
fn default_fill_step_budget() -> usize {
    500
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_precision: default_key_precision(),
            region_size: default_region_size(),
            chunk_capacity: default_chunk_capacity(),
            nearly_full_threshold: default_nearly_full_threshold(),
            max_batch_tiles: default_max_batch_tiles(),
            fill_step_interval_ms: default_fill_step_interval_ms(),
            fill_step_budget: default_fill_step_budget(),
        }
    }
}

impl StoreConfig {
    pub const MAX_KEY_PRECISION: u8 = 6;

    pub fn from_toml_str(toml_str: &str) -> Result<Self, Box<dyn Error>> {
        let cfg: StoreConfig = toml::from_str(toml_str)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn validate(&self) -> Result<(), TileError> {
        if self.key_precision > Self::MAX_KEY_PRECISION {
            return Err(TileError::InvalidConfig(format!(
                "key_precision must be <= {} (got {})",
                Self::MAX_KEY_PRECISION,
                self.key_precision
            )));
        }
        if !self.region_size.is_finite() || self.region_size <= 0.0 {
            return Err(TileError::InvalidConfig(
                "region_size must be finite and > 0".into(),
            ));
        }
        if self.region_extent() < 1 {
            return Err(TileError::InvalidConfig(
                "region_size is smaller than the key precision can express".into(),
            ));
        }
        if self.chunk_capacity == 0 {
            return Err(TileError::InvalidConfig("chunk_capacity must be >= 1".into()));
        }
        if !(self.nearly_full_threshold > 0.0 && self.nearly_full_threshold <= 1.0) {
            return Err(TileError::InvalidConfig(
                "nearly_full_threshold must be in (0, 1]".into(),
            ));
        }
        if self.max_batch_tiles == 0 {
            return Err(TileError::InvalidConfig("max_batch_tiles must be >= 1".into()));
        }
        if self.fill_step_budget == 0 {
            return Err(TileError::InvalidConfig("fill_step_budget must be >= 1".into()));
        }
        Ok(())
    }

    /// `10^key_precision`: quantized units per world unit.
    #[inline]
    pub fn quant_scale(&self) -> i64 {
        10i64.pow(u32::from(self.key_precision.min(Self::MAX_KEY_PRECISION)))
    }

    /// Region edge length in quantized units.
    #[inline]
    pub fn region_extent(&self) -> i64 {
        (f64::from(self.region_size) * self.quant_scale() as f64).round() as i64
    }

    pub fn codec(&self) -> TileKeyCodec {
        TileKeyCodec::new(self.key_precision.min(Self::MAX_KEY_PRECISION))
    }

    pub fn region_indexer(&self) -> RegionIndexer {
        RegionIndexer::new(self.region_extent().max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = StoreConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, StoreConfig::default());
        assert_eq!(cfg.quant_scale(), 1000);
        assert_eq!(cfg.region_extent(), 50_000);
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let cfg = StoreConfig::from_toml_str(
            r#"
            chunk_capacity = 64
            region_size = 16.0
        "#,
        )
        .unwrap();
        assert_eq!(cfg.chunk_capacity, 64);
        assert_eq!(cfg.region_size, 16.0);
        assert_eq!(cfg.key_precision, 3);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(StoreConfig::from_toml_str("chunk_capacity = 0").is_err());
        assert!(StoreConfig::from_toml_str("key_precision = 9").is_err());
        assert!(StoreConfig::from_toml_str("nearly_full_threshold = 1.5").is_err());
        assert!(StoreConfig::from_toml_str("region_size = -2.0").is_err());
    }
}
