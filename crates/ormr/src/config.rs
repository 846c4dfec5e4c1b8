//! World configuration.
//!
//! Plain serde structs with defaults for every field, so a config file only
//! needs to mention what it changes:
//!
//! ```ignore
//! let config = WorldConfig::from_json_str(r#"{ "spatial": { "cell_size": 64.0 } }"#)?;
//! let world = World::with_config(config)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::ecs::pool::DEFAULT_CHUNK_SIZE;
use crate::error::{EcsError, EcsResult};

/// Largest accepted chunk edge, in cells. A chunk allocates one bucket per
/// cell up front.
pub const MAX_CHUNK_CELLS: u32 = 4096;

/// Spatial grid parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpatialConfig {
    /// Edge length of one cell in world units.
    pub cell_size: f32,
    /// Edge length of one chunk, measured in cells.
    pub chunk_size_in_cells: u32,
}

impl SpatialConfig {
    pub fn new(cell_size: f32, chunk_size_in_cells: u32) -> Self {
        Self {
            cell_size,
            chunk_size_in_cells,
        }
    }

    /// Edge length of one chunk in world units.
    pub fn chunk_size(&self) -> f32 {
        self.cell_size * self.chunk_size_in_cells as f32
    }

    pub fn validate(&self) -> EcsResult<()> {
        if !self.cell_size.is_finite() || self.cell_size <= 0.0 {
            return Err(EcsError::InvalidConfig(format!(
                "spatial cell_size must be positive and finite, got {}",
                self.cell_size
            )));
        }
        if self.chunk_size_in_cells == 0 || self.chunk_size_in_cells > MAX_CHUNK_CELLS {
            return Err(EcsError::InvalidConfig(format!(
                "spatial chunk_size_in_cells must be in 1..={MAX_CHUNK_CELLS}, got {}",
                self.chunk_size_in_cells
            )));
        }
        Ok(())
    }
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self::new(200.0, 20)
    }
}

/// Top-level configuration of a [`World`](crate::ecs::World).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Entries per component pool chunk.
    pub pool_chunk_size: usize,
    pub spatial: SpatialConfig,
}

impl WorldConfig {
    pub fn from_json_str(json: &str) -> EcsResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EcsResult<()> {
        if self.pool_chunk_size == 0 {
            return Err(EcsError::InvalidConfig(
                "pool_chunk_size must be at least 1".to_string(),
            ));
        }
        self.spatial.validate()
    }
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            pool_chunk_size: DEFAULT_CHUNK_SIZE,
            spatial: SpatialConfig::default(),
        }
    }
}
