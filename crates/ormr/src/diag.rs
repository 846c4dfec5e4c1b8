//! Diagnostics: per-system timings and storage statistics.
//!
//! Enabled by the `diagnostics` feature flag. [`World::update`] records how
//! long each system took, and [`World::storage_stats`] summarises how full the
//! object table, pools and spatial grid are. Both serialize to JSON, so a
//! host can ship a snapshot to whatever tool it likes:
//!
//! ```ignore
//! ormr::diag::init_logger();
//! world.update(dt);
//! let json = world.diagnostics_json()?;
//! ```

use serde::Serialize;

use crate::ecs::world::World;
use crate::error::EcsResult;

/// Time spent in one system's `update` during the latest frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemTiming {
    pub name: String,
    pub duration_us: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectPoolStats {
    pub total_slots: usize,
    pub free_count: usize,
    pub alive_count: usize,
    /// Share of slots sitting on the free list.
    pub fragmentation_pct: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedStats {
    pub system: String,
    pub tracked: usize,
}

/// Storage occupancy snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageStats {
    pub objects: ObjectPoolStats,
    pub component_kinds: Vec<String>,
    pub pool_chunks: usize,
    pub spatial_chunks: usize,
    pub spatial_entries: usize,
    pub systems: Vec<TrackedStats>,
}

#[derive(Serialize)]
struct Snapshot<'a> {
    storage: StorageStats,
    timings: &'a [SystemTiming],
    systems_us: f64,
}

impl World {
    pub fn storage_stats(&self) -> StorageStats {
        let table = self.object_table();
        let total_slots = table.total_slots();
        let free_count = table.free_count();
        let fragmentation_pct = if total_slots == 0 {
            0.0
        } else {
            free_count as f32 / total_slots as f32 * 100.0
        };
        StorageStats {
            objects: ObjectPoolStats {
                total_slots,
                free_count,
                alive_count: table.alive_count(),
                fragmentation_pct,
            },
            component_kinds: self
                .components()
                .registry()
                .iter()
                .map(|(_, info)| info.name.to_string())
                .collect(),
            pool_chunks: self.components().chunk_count(),
            spatial_chunks: self.spatial().chunk_count(),
            spatial_entries: self.spatial().len(),
            systems: self
                .tracked_lengths()
                .into_iter()
                .map(|(system, tracked)| TrackedStats {
                    system: system.to_string(),
                    tracked,
                })
                .collect(),
        }
    }

    /// Storage stats plus the latest frame's system timings, as JSON.
    pub fn diagnostics_json(&self) -> EcsResult<String> {
        let timings = self.system_timings();
        let snapshot = Snapshot {
            storage: self.storage_stats(),
            timings,
            systems_us: timings.iter().map(|t| t.duration_us).sum(),
        };
        Ok(serde_json::to_string(&snapshot)?)
    }
}

/// Initialize `env_logger` from `RUST_LOG`, defaulting to `info`. Safe to
/// call more than once.
pub fn init_logger() {
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
    if result.is_err() {
        log::debug!("a logger is already installed");
    }
}
