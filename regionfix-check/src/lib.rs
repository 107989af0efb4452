//! Chunk integrity checks and backup-based repair for region files.

use std::path::PathBuf;

pub mod check;
pub mod repair;
pub mod world;

pub use check::{ChunkStatus, RegionScan, check_chunk, scan_region, scan_region_file};
pub use repair::{RepairOutcome, RepairState, delete_chunks, repair, repair_chunk};
pub use world::{SkippedRegion, WorldScan, backup_region_dirs, region_files, scan_world};

/// A chunk slot in a specific region file, in local (0-31) coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkRef {
    pub path: PathBuf,
    pub x: i32,
    pub z: i32,
}

impl ChunkRef {
    pub fn new(path: impl Into<PathBuf>, x: i32, z: i32) -> Self {
        Self {
            path: path.into(),
            x,
            z,
        }
    }
}

impl std::fmt::Display for ChunkRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.path.display(), self.x, self.z)
    }
}
