//! Minecraft region file storage (.mcr / .mca).
//!
//! Region files contain 32x32 chunks in a specific binary format:
//! - Bytes 0-4095: Location table (1024 entries × 4 bytes)
//! - Bytes 4096-8191: Timestamp table (1024 entries × 4 bytes)
//! - Bytes 8192+: Chunk records, aligned to 4096-byte sectors

pub mod codec;
pub mod error;
pub mod header;
pub mod nbt;
pub mod region;

pub use error::{RegionError, Result};
pub use header::{HeaderTable, Location};
pub use region::RegionFile;

pub const SECTOR_BYTES: u64 = 4096; // minecraft uses 4096 bytes per sector
pub const HEADER_BYTES: u64 = 8192; // header is 8192 bytes (2 sectors 8kb)

/// First sector that may hold chunk data.
pub const FIRST_DATA_SECTOR: u32 = 2;

/// Number of chunks per region dimension.
pub const REGION_SIZE: i32 = 32;

/// Number of chunk slots in a region.
pub const REGION_CHUNKS: usize = 1024;

/// Calculate linear index for a chunk within a region (0-1023).
/// Formula: x + z * 32
#[inline]
pub fn local_to_index(local_x: i32, local_z: i32) -> usize {
    ((local_x & 31) + (local_z & 31) * REGION_SIZE) as usize
}

/// Calculate local coordinates from linear index.
#[inline]
pub fn index_to_local(index: usize) -> (i32, i32) {
    let local_x = (index % REGION_SIZE as usize) as i32;
    let local_z = (index / REGION_SIZE as usize) as i32;
    (local_x, local_z)
}

/// Byte offset of a sector in the file.
#[inline]
pub fn sector_to_offset(sector: u32) -> u64 {
    sector as u64 * SECTOR_BYTES
}

/// Number of whole sectors needed to hold `bytes`.
#[inline]
pub fn sectors_for(bytes: u64) -> u64 {
    bytes.div_ceil(SECTOR_BYTES)
}

/// Region file coordinates (parsed from filename like "r.0.-1.mca").
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct RegionPos {
    pub x: i32,
    pub z: i32,
}

impl RegionPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Parse region position from filename (e.g., "r.0.-1.mca" or "r.3.2.mcr").
    pub fn from_filename(name: &str) -> Option<Self> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.len() == 4 && parts[0] == "r" && !parts[3].is_empty() {
            let x = parts[1].parse().ok()?;
            let z = parts[2].parse().ok()?;
            Some(Self { x, z })
        } else {
            None
        }
    }

    /// Like [`RegionPos::from_filename`], but takes a full path and reports
    /// a `FilenameFormat` error when the name does not follow `r.<X>.<Z>.<ext>`.
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        Self::from_filename(name).ok_or_else(|| RegionError::FilenameFormat {
            name: name.to_string(),
        })
    }

    /// Convert local chunk coordinates to world chunk coordinates.
    pub fn local_to_world(&self, local_x: i32, local_z: i32) -> (i32, i32) {
        (
            self.x * REGION_SIZE + local_x,
            self.z * REGION_SIZE + local_z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_index_round_trip() {
        for index in 0..REGION_CHUNKS {
            let (x, z) = index_to_local(index);
            assert_eq!(local_to_index(x, z), index);
        }
        assert_eq!(local_to_index(5, 7), 5 + 7 * 32);
    }

    #[test]
    fn test_sectors_for() {
        assert_eq!(sectors_for(1), 1);
        assert_eq!(sectors_for(4096), 1);
        assert_eq!(sectors_for(4097), 2);
    }

    #[test]
    fn test_region_pos_from_filename() {
        assert_eq!(RegionPos::from_filename("r.0.-1.mca"), Some(RegionPos::new(0, -1)));
        assert_eq!(RegionPos::from_filename("r.-3.12.mcr"), Some(RegionPos::new(-3, 12)));
        assert_eq!(RegionPos::from_filename("r.a.1.mca"), None);
        assert_eq!(RegionPos::from_filename("level.dat"), None);
    }

    #[test]
    fn test_region_pos_from_path() {
        let pos = RegionPos::from_path(Path::new("/world/region/r.2.-2.mca")).unwrap();
        assert_eq!(pos.local_to_world(5, 7), (69, -57));

        let err = RegionPos::from_path(Path::new("/world/region/broken.mca")).unwrap_err();
        assert!(matches!(err, RegionError::FilenameFormat { .. }));
    }
}
