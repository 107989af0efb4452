//! Per-chunk and per-region integrity classification.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use regionfix_anvil::{REGION_SIZE, RegionError, RegionFile, RegionPos, nbt};

use crate::ChunkRef;

/// What a single chunk slot holds.
#[derive(Debug)]
pub enum ChunkStatus {
    /// Nothing stored in the slot.
    Empty,
    /// Readable, and its own coordinates match the slot. Carries the
    /// decompressed payload.
    Healthy(Vec<u8>),
    /// Unreadable: bad location, bad record or undecodable NBT.
    Corrupt(RegionError),
    /// Readable, but the payload claims to be a different chunk.
    Misplaced {
        expected: (i32, i32),
        found: (i32, i32),
    },
}

/// Classify one chunk slot.
///
/// `region_pos` is the region's position from its file name; without it the
/// coordinate comparison is skipped and a readable chunk counts as healthy.
/// Only device-level I/O errors are returned as `Err`.
pub fn check_chunk(
    region: &mut RegionFile,
    region_pos: Option<RegionPos>,
    x: i32,
    z: i32,
) -> regionfix_anvil::Result<ChunkStatus> {
    let payload = match region.read_chunk(x, z) {
        Ok(Some(payload)) => payload,
        Ok(None) => return Ok(ChunkStatus::Empty),
        Err(e) if e.is_corruption() => return Ok(ChunkStatus::Corrupt(e)),
        Err(e) => return Err(e),
    };

    let found = match nbt::chunk_coords(&payload) {
        Ok(coords) => coords,
        Err(e) => return Ok(ChunkStatus::Corrupt(e)),
    };

    match region_pos {
        Some(pos) if pos.local_to_world(x, z) != found => Ok(ChunkStatus::Misplaced {
            expected: pos.local_to_world(x, z),
            found,
        }),
        _ => Ok(ChunkStatus::Healthy(payload)),
    }
}

/// Result of checking every slot of one region file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionScan {
    pub corrupt: Vec<ChunkRef>,
    pub misplaced: Vec<ChunkRef>,
    /// Non-empty slots, including corrupt and misplaced ones.
    pub total: usize,
    /// Set when the scan stopped early on request.
    pub interrupted: bool,
}

/// Check all 1024 slots of an open region.
///
/// `interrupt` is polled before each chunk; once set the scan returns what it
/// has so far.
pub fn scan_region(
    region: &mut RegionFile,
    interrupt: &AtomicBool,
) -> regionfix_anvil::Result<RegionScan> {
    let region_pos = match region.region_pos() {
        Ok(pos) => Some(pos),
        Err(e) => {
            log::warn!(
                "{}: {}; skipping wrong-location checks",
                region.path().display(),
                e
            );
            None
        }
    };

    let path = region.path().to_path_buf();
    let mut scan = RegionScan::default();

    for z in 0..REGION_SIZE {
        for x in 0..REGION_SIZE {
            if interrupt.load(Ordering::Relaxed) {
                scan.interrupted = true;
                return Ok(scan);
            }

            match check_chunk(region, region_pos, x, z)? {
                ChunkStatus::Empty => continue,
                ChunkStatus::Healthy(_) => {}
                ChunkStatus::Corrupt(e) => {
                    log::debug!("{}: chunk ({}, {}) is corrupted: {}", path.display(), x, z, e);
                    scan.corrupt.push(ChunkRef::new(&path, x, z));
                }
                ChunkStatus::Misplaced { expected, found } => {
                    log::debug!(
                        "{}: chunk ({}, {}) is wrong located: expected {:?}, found {:?}",
                        path.display(),
                        x,
                        z,
                        expected,
                        found
                    );
                    scan.misplaced.push(ChunkRef::new(&path, x, z));
                }
            }
            scan.total += 1;
        }
    }

    Ok(scan)
}

/// Open a region read-only and scan it. The file is closed before returning.
pub fn scan_region_file(path: &Path, interrupt: &AtomicBool) -> regionfix_anvil::Result<RegionScan> {
    let mut region = RegionFile::open_read_only(path)?;
    scan_region(&mut region, interrupt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use tempfile::TempDir;

    #[derive(Serialize)]
    struct Chunk {
        #[serde(rename = "Level")]
        level: Level,
    }

    #[derive(Serialize)]
    struct Level {
        #[serde(rename = "xPos")]
        x_pos: i32,
        #[serde(rename = "zPos")]
        z_pos: i32,
    }

    fn payload(x_pos: i32, z_pos: i32) -> Vec<u8> {
        fastnbt::to_bytes(&Chunk {
            level: Level { x_pos, z_pos },
        })
        .unwrap()
    }

    #[test]
    fn test_check_chunk_statuses() {
        let dir = TempDir::new().unwrap();
        let mut region = RegionFile::create(dir.path().join("r.1.-1.mca")).unwrap();
        let pos = region.region_pos().ok();

        region.write_chunk(0, 0, &payload(32, -32)).unwrap();
        region.write_chunk(1, 0, &payload(0, 0)).unwrap();
        region.write_chunk(2, 0, b"not nbt at all").unwrap();

        assert!(matches!(check_chunk(&mut region, pos, 0, 0).unwrap(), ChunkStatus::Healthy(_)));
        assert!(matches!(
            check_chunk(&mut region, pos, 1, 0).unwrap(),
            ChunkStatus::Misplaced {
                expected: (33, -32),
                found: (0, 0)
            }
        ));
        assert!(matches!(
            check_chunk(&mut region, pos, 2, 0).unwrap(),
            ChunkStatus::Corrupt(RegionError::ChunkData { .. })
        ));
        assert!(matches!(check_chunk(&mut region, pos, 3, 0).unwrap(), ChunkStatus::Empty));
    }

    #[test]
    fn test_bad_filename_skips_location_check() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup-region.mca");
        let mut region = RegionFile::create(&path).unwrap();
        region.write_chunk(4, 4, &payload(1000, 1000)).unwrap();
        region.write_chunk(5, 5, b"garbage").unwrap();

        let scan = scan_region(&mut region, &AtomicBool::new(false)).unwrap();
        assert_eq!(scan.total, 2);
        assert!(scan.misplaced.is_empty());
        assert_eq!(scan.corrupt, vec![ChunkRef::new(&path, 5, 5)]);
    }

    #[test]
    fn test_every_slot_classified_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("r.0.0.mca");
        let mut region = RegionFile::create(&path).unwrap();
        for i in 0..40 {
            let (x, z) = (i % 32, i / 32);
            let data = match i % 4 {
                0 => payload(x, z),
                1 => payload(x + 1, z),
                2 => b"junk".to_vec(),
                _ => payload(x, z),
            };
            region.write_chunk(x, z, &data).unwrap();
        }

        let mut counts = [0usize; 4];
        for z in 0..REGION_SIZE {
            for x in 0..REGION_SIZE {
                let slot = match check_chunk(&mut region, Some(RegionPos::new(0, 0)), x, z).unwrap() {
                    ChunkStatus::Empty => 0,
                    ChunkStatus::Healthy(_) => 1,
                    ChunkStatus::Corrupt(_) => 2,
                    ChunkStatus::Misplaced { .. } => 3,
                };
                counts[slot] += 1;
            }
        }
        assert_eq!(counts, [1024 - 40, 20, 10, 10]);

        let scan = scan_region(&mut region, &AtomicBool::new(false)).unwrap();
        assert_eq!(scan.total, 40);
        assert_eq!(scan.corrupt.len(), 10);
        assert_eq!(scan.misplaced.len(), 10);
    }

    #[test]
    fn test_interrupted_scan_stops_early() {
        let dir = TempDir::new().unwrap();
        let mut region = RegionFile::create(dir.path().join("r.0.0.mca")).unwrap();
        region.write_chunk(0, 0, &payload(0, 0)).unwrap();

        let scan = scan_region(&mut region, &AtomicBool::new(true)).unwrap();
        assert!(scan.interrupted);
        assert_eq!(scan.total, 0);
    }
}
