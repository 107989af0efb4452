//! World directory discovery and the parallel multi-region scan.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;
use regionfix_anvil::RegionPos;
use regionfix_stats::ScanMetrics;

use crate::ChunkRef;
use crate::check::{RegionScan, scan_region_file};

/// Region files of a world: `<world>/region/r.<X>.<Z>.mca` (or `.mcr`), sorted.
pub fn region_files(world: &Path) -> Result<Vec<PathBuf>> {
    let region_dir = world.join("region");
    let entries = std::fs::read_dir(&region_dir)
        .with_context(|| format!("reading {}", region_dir.display()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let is_region = (name.ends_with(".mca") || name.ends_with(".mcr"))
            && RegionPos::from_filename(name).is_some();
        if is_region && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Map backup world directories to their `region` subdirectories, keeping the
/// given order. Directories without one are reported and dropped.
pub fn backup_region_dirs(worlds: &[PathBuf]) -> Vec<PathBuf> {
    worlds
        .iter()
        .filter_map(|world| {
            let region_dir = world.join("region");
            if region_dir.is_dir() {
                Some(region_dir)
            } else {
                log::warn!(
                    "The directory {} is not a minecraft world directory",
                    world.display()
                );
                None
            }
        })
        .collect()
}

/// A region that could not be scanned at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRegion {
    pub path: PathBuf,
    pub reason: String,
}

/// Combined result of scanning many regions.
#[derive(Debug, Clone, Default)]
pub struct WorldScan {
    pub regions: Vec<(PathBuf, RegionScan)>,
    pub skipped: Vec<SkippedRegion>,
    pub interrupted: bool,
}

impl WorldScan {
    pub fn corrupt(&self) -> Vec<ChunkRef> {
        self.regions
            .iter()
            .flat_map(|(_, scan)| scan.corrupt.iter().cloned())
            .collect()
    }

    pub fn misplaced(&self) -> Vec<ChunkRef> {
        self.regions
            .iter()
            .flat_map(|(_, scan)| scan.misplaced.iter().cloned())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.regions.iter().map(|(_, scan)| scan.total).sum()
    }
}

enum RegionResult {
    Scanned(PathBuf, RegionScan),
    Skipped(SkippedRegion),
    Ignored,
}

/// Scan region files in parallel. Each file is only ever touched by one
/// thread. Unreadable regions are recorded as skipped; the rest of the run
/// continues.
pub fn scan_world(files: &[PathBuf], metrics: &ScanMetrics, interrupt: &AtomicBool) -> WorldScan {
    let results: Vec<RegionResult> = files
        .par_iter()
        .map(|path| scan_one(path, metrics, interrupt))
        .collect();

    let mut world = WorldScan::default();
    for result in results {
        match result {
            RegionResult::Scanned(path, scan) => {
                world.interrupted |= scan.interrupted;
                world.regions.push((path, scan));
            }
            RegionResult::Skipped(skipped) => world.skipped.push(skipped),
            RegionResult::Ignored => {}
        }
    }
    world.interrupted |= interrupt.load(Ordering::Relaxed);
    world
}

fn scan_one(path: &Path, metrics: &ScanMetrics, interrupt: &AtomicBool) -> RegionResult {
    if interrupt.load(Ordering::Relaxed) {
        return RegionResult::Ignored;
    }

    // some region files are 0 bytes size!
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => {
            log::debug!("Skipping empty region file {}", path.display());
            return RegionResult::Ignored;
        }
        _ => {}
    }

    let start = Instant::now();
    match scan_region_file(path, interrupt) {
        Ok(scan) => {
            log::info!(
                "Scanned {}: {} chunks, {} corrupted, {} wrong located",
                path.display(),
                scan.total,
                scan.corrupt.len(),
                scan.misplaced.len()
            );
            metrics.record_region(start.elapsed(), scan.total, scan.corrupt.len(), scan.misplaced.len());
            RegionResult::Scanned(path.to_path_buf(), scan)
        }
        Err(e) => {
            log::warn!("Skipping region {}: {}", path.display(), e);
            metrics.record_skipped_region();
            RegionResult::Skipped(SkippedRegion {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regionfix_anvil::RegionFile;
    use tempfile::TempDir;

    #[test]
    fn test_region_files_filters_and_sorts() {
        let world = TempDir::new().unwrap();
        let region_dir = world.path().join("region");
        std::fs::create_dir(&region_dir).unwrap();
        for name in ["r.1.0.mca", "r.0.0.mca", "r.-1.2.mcr", "r.x.0.mca", "level.dat", "r.0.0.mca.bak"] {
            std::fs::write(region_dir.join(name), b"").unwrap();
        }

        let files = region_files(world.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["r.-1.2.mcr", "r.0.0.mca", "r.1.0.mca"]);
    }

    #[test]
    fn test_region_files_without_region_dir() {
        let world = TempDir::new().unwrap();
        assert!(region_files(world.path()).is_err());
    }

    #[test]
    fn test_backup_region_dirs_keeps_order() {
        let root = TempDir::new().unwrap();
        let a = root.path().join("a");
        let b = root.path().join("b");
        std::fs::create_dir_all(a.join("region")).unwrap();
        std::fs::create_dir_all(b.join("region")).unwrap();
        let bogus = root.path().join("bogus");

        let dirs = backup_region_dirs(&[b.clone(), bogus, a.clone()]);
        assert_eq!(dirs, vec![b.join("region"), a.join("region")]);
    }

    #[test]
    fn test_scan_world_skips_bad_regions() {
        let world = TempDir::new().unwrap();
        let region_dir = world.path().join("region");
        std::fs::create_dir(&region_dir).unwrap();

        RegionFile::create(region_dir.join("r.0.0.mca"))
            .unwrap()
            .write_chunk(0, 0, b"junk")
            .unwrap();
        std::fs::write(region_dir.join("r.1.0.mca"), vec![0u8; 100]).unwrap();
        std::fs::write(region_dir.join("r.2.0.mca"), b"").unwrap();

        let metrics = ScanMetrics::new();
        let files = region_files(world.path()).unwrap();
        let scan = scan_world(&files, &metrics, &AtomicBool::new(false));

        assert_eq!(scan.regions.len(), 1);
        assert_eq!(scan.skipped.len(), 1);
        assert_eq!(scan.skipped[0].path, region_dir.join("r.1.0.mca"));
        assert_eq!(scan.corrupt(), vec![ChunkRef::new(region_dir.join("r.0.0.mca"), 0, 0)]);
        assert_eq!(scan.total(), 1);
        assert!(!scan.interrupted);
        assert_eq!(metrics.regions_skipped.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.chunks_corrupt.load(Ordering::Relaxed), 1);
    }
}
