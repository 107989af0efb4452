//! Replacing bad chunks with copies from backups, and deleting the rest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use regionfix_anvil::RegionFile;

use crate::ChunkRef;
use crate::check::{ChunkStatus, check_chunk};

/// Where one chunk ended up after trying the backups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairState {
    Pending,
    /// Replaced with the copy from this backup region file.
    Fixed(PathBuf),
    /// No backup had a healthy copy.
    Exhausted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairOutcome {
    pub fixed: usize,
    /// Chunks still broken, in input order. Feed these to [`delete_chunks`].
    pub unresolved: Vec<ChunkRef>,
    /// Set when the pass stopped early on request. Chunks not attempted are
    /// in `unresolved`.
    pub interrupted: bool,
}

/// Try each backup directory in order and copy the first healthy version of
/// the chunk into the primary region file.
///
/// Backups that are missing the region file, or that fail to open, are
/// skipped. An error is returned only when writing to the primary fails.
pub fn repair_chunk(chunk: &ChunkRef, backups: &[PathBuf]) -> Result<RepairState> {
    let Some(region_name) = chunk.path.file_name() else {
        anyhow::bail!("{} has no file name", chunk.path.display());
    };

    let mut state = RepairState::Pending;
    for backup_dir in backups {
        let backup_path = backup_dir.join(region_name);
        if !backup_path.is_file() {
            log::info!("No backup region file for {} in {}", chunk, backup_dir.display());
            continue;
        }

        let status = RegionFile::open_read_only(&backup_path).and_then(|mut backup| {
            let region_pos = backup.region_pos().ok();
            check_chunk(&mut backup, region_pos, chunk.x, chunk.z)
        });

        match status {
            Ok(ChunkStatus::Healthy(payload)) => {
                let mut primary = RegionFile::open(&chunk.path)
                    .with_context(|| format!("opening {}", chunk.path.display()))?;
                primary
                    .write_chunk(chunk.x, chunk.z, &payload)
                    .with_context(|| format!("writing {}", chunk))?;
                log::info!("Chunk {} fixed using backup {}", chunk, backup_path.display());
                state = RepairState::Fixed(backup_path);
                break;
            }
            Ok(ChunkStatus::Empty) => {
                log::info!("The chunk doesn't exist in backup {}", backup_path.display());
            }
            Ok(ChunkStatus::Corrupt(e)) => {
                log::info!("The chunk is corrupted in backup {}: {}", backup_path.display(), e);
            }
            Ok(ChunkStatus::Misplaced { found, .. }) => {
                log::info!(
                    "The chunk is wrong located in backup {} (holds {:?})",
                    backup_path.display(),
                    found
                );
            }
            Err(e) => {
                log::warn!("Could not read backup {}: {}", backup_path.display(), e);
            }
        }
    }

    if state == RepairState::Pending {
        state = RepairState::Exhausted;
    }
    Ok(state)
}

/// Repair every chunk in `chunks` from `backups` (in priority order).
///
/// The input is left untouched; chunks that could not be fixed are collected
/// into a new list. `interrupt` is polled before each chunk.
pub fn repair(chunks: &[ChunkRef], backups: &[PathBuf], interrupt: &AtomicBool) -> RepairOutcome {
    let mut outcome = RepairOutcome::default();

    for (i, chunk) in chunks.iter().enumerate() {
        if interrupt.load(Ordering::Relaxed) {
            outcome.interrupted = true;
            outcome.unresolved.extend_from_slice(&chunks[i..]);
            break;
        }
        match repair_chunk(chunk, backups) {
            Ok(RepairState::Fixed(_)) => outcome.fixed += 1,
            Ok(_) => outcome.unresolved.push(chunk.clone()),
            Err(e) => {
                log::error!("Failed to repair {}: {:#}", chunk, e);
                outcome.unresolved.push(chunk.clone());
            }
        }
    }

    outcome
}

/// Remove every listed chunk from its region's location table.
///
/// Each region file is opened once. A region that cannot be opened is logged
/// and skipped. `interrupt` is polled before each chunk; once set nothing
/// more is deleted. Returns the number of slots actually cleared.
pub fn delete_chunks(chunks: &[ChunkRef], interrupt: &AtomicBool) -> usize {
    let mut by_region: BTreeMap<&Path, Vec<(i32, i32)>> = BTreeMap::new();
    for chunk in chunks {
        by_region
            .entry(chunk.path.as_path())
            .or_default()
            .push((chunk.x, chunk.z));
    }

    let mut deleted = 0;
    for (path, coords) in by_region {
        if interrupt.load(Ordering::Relaxed) {
            break;
        }
        match delete_in_region(path, &coords, interrupt) {
            Ok(count) => deleted += count,
            Err(e) => log::error!("Failed to delete chunks in {}: {:#}", path.display(), e),
        }
    }
    deleted
}

fn delete_in_region(path: &Path, coords: &[(i32, i32)], interrupt: &AtomicBool) -> Result<usize> {
    let mut region =
        RegionFile::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut deleted = 0;
    for &(x, z) in coords {
        if interrupt.load(Ordering::Relaxed) {
            break;
        }
        if region.delete_chunk(x, z)? {
            deleted += 1;
        }
    }
    Ok(deleted)
}
