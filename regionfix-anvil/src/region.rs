//! A single region file opened for reading and writing chunks.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::codec;
use crate::error::{RegionError, Result};
use crate::header::{HeaderTable, Location, MAX_SECTOR_COUNT, MAX_SECTOR_OFFSET};
use crate::{FIRST_DATA_SECTOR, RegionPos, SECTOR_BYTES, sector_to_offset, sectors_for};

/// An open region file.
///
/// The header tables are read once on open and kept in memory; every change
/// goes to disk immediately. The file handle is closed when this value is
/// dropped, whichever way the owning scope exits.
#[derive(Debug)]
pub struct RegionFile {
    path: PathBuf,
    file: File,
    header: HeaderTable,
}

impl RegionFile {
    /// Open an existing region file for reading and writing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        Self::from_file(path.as_ref(), file)
    }

    /// Open an existing region file without write access (used for backups).
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_file(path.as_ref(), file)
    }

    /// Create (or truncate) a region file holding only an empty header.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        let header = HeaderTable::empty();
        file.write_all(&header.to_bytes())?;
        file.sync_data()?;

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            file,
            header,
        })
    }

    fn from_file(path: &Path, mut file: File) -> Result<Self> {
        let header = HeaderTable::load(&mut file)?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            header,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Region coordinates parsed from the file name.
    pub fn region_pos(&self) -> Result<RegionPos> {
        RegionPos::from_path(&self.path)
    }

    pub fn header(&self) -> &HeaderTable {
        &self.header
    }

    /// Number of non-empty chunk slots.
    pub fn chunk_count(&self) -> usize {
        self.header.chunk_count()
    }

    /// Live extents as `(slot index, location)` pairs.
    pub fn extents(&self) -> Vec<(usize, Location)> {
        self.header.extents().collect()
    }

    /// Current file length in bytes.
    pub fn file_len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Last time the chunk was written, or `None` for an empty slot.
    pub fn timestamp(&self, x: i32, z: i32) -> Option<SystemTime> {
        self.header
            .timestamp(x, z)
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs as u64))
    }

    /// Read and decompress the payload of a chunk.
    ///
    /// An empty slot is `Ok(None)`. A location outside the file is a
    /// `HeaderCorrupt` error; a bad record is a `ChunkData` error.
    pub fn read_chunk(&mut self, x: i32, z: i32) -> Result<Option<Vec<u8>>> {
        let Some(location) = self.header.locate(x, z) else {
            return Ok(None);
        };

        if location.sector_offset < FIRST_DATA_SECTOR {
            return Err(RegionError::header(format!(
                "chunk ({x}, {z}) points into the region header (sector {})",
                location.sector_offset
            )));
        }

        // minimum chunk size = 1 sector
        let file_len = self.file_len()?;
        if location.byte_offset() + SECTOR_BYTES > file_len {
            return Err(RegionError::header(format!(
                "the offset of chunk ({x}, {z}) is outside the file (sector {}, file is {file_len} bytes)",
                location.sector_offset
            )));
        }

        self.file.seek(SeekFrom::Start(location.byte_offset()))?;
        let length = codec::read_length(&mut self.file)?;
        if length as u64 + 4 > location.capacity() {
            return Err(RegionError::chunk(format!(
                "record of {} bytes overflows the {} sectors reserved for chunk ({x}, {z})",
                length as u64 + 4,
                location.sector_count
            )));
        }

        codec::read_body(&mut self.file, length).map(Some)
    }

    /// Compress and store a payload, returning where it was placed.
    ///
    /// The record is written and synced before the location table is touched,
    /// so a crash in between leaves at worst an unreferenced block.
    pub fn write_chunk(&mut self, x: i32, z: i32, payload: &[u8]) -> Result<Location> {
        let record = codec::encode(payload)?;
        let needed = sectors_for(record.len() as u64);
        if needed > MAX_SECTOR_COUNT as u64 {
            return Err(RegionError::ChunkTooLarge { sectors: needed });
        }

        let file_sectors = sectors_for(self.file_len()?);
        let reservation = self.header.reserve(x, z, needed as u32, file_sectors);
        let offset = reservation.offset();
        if offset > MAX_SECTOR_OFFSET {
            return Err(RegionError::header(format!(
                "sector {offset} is beyond what a location entry can address"
            )));
        }

        self.file.seek(SeekFrom::Start(sector_to_offset(offset)))?;
        self.file.write_all(&record)?;

        // The extent must end on a sector boundary even when the old file
        // had a partial last sector, or the bounds check rejects it on read.
        let extent_end = sector_to_offset(offset) + needed * SECTOR_BYTES;
        let current_len = self.file_len()?;
        let padded_len = sectors_for(current_len.max(extent_end)) * SECTOR_BYTES;
        if padded_len != current_len {
            self.file.set_len(padded_len)?;
        }
        self.file.sync_data()?;

        let location = Location::new(offset, needed as u8);
        self.header
            .commit(&mut self.file, x, z, location, unix_now())?;
        self.file.flush()?;

        log::debug!(
            "{}: wrote chunk ({}, {}) to {:?} ({} sectors)",
            self.path.display(),
            x,
            z,
            reservation,
            needed
        );
        Ok(location)
    }

    /// Remove a chunk from the location table.
    ///
    /// The record bytes are left in place. Returns `false` when there was
    /// nothing to delete.
    pub fn delete_chunk(&mut self, x: i32, z: i32) -> Result<bool> {
        let deleted = self.header.release(&mut self.file, x, z)?;
        if deleted {
            self.file.flush()?;
            log::debug!("{}: deleted chunk ({}, {})", self.path.display(), x, z);
        }
        Ok(deleted)
    }
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
