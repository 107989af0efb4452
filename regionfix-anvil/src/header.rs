//! Region file header and sector allocation.
//!
//! The header consists of two tables:
//! - Location table: where each chunk is stored
//! - Timestamp table: when each chunk was last saved
//!
//! The in-memory [`HeaderTable`] is the only record of which sectors are in
//! use. Free space is never stored; it is derived from the live locations
//! each time a chunk needs new room.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{RegionError, Result};
use crate::{FIRST_DATA_SECTOR, HEADER_BYTES, REGION_CHUNKS, SECTOR_BYTES, local_to_index};

/// Largest sector offset a location entry can address (3 bytes).
pub const MAX_SECTOR_OFFSET: u32 = 0x00FF_FFFF;

/// Largest sector count a location entry can hold (1 byte).
pub const MAX_SECTOR_COUNT: u32 = u8::MAX as u32;

/// One entry of the location table.
///
/// Minecraft stores: [Offset:3 bytes][Count:1 byte] (Big Endian)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    pub sector_offset: u32,
    pub sector_count: u8,
}

impl Location {
    pub fn new(sector_offset: u32, sector_count: u8) -> Self {
        Self {
            sector_offset,
            sector_count,
        }
    }

    pub fn from_raw(raw: u32) -> Self {
        Self {
            sector_offset: raw >> 8,
            sector_count: (raw & 0xFF) as u8,
        }
    }

    pub fn to_raw(self) -> u32 {
        ((self.sector_offset & MAX_SECTOR_OFFSET) << 8) | self.sector_count as u32
    }

    /// An offset of 0 marks an empty slot.
    pub fn is_empty(self) -> bool {
        self.sector_offset == 0
    }

    /// First sector after this extent.
    pub fn end(self) -> u64 {
        self.sector_offset as u64 + self.sector_count as u64
    }

    /// Byte offset of the record in the file.
    pub fn byte_offset(self) -> u64 {
        crate::sector_to_offset(self.sector_offset)
    }

    /// Bytes reserved for the record.
    pub fn capacity(self) -> u64 {
        self.sector_count as u64 * SECTOR_BYTES
    }

    /// Whether the half-open extent `[sector_offset, end)` intersects
    /// `[start, start + len)`.
    pub fn overlaps(self, start: u64, len: u64) -> bool {
        ranges_overlap(self.sector_offset as u64, self.sector_count as u64, start, len)
    }
}

/// `[a, a+n)` and `[b, b+m)` overlap iff `a < b+m && b < a+n`.
#[inline]
pub fn ranges_overlap(a: u64, n: u64, b: u64, m: u64) -> bool {
    a < b + m && b < a + n
}

/// Where a chunk record is going to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// The slot's current extent is large enough.
    InPlace(u32),
    /// A free run of sectors between existing extents.
    Gap(u32),
    /// New sectors at the end of the file.
    Append(u32),
}

impl Reservation {
    pub fn offset(self) -> u32 {
        match self {
            Self::InPlace(offset) | Self::Gap(offset) | Self::Append(offset) => offset,
        }
    }
}

/// Location and timestamp tables for the 1024 chunk slots of a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderTable {
    locations: Vec<Location>,
    timestamps: Vec<u32>,
}

impl Default for HeaderTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl HeaderTable {
    /// A header with every slot empty.
    pub fn empty() -> Self {
        Self {
            locations: vec![Location::default(); REGION_CHUNKS],
            timestamps: vec![0; REGION_CHUNKS],
        }
    }

    /// Read both tables from the start of a region file.
    ///
    /// Only a short read is an error here. Overlapping or out-of-bounds
    /// locations are left for the reader and the allocator to deal with.
    pub fn load<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let mut raw = vec![0u8; HEADER_BYTES as usize];
        if let Err(e) = reader.read_exact(&mut raw) {
            return Err(match e.kind() {
                std::io::ErrorKind::UnexpectedEof => {
                    RegionError::header("region file is shorter than its 8192-byte header")
                }
                _ => e.into(),
            });
        }
        Ok(Self::from_bytes(&raw))
    }

    /// Parse an 8192-byte header. Shorter input leaves the missing slots empty.
    pub fn from_bytes(raw: &[u8]) -> Self {
        let mut table = Self::empty();
        let half = SECTOR_BYTES as usize;
        for index in 0..REGION_CHUNKS {
            let loc_idx = index * 4;
            if let Some(bytes) = raw.get(loc_idx..loc_idx + 4) {
                table.locations[index] = Location::from_raw(be_u32(bytes));
            }
            if let Some(bytes) = raw.get(half + loc_idx..half + loc_idx + 4) {
                table.timestamps[index] = be_u32(bytes);
            }
        }
        table
    }

    /// Serialize both tables into the 8192-byte on-disk header.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut header = vec![0u8; HEADER_BYTES as usize];
        let half = SECTOR_BYTES as usize;
        for index in 0..REGION_CHUNKS {
            let loc_idx = index * 4;
            header[loc_idx..loc_idx + 4].copy_from_slice(&self.locations[index].to_raw().to_be_bytes());
            header[half + loc_idx..half + loc_idx + 4]
                .copy_from_slice(&self.timestamps[index].to_be_bytes());
        }
        header
    }

    /// Location of a chunk, or `None` when the slot is empty.
    pub fn locate(&self, x: i32, z: i32) -> Option<Location> {
        let location = self.locations[local_to_index(x, z)];
        (!location.is_empty()).then_some(location)
    }

    /// Last-modified time (seconds since epoch), or `None` when the slot is empty.
    pub fn timestamp(&self, x: i32, z: i32) -> Option<u32> {
        let index = local_to_index(x, z);
        (!self.locations[index].is_empty()).then_some(self.timestamps[index])
    }

    /// Number of non-empty slots.
    pub fn chunk_count(&self) -> usize {
        self.locations.iter().filter(|l| !l.is_empty()).count()
    }

    /// Live extents as `(index, location)` pairs.
    pub fn extents(&self) -> impl Iterator<Item = (usize, Location)> + '_ {
        self.locations
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, l)| !l.is_empty())
    }

    /// Pick the sectors a record of `needed` sectors will be written to.
    ///
    /// `file_sectors` is the current file length in sectors. The slot's own
    /// extent is reused when it is big enough; otherwise the first free run
    /// from sector 2 upward that ends before `file_sectors` wins, and failing
    /// that the record goes at the end of the file.
    pub fn reserve(&self, x: i32, z: i32, needed: u32, file_sectors: u64) -> Reservation {
        let index = local_to_index(x, z);
        let current = self.locations[index];
        let sane = current.sector_offset >= FIRST_DATA_SECTOR && current.end() <= file_sectors;
        if !current.is_empty() && sane && current.sector_count as u32 >= needed {
            return Reservation::InPlace(current.sector_offset);
        }

        let needed = needed as u64;
        let occupied: Vec<Location> = self
            .extents()
            .filter(|(i, l)| *i != index && l.sector_count > 0)
            .map(|(_, l)| l)
            .collect();

        let mut candidate = FIRST_DATA_SECTOR as u64;
        while candidate + needed <= file_sectors {
            // Every start before the end of a blocking extent still hits it,
            // so skip straight past the furthest one.
            let blocked_until = occupied
                .iter()
                .filter(|l| l.overlaps(candidate, needed))
                .map(|l| l.end())
                .max();
            match blocked_until {
                Some(end) => candidate = end,
                None => return Reservation::Gap(candidate as u32),
            }
        }

        Reservation::Append(file_sectors.max(FIRST_DATA_SECTOR as u64) as u32)
    }

    /// Write a slot's location and timestamp to disk and to the table.
    pub fn commit<W: Write + Seek>(
        &mut self,
        writer: &mut W,
        x: i32,
        z: i32,
        location: Location,
        timestamp: u32,
    ) -> Result<()> {
        let index = local_to_index(x, z);
        let loc_idx = (index * 4) as u64;

        writer.seek(SeekFrom::Start(loc_idx))?;
        writer.write_all(&location.to_raw().to_be_bytes())?;
        writer.seek(SeekFrom::Start(SECTOR_BYTES + loc_idx))?;
        writer.write_all(&timestamp.to_be_bytes())?;

        self.locations[index] = location;
        self.timestamps[index] = timestamp;
        Ok(())
    }

    /// Clear a slot's location. The record bytes stay where they are; the
    /// sectors simply stop counting as occupied.
    ///
    /// Returns `false` when the slot was already empty.
    pub fn release<W: Write + Seek>(&mut self, writer: &mut W, x: i32, z: i32) -> Result<bool> {
        let index = local_to_index(x, z);
        if self.locations[index].is_empty() {
            return Ok(false);
        }

        writer.seek(SeekFrom::Start((index * 4) as u64))?;
        writer.write_all(&[0u8; 4])?;
        self.locations[index] = Location::default();
        Ok(true)
    }
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
