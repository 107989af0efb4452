//! NBT (Named Binary Tag) access for chunk payloads.
//!
//! Only the chunk's own coordinates are ever read. Everything else in the
//! payload is skipped by the deserializer.

use serde::Deserialize;

use crate::error::{RegionError, Result};

/// Chunk coordinates as stored in the payload.
///
/// Older chunks keep them in a `Level` compound; modern ones (1.18+) have
/// `xPos`/`zPos` directly on the root.
#[derive(Debug, Deserialize)]
struct ChunkRoot {
    #[serde(rename = "Level", default)]
    level: Option<ChunkPosTags>,

    #[serde(rename = "xPos", default)]
    x_pos: Option<i32>,
    #[serde(rename = "zPos", default)]
    z_pos: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct ChunkPosTags {
    #[serde(rename = "xPos", default)]
    x_pos: Option<i32>,
    #[serde(rename = "zPos", default)]
    z_pos: Option<i32>,
}

/// Read the absolute chunk coordinates (`Level.xPos`/`Level.zPos`, or the
/// root `xPos`/`zPos`) from an uncompressed NBT payload.
pub fn chunk_coords(payload: &[u8]) -> Result<(i32, i32)> {
    let root: ChunkRoot = fastnbt::from_bytes(payload)
        .map_err(|e| RegionError::chunk(format!("NBT parse failed: {e}")))?;

    if let Some(ChunkPosTags {
        x_pos: Some(x),
        z_pos: Some(z),
    }) = root.level
    {
        return Ok((x, z));
    }

    match (root.x_pos, root.z_pos) {
        (Some(x), Some(z)) => Ok((x, z)),
        _ => Err(RegionError::chunk(
            "could not find xPos/zPos in NBT root or Level compound",
        )),
    }
}
