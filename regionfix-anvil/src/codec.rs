//! Chunk record framing and compression.
//!
//! A record is `[Length: 4][Type: 1][Data...]` where `Length` is big endian and
//! counts the type byte plus the compressed data.

use std::io::{Cursor, Read, Write};

use flate2::Compression as ZlibCompression;
use flate2::write::ZlibEncoder;

use crate::error::{RegionError, Result};

/// Compression types used in Minecraft region files.
/// Same IDs as used by vanilla Minecraft.
pub mod compression {
    pub const GZIP: u8 = 1;
    pub const ZLIB: u8 = 2;
    pub const NONE: u8 = 3;
    pub const LZ4: u8 = 4;
}

/// Bytes in front of the compressed data: length field + compression type.
pub const RECORD_HEADER_BYTES: u64 = 5;

/// Sanity ceiling for the length field.
///
/// Rough size of an uncompressed chunk: blocks + data + skylight + block light
/// + heightmap + entities. A larger value almost certainly means the length
/// field itself is garbage.
pub const MAX_CHUNK_LENGTH: u32 = 32768 + 16384 + 16384 + 16384 + 256 + 1024;

/// Compress a payload with zlib and frame it as a record.
pub fn encode(payload: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), ZlibCompression::default());
    encoder.write_all(payload)?;
    let compressed = encoder.finish()?;

    let total_len = (compressed.len() + 1) as u32; // +1 byte for Type
    let mut record = Vec::with_capacity(compressed.len() + RECORD_HEADER_BYTES as usize);
    record.extend_from_slice(&total_len.to_be_bytes()); // Big Endian Length
    record.push(compression::ZLIB);
    record.extend_from_slice(&compressed);
    Ok(record)
}

/// Unframe and decompress a full record.
pub fn decode(record: &[u8]) -> Result<Vec<u8>> {
    let mut reader = Cursor::new(record);
    let length = read_length(&mut reader)?;
    read_body(&mut reader, length)
}

/// Read and validate the length field of a record.
pub fn read_length<R: Read>(reader: &mut R) -> Result<u32> {
    let mut raw = [0u8; 4];
    read_record_bytes(reader, &mut raw)?;
    let length = u32::from_be_bytes(raw);

    if length == 0 {
        return Err(RegionError::chunk("the length of the chunk is 0"));
    }
    if length > MAX_CHUNK_LENGTH {
        return Err(RegionError::chunk(format!(
            "the length of the chunk is too big ({length} > {MAX_CHUNK_LENGTH})"
        )));
    }
    Ok(length)
}

/// Read the `length` bytes following the length field and decompress them.
pub fn read_body<R: Read>(reader: &mut R, length: u32) -> Result<Vec<u8>> {
    let mut body = vec![0u8; length as usize];
    read_record_bytes(reader, &mut body)?;
    decompress(body[0], &body[1..])
}

/// Decompress chunk data according to its compression type.
/// Supports GZip (1), ZLib (2), None (3), and LZ4 (4).
pub fn decompress(compression_type: u8, compressed_data: &[u8]) -> Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    let result = match compression_type {
        compression::ZLIB => {
            flate2::read::ZlibDecoder::new(compressed_data).read_to_end(&mut decompressed)
        }
        compression::GZIP => {
            flate2::read::GzDecoder::new(compressed_data).read_to_end(&mut decompressed)
        }
        compression::NONE => return Ok(compressed_data.to_vec()),
        compression::LZ4 => {
            lz4_java_wrc::Lz4BlockInput::new(compressed_data).read_to_end(&mut decompressed)
        }
        other => {
            return Err(RegionError::chunk(format!(
                "unknown compression type: {other}"
            )));
        }
    };

    // The input is already in memory, so any failure here is bad data.
    result.map_err(|e| {
        RegionError::chunk(format!(
            "decompression failed (type {compression_type}): {e}"
        ))
    })?;
    Ok(decompressed)
}

fn read_record_bytes<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => RegionError::chunk("chunk record is truncated"),
        _ => e.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;

    #[test]
    fn test_round_trip() {
        let payload = b"a chunk payload, a chunk payload, a chunk payload".repeat(20);
        let record = encode(&payload).unwrap();

        let length = u32::from_be_bytes([record[0], record[1], record[2], record[3]]);
        assert_eq!(length as usize, record.len() - 4);
        assert_eq!(record[4], compression::ZLIB);
        assert_eq!(decode(&record).unwrap(), payload);
    }

    #[test]
    fn test_round_trip_empty_payload() {
        let record = encode(&[]).unwrap();
        assert_eq!(decode(&record).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_decode_gzip_record() {
        let payload = b"legacy gzip chunk".to_vec();
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(&payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut record = ((compressed.len() + 1) as u32).to_be_bytes().to_vec();
        record.push(compression::GZIP);
        record.extend_from_slice(&compressed);
        assert_eq!(decode(&record).unwrap(), payload);
    }

    #[test]
    fn test_decode_uncompressed_record() {
        let record = [0, 0, 0, 4, compression::NONE, 7, 8, 9];
        assert_eq!(decode(&record).unwrap(), vec![7, 8, 9]);
    }

    #[test]
    fn test_zero_length() {
        let err = decode(&[0, 0, 0, 0, 2]).unwrap_err();
        assert!(matches!(err, RegionError::ChunkData { .. }));
    }

    #[test]
    fn test_length_over_ceiling() {
        let mut record = (MAX_CHUNK_LENGTH + 1).to_be_bytes().to_vec();
        record.push(compression::ZLIB);
        let err = decode(&record).unwrap_err();
        assert!(matches!(err, RegionError::ChunkData { .. }));
    }

    #[test]
    fn test_garbage_zlib_data() {
        let record = [0, 0, 0, 6, compression::ZLIB, 0xde, 0xad, 0xbe, 0xef, 0x00];
        let err = decode(&record).unwrap_err();
        assert!(matches!(err, RegionError::ChunkData { .. }), "{err:?}");
    }

    #[test]
    fn test_unknown_compression() {
        let err = decode(&[0, 0, 0, 2, 9, 0]).unwrap_err();
        assert!(matches!(err, RegionError::ChunkData { .. }));
    }

    #[test]
    fn test_truncated_body() {
        let mut record = encode(b"some payload bytes").unwrap();
        record.truncate(record.len() - 3);
        let err = decode(&record).unwrap_err();
        assert!(matches!(err, RegionError::ChunkData { .. }));
    }
}
