use thiserror::Error;

/// Errors raised while reading or writing a region file.
#[derive(Debug, Error)]
pub enum RegionError {
    /// Location table truncated, or a location points outside the file.
    #[error("region header error: {reason}")]
    HeaderCorrupt { reason: String },

    /// Zero-length, over-length, truncated or undecodable chunk record.
    #[error("chunk data error: {reason}")]
    ChunkData { reason: String },

    /// Encoded record needs more sectors than a location entry can hold.
    #[error("chunk needs {sectors} sectors, at most 255 fit in a location entry")]
    ChunkTooLarge { sectors: u64 },

    /// File name does not follow `r.<X>.<Z>.<ext>`.
    #[error("invalid region file name: {name:?}")]
    FilenameFormat { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegionError {
    pub(crate) fn header(reason: impl Into<String>) -> Self {
        Self::HeaderCorrupt {
            reason: reason.into(),
        }
    }

    pub(crate) fn chunk(reason: impl Into<String>) -> Self {
        Self::ChunkData {
            reason: reason.into(),
        }
    }

    /// True for errors that describe damaged region content rather than a
    /// failing device. These classify a chunk as corrupt instead of aborting.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::HeaderCorrupt { .. } | Self::ChunkData { .. })
    }
}

pub type Result<T> = std::result::Result<T, RegionError>;
