//! Error types for save reading and writing.
//!
//! Data problems found while reading a slot are not errors: they are recorded
//! on the [`Container`](crate::container::Container) as an
//! [`Incompatibility`](crate::container::Incompatibility). The variants below
//! cover I/O failures and API misuse.

use thiserror::Error;

/// Result type alias for save operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for save operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// LZ4 block could not be decompressed.
    #[error("LZ4 decompression failed: {0}")]
    Lz4(#[from] lz4_flex::block::DecompressError),

    /// Backup archive could not be read or written.
    #[error("Backup archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Data truncated unexpectedly.
    #[error("Unexpected end of data")]
    UnexpectedEof,

    /// Header magic did not match.
    #[error("Invalid magic: expected 0x{expected:08X}, got 0x{actual:08X}")]
    InvalidMagic { expected: u32, actual: u32 },

    /// Meta buffer length is not one of the known lengths of the platform.
    #[error("Invalid meta length: {0} bytes")]
    InvalidMetaLength(usize),

    /// Operation requires a loaded container.
    #[error("Container {0} is not loaded")]
    NotLoaded(u32),

    /// Index outside of the valid range.
    #[error("Invalid index: {0}")]
    InvalidIndex(u32),

    /// Path expression is malformed or does not resolve.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Copy or swap between containers where one exists but is incompatible.
    #[error("Container {0} exists but is incompatible")]
    Incompatible(u32),

    /// Operation not available for this platform or data.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}
