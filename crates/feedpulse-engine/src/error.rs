//! Error types for the feed reliability engine.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the engine.
///
/// The engine absorbs adverse inputs wherever it can (missing quality values,
/// never-seen sources, serialization hiccups on best-effort snapshots), so
/// this enum is deliberately small. The one condition that must reach the
/// caller is cache corruption: stored bytes that fail to decompress indicate
/// a real data-integrity problem, not a recoverable miss.
#[derive(Error, Debug)]
pub enum Error {
    /// A cached entry's compressed bytes could not be decompressed.
    #[error("corrupted cache entry '{key}': {reason}")]
    CacheCorruption {
        /// The cache key whose payload failed to decompress.
        key: String,
        /// Description of the underlying decompression failure.
        reason: String,
    },
}
