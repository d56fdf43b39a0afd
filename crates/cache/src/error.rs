//! Error type shared by the cache modules.

/// Errors reported by the tile cache.
///
/// A missing tile, rendering or text file is never an error; lookups return
/// `None` for those.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not a tile cache file name: {0:?}")]
    InvalidFileName(String),
    #[error("cache file name leaves the document directory: {0:?}")]
    UnsafePath(String),
    #[error("unexpected invalidatetiles message: {0:?}")]
    InvalidMessage(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
