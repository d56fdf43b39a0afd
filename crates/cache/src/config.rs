//! Cache configuration: where document caches live and how much memory
//! they may use.
//!
//! Configuration can be loaded from a TOML file, environment variables, or
//! created programmatically.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, CacheResult};

const MB: usize = 1024 * 1024;

const ENV_CACHE_DIR: &str = "DOC_TILE_CACHE_DIR";
const ENV_MEMORY_MB: &str = "DOC_TILE_CACHE_MEMORY_MB";

/// Configuration shared by the tile caches of all documents
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Directory under which every document gets its own cache directory
    pub cache_root: PathBuf,
    /// Per-document in-memory limit in bytes
    pub memory_limit: usize,
}

/// On-disk representation of [`CacheConfig`]
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    memory_mb: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_root: Self::default_cache_root(),
            memory_limit: 256 * MB,
        }
    }
}

impl CacheConfig {
    pub fn new<P: AsRef<Path>>(cache_root: P, memory_mb: usize) -> Self {
        Self {
            cache_root: cache_root.as_ref().to_path_buf(),
            memory_limit: memory_mb.saturating_mul(MB),
        }
    }

    /// Sets the cache root directory.
    pub fn with_cache_root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.cache_root = path.as_ref().to_path_buf();
        self
    }

    /// Sets the in-memory limit in megabytes, saturating at `usize::MAX` bytes.
    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.memory_limit = mb.saturating_mul(MB);
        self
    }

    /// Returns the in-memory limit in megabytes.
    pub fn memory_mb(&self) -> usize {
        self.memory_limit / MB
    }

    /// Returns the default cache root for the current platform.
    ///
    /// - macOS: ~/Library/Caches/doc-tile-cache/tiles
    /// - Linux: ~/.cache/doc-tile-cache/tiles
    /// - Windows: %LOCALAPPDATA%\doc-tile-cache\tiles
    pub fn default_cache_root() -> PathBuf {
        if let Some(cache_dir) = dirs::cache_dir() {
            cache_dir.join("doc-tile-cache").join("tiles")
        } else {
            PathBuf::from("cache/tiles")
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// - `DOC_TILE_CACHE_DIR`: cache root directory
    /// - `DOC_TILE_CACHE_MEMORY_MB`: per-document memory limit in MB (default: 256)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> CacheResult<Self> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var(ENV_CACHE_DIR) {
            config.cache_root = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(ENV_MEMORY_MB) {
            config.memory_limit = val
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(megabytes)
                .ok_or_else(|| CacheError::Config(format!("{ENV_MEMORY_MB}={val:?}")))?;
        }

        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// ```toml
    /// cache_dir = "/var/cache/documents"
    /// memory_mb = 256
    /// ```
    ///
    /// Missing keys keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> CacheResult<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> CacheResult<Self> {
        let file: ConfigFile =
            toml::from_str(toml_str).map_err(|e| CacheError::Config(e.to_string()))?;

        let mut config = Self::default();
        if let Some(dir) = file.cache_dir {
            config.cache_root = dir;
        }
        if let Some(mb) = file.memory_mb {
            config.memory_limit = megabytes(mb)
                .ok_or_else(|| CacheError::Config(format!("memory_mb = {mb} is too large")))?;
        }
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> CacheResult<()> {
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    fn to_toml(&self) -> CacheResult<String> {
        let file = ConfigFile {
            cache_dir: Some(self.cache_root.clone()),
            memory_mb: Some(self.memory_mb()),
        };
        toml::to_string(&file).map_err(|e| CacheError::Config(e.to_string()))
    }
}

/// `mb` megabytes in bytes, if that fits in a `usize`
fn megabytes(mb: usize) -> Option<usize> {
    mb.checked_mul(MB)
}
