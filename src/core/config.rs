//! Cloud configuration
//!
//! Every field has a default, so a TOML file only needs the keys it changes:
//!
//! ```toml
//! debug = true
//! fence = false
//! cache_capacity = 4096
//! compression = "lz4"
//! ```

use crate::core::compression::{CompressionConfig, CompressionMethod};
use crate::core::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CloudConfig {
    /// Emit a debug event for every store and load
    pub debug: bool,

    /// Fence the world after every store
    pub fence: bool,

    /// Treat a cache miss on load as an error
    pub force_load_from_cache: bool,

    /// Maximum number of cached objects; unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_capacity: Option<usize>,

    pub compression: CompressionMethod,

    /// Records shorter than this are stored uncompressed
    pub compression_threshold: usize,

    /// Compressed/original ratio a record must beat to stay compressed
    pub compression_min_ratio: f32,

    /// Check the crc32 of every record read from the container
    pub verify_checksums: bool,
}

impl Default for CloudConfig {
    fn default() -> Self {
        CloudConfig {
            debug: false,
            fence: true,
            force_load_from_cache: false,
            cache_capacity: None,
            compression: CompressionMethod::None,
            compression_threshold: 512,
            compression_min_ratio: 0.9,
            verify_checksums: true,
        }
    }
}

impl CloudConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: CloudConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == Some(0) {
            return Err(CloudError::Config(
                "cache_capacity must be positive (omit it for an unbounded cache)".to_string(),
            ));
        }
        if !(self.compression_min_ratio > 0.0 && self.compression_min_ratio <= 1.0) {
            return Err(CloudError::Config(format!(
                "compression_min_ratio must lie in (0, 1], got {}",
                self.compression_min_ratio
            )));
        }
        Ok(())
    }

    /// Compression settings for record archives
    pub fn compression_config(&self) -> CompressionConfig {
        CompressionConfig {
            method: self.compression,
            threshold: self.compression_threshold,
            min_ratio: self.compression_min_ratio,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_fence(mut self, fence: bool) -> Self {
        self.fence = fence;
        self
    }

    pub fn with_force_load_from_cache(mut self, force: bool) -> Self {
        self.force_load_from_cache = force;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = Some(capacity);
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression.method;
        self.compression_threshold = compression.threshold;
        self.compression_min_ratio = compression.min_ratio;
        self
    }
}
