//! Pipeline settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::{ArtifactCache, DEFAULT_CACHE_DIR};

/// Settings shared by every shader a host builds.
///
/// Missing fields take their defaults when deserialised, so the struct can
/// be embedded in a larger configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root directory of the artifact cache.
    pub cache_dir: PathBuf,
    /// Entry point compiled and specialised in every stage.
    pub entry_point: String,
    /// Optimise the cached binaries. Reflection always compiles without
    /// optimisation.
    pub optimize: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            entry_point: "main".to_string(),
            optimize: true,
        }
    }
}

impl PipelineConfig {
    /// The artifact cache these settings describe.
    #[must_use]
    pub fn cache(&self) -> ArtifactCache {
        ArtifactCache::new(&self.cache_dir)
    }
}
