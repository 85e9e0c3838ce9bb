//! Ingestion configuration types.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Strategy used to enumerate a physical origin directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalkerKind {
    /// Directory reads batched and prefetched on a rayon pool (jwalk).
    #[default]
    Batched,
    /// Plain sequential iteration (walkdir).
    Sequential,
}

/// Configuration for building a merge tree from origins.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct IngestConfig {
    /// Number of origins walked concurrently (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Walker used for physical directories.
    #[builder(default)]
    #[serde(default)]
    pub walker: WalkerKind,

    /// Follow symbolic links while walking.
    #[builder(default = "false")]
    #[serde(default)]
    pub follow_symlinks: bool,

    /// Maximum depth to traverse (None = unlimited).
    #[builder(default)]
    #[serde(default)]
    pub max_depth: Option<u32>,

    /// File extensions (lowercase, without dot) treated as archives.
    #[builder(default = "default_archive_extensions()")]
    #[serde(default = "default_archive_extensions")]
    pub archive_extensions: Vec<String>,

    /// Number of files between two progress events.
    #[builder(default = "1000")]
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

fn default_archive_extensions() -> Vec<String> {
    vec!["bsa".to_string(), "ba2".to_string(), "zip".to_string()]
}

fn default_progress_interval() -> u64 {
    1000
}

impl IngestConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.progress_interval == Some(0) {
            return Err("Progress interval must be at least 1".to_string());
        }
        if let Some(Some(0)) = self.max_depth {
            return Err("Maximum depth must be at least 1".to_string());
        }
        Ok(())
    }
}

impl IngestConfig {
    /// Create a new config builder.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Check whether a file name has one of the archive extensions.
    pub fn is_archive_name(&self, name: &str) -> bool {
        match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => self
                .archive_extensions
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(ext)),
            _ => false,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            walker: WalkerKind::default(),
            follow_symlinks: false,
            max_depth: None,
            archive_extensions: default_archive_extensions(),
            progress_interval: default_progress_interval(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = IngestConfig::builder()
            .threads(4usize)
            .walker(WalkerKind::Sequential)
            .max_depth(Some(8u32))
            .build()
            .unwrap();

        assert_eq!(config.threads, 4);
        assert_eq!(config.walker, WalkerKind::Sequential);
        assert_eq!(config.max_depth, Some(8));
        assert_eq!(config.progress_interval, 1000);
    }

    #[test]
    fn test_config_rejects_zero_interval() {
        let result = IngestConfig::builder().progress_interval(0u64).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_is_archive_name() {
        let config = IngestConfig::default();
        assert!(config.is_archive_name("PluginX - Main.BSA"));
        assert!(config.is_archive_name("textures.ba2"));
        assert!(!config.is_archive_name("plugin.esp"));
        assert!(!config.is_archive_name(".bsa"));
        assert!(!config.is_archive_name("noext"));
    }
}
