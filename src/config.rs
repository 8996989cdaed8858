/// Configuration for the media feed
///
/// Stored as JSON. Every field has a default, so a missing file or a file
/// naming only a few fields is fine.
use crate::error::Result;
use crate::media::thumbnail::default_cache_root;
use crate::sync::operations::RotateConsistency;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the config inside the config directory
pub const CONFIG_FILE: &str = "config.json";

/// Get the default database path
/// Returns ~/.local/share/media-feed/library.db on Linux
pub fn default_database_path() -> PathBuf {
    let mut path = dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    path.push("media-feed");
    path.push("library.db");
    path
}

/// Default config file location, `~/.config/media-feed/config.json` on Linux
pub fn default_config_path() -> Option<PathBuf> {
    let mut path = dirs::config_dir()?;
    path.push("media-feed");
    path.push(CONFIG_FILE);
    Some(path)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Root the well-known camera and download folders live under
    pub storage_root: PathBuf,
    pub database_path: PathBuf,
    /// Root of the cache index and thumbnail caches
    pub cache_dir: PathBuf,
    pub disable_images: bool,
    pub disable_videos: bool,
    pub rotate_consistency: RotateConsistency,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            storage_root: dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
            database_path: default_database_path(),
            cache_dir: default_cache_root().unwrap_or_else(|| PathBuf::from(".media-feed-cache")),
            disable_images: false,
            disable_videos: false,
            rotate_consistency: RotateConsistency::default(),
        }
    }
}

impl FeedConfig {
    /// Read the config at `path`, defaults when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("⚙️  No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let config = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        info!("⚙️  Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FeedConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, FeedConfig::default());
        assert!(config.database_path.ends_with("media-feed/library.db"));
        assert_eq!(config.rotate_consistency, RotateConsistency::Compatible);
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"{ "storage_root": "/sdcard", "disable_videos": true, "rotate_consistency": "store_authoritative" }"#,
        )
        .unwrap();

        let config = FeedConfig::load(&path).unwrap();
        assert_eq!(config.storage_root, PathBuf::from("/sdcard"));
        assert!(config.disable_videos);
        assert!(!config.disable_images);
        assert_eq!(config.rotate_consistency, RotateConsistency::StoreAuthoritative);
        assert_eq!(config.database_path, default_database_path());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = FeedConfig {
            cache_dir: dir.path().join("cache"),
            disable_images: true,
            ..FeedConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(FeedConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "not json").unwrap();
        assert!(FeedConfig::load(&path).is_err());
    }
}
