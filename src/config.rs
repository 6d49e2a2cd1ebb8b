//! Service configuration
//!
//! Storage folders, upload limits and retention settings. A `Config` is
//! built once and handed to the dispatcher and the retention sweeper.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MoodshiftError, Result};

/// Default upload size limit (300 MB)
pub const DEFAULT_MAX_CONTENT_LENGTH: u64 = 300 * 1024 * 1024;

/// Default age after which stored files are swept (days)
pub const DEFAULT_CLEANUP_MAX_AGE_DAYS: u64 = 7;

/// Default interval between retention sweeps (one day)
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 24 * 60 * 60;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folder receiving staged uploads
    pub upload_dir: PathBuf,
    /// Folder holding processed output artifacts
    pub processed_dir: PathBuf,
    /// Maximum accepted upload size in bytes
    pub max_content_length: u64,
    /// Accepted upload file extensions (lowercase, no dot)
    pub allowed_extensions: BTreeSet<String>,
    /// Files older than this many days are removed by the sweep
    pub cleanup_max_age_days: u64,
    /// Seconds between scheduled sweeps
    pub cleanup_interval_secs: u64,
    /// Number of worker threads executing jobs
    pub worker_count: usize,
    /// ffmpeg executable used for compressed output formats
    pub ffmpeg_binary: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            processed_dir: PathBuf::from("processed_audio"),
            max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
            allowed_extensions: ["wav", "mp3", "m4a", "ogg", "flac"]
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            cleanup_max_age_days: DEFAULT_CLEANUP_MAX_AGE_DAYS,
            cleanup_interval_secs: DEFAULT_CLEANUP_INTERVAL_SECS,
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            ffmpeg_binary: PathBuf::from("ffmpeg"),
        }
    }
}

impl Config {
    /// Build a config rooted at a single working directory
    pub fn with_root(root: &Path) -> Self {
        Self {
            upload_dir: root.join("uploads"),
            processed_dir: root.join("processed_audio"),
            ..Self::default()
        }
    }

    /// Build a config from `MOODSHIFT_*` environment variables
    ///
    /// Unset variables keep their defaults; unparsable numbers are logged
    /// and replaced by the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            upload_dir: env_path("MOODSHIFT_UPLOAD_DIR").unwrap_or(defaults.upload_dir),
            processed_dir: env_path("MOODSHIFT_PROCESSED_DIR").unwrap_or(defaults.processed_dir),
            max_content_length: env_or("MOODSHIFT_MAX_CONTENT_LENGTH", defaults.max_content_length),
            allowed_extensions: defaults.allowed_extensions,
            cleanup_max_age_days: env_or(
                "MOODSHIFT_CLEANUP_MAX_AGE_DAYS",
                defaults.cleanup_max_age_days,
            ),
            cleanup_interval_secs: env_or(
                "MOODSHIFT_CLEANUP_INTERVAL_SECS",
                defaults.cleanup_interval_secs,
            ),
            worker_count: env_or("MOODSHIFT_WORKERS", defaults.worker_count),
            ffmpeg_binary: env_path("MOODSHIFT_FFMPEG").unwrap_or(defaults.ffmpeg_binary),
        }
    }

    /// Load a JSON config file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MoodshiftError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(MoodshiftError::Config {
                reason: "worker_count must be at least 1".to_string(),
            });
        }
        if self.cleanup_interval_secs == 0 {
            return Err(MoodshiftError::Config {
                reason: "cleanup_interval_secs must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// Create the upload and processed folders if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.upload_dir)?;
        fs::create_dir_all(&self.processed_dir)?;
        Ok(())
    }

    pub fn cleanup_max_age(&self) -> Duration {
        Duration::from_secs(self.cleanup_max_age_days.saturating_mul(SECS_PER_DAY))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    /// Check whether an extension (without dot) is accepted for upload
    pub fn is_allowed_extension(&self, ext: &str) -> bool {
        self.allowed_extensions.contains(&ext.to_ascii_lowercase())
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn env_or<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, default = %default, "invalid config value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_content_length, 300 * 1024 * 1024);
        assert_eq!(config.cleanup_max_age_days, 7);
        assert!(config.is_allowed_extension("wav"));
        assert!(config.is_allowed_extension("FLAC"));
        assert!(!config.is_allowed_extension("aiff"));
        assert!(config.worker_count >= 1);
    }

    #[test]
    fn test_cleanup_max_age() {
        let config = Config {
            cleanup_max_age_days: 2,
            ..Config::default()
        };
        assert_eq!(config.cleanup_max_age(), Duration::from_secs(2 * 86_400));
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("moodshift.json");
        fs::write(&path, r#"{ "worker_count": 3, "cleanup_max_age_days": 1 }"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.worker_count, 3);
        assert_eq!(config.cleanup_max_age_days, 1);
        assert_eq!(config.processed_dir, PathBuf::from("processed_audio"));
    }

    #[test]
    fn test_from_file_rejects_zero_workers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("moodshift.json");
        fs::write(&path, r#"{ "worker_count": 0 }"#).unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file(Path::new("/nonexistent/moodshift.json")).unwrap_err();
        assert!(matches!(err, MoodshiftError::FileNotFound { .. }));
    }

    #[test]
    fn test_with_root_and_ensure_dirs() {
        let dir = tempdir().unwrap();
        let config = Config::with_root(dir.path());
        config.ensure_dirs().unwrap();
        assert!(dir.path().join("uploads").is_dir());
        assert!(dir.path().join("processed_audio").is_dir());
    }
}
