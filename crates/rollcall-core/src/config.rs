use crate::matcher::DEFAULT_MATCH_THRESHOLD;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("match threshold must be finite and positive, got {0}")]
    InvalidThreshold(f32),
}

/// Runtime configuration: an optional TOML file named by `ROLLCALL_CONFIG`,
/// then `ROLLCALL_*` environment overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Roster text file listing identities and their members.
    pub roster_path: PathBuf,
    /// Directory of `<name>.json` enrollment embeddings.
    pub enroll_dir: PathBuf,
    /// Attendance CSV ledger.
    pub ledger_path: PathBuf,
    /// JSON-lines frame feed produced by the upstream extractor.
    pub feed_path: PathBuf,
    /// Euclidean distance below which a face is accepted.
    pub match_threshold: f32,
    /// Minimum spacing between frames read from the feed; 0 reads as fast as it arrives.
    pub frame_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roster_path: PathBuf::from("info.txt"),
            enroll_dir: PathBuf::from("faces"),
            ledger_path: PathBuf::from("attendance.csv"),
            feed_path: PathBuf::from("frames.jsonl"),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            frame_interval_ms: 0,
        }
    }
}

impl Config {
    /// Load from `ROLLCALL_CONFIG` (if set) and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        let config = base.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `ROLLCALL_*` variables over the current values.
    pub fn with_env_overrides(self) -> Self {
        Self {
            roster_path: env_path("ROLLCALL_ROSTER", self.roster_path),
            enroll_dir: env_path("ROLLCALL_ENROLL_DIR", self.enroll_dir),
            ledger_path: env_path("ROLLCALL_LEDGER", self.ledger_path),
            feed_path: env_path("ROLLCALL_FEED", self.feed_path),
            match_threshold: env_f32("ROLLCALL_MATCH_THRESHOLD", self.match_threshold),
            frame_interval_ms: env_u64("ROLLCALL_FRAME_INTERVAL_MS", self.frame_interval_ms),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.match_threshold.is_finite() || self.match_threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold(self.match_threshold));
        }
        Ok(())
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var(key).map(PathBuf::from).unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.match_threshold, 0.5);
        assert_eq!(config.ledger_path, PathBuf::from("attendance.csv"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml("match_threshold = 0.45\nroster_path = \"team.txt\"\n").unwrap();
        assert_eq!(config.match_threshold, 0.45);
        assert_eq!(config.roster_path, PathBuf::from("team.txt"));
        assert_eq!(config.enroll_dir, PathBuf::from("faces"));
    }

    #[test]
    fn test_wrong_value_type_rejected() {
        assert!(Config::from_toml("match_threshold = \"close\"").is_err());
    }

    #[test]
    fn test_invalid_threshold() {
        let mut config = Config::default();
        config.match_threshold = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold(_))
        ));
        config.match_threshold = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(&path, "ledger_path = \"/var/lib/rollcall/attendance.csv\"\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(
            config.ledger_path,
            PathBuf::from("/var/lib/rollcall/attendance.csv")
        );
    }

    #[test]
    fn test_from_missing_file() {
        assert!(matches!(
            Config::from_file(Path::new("/nonexistent/rollcall.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
