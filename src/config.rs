//! Configuration loading from TOML files and environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::keeper::Settings;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub keeper: KeeperConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Idle timeout and movement range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeeperConfig {
    /// Seconds without pointer movement before simulation starts.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,
    /// Half-width in pixels of the square a simulated target is picked from.
    #[serde(default = "default_offset_range")]
    pub offset_range: i32,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: default_idle_timeout(),
            offset_range: default_offset_range(),
        }
    }
}

impl KeeperConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }
}

/// Poll intervals and tolerances. Tuning only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_activity_poll_ms")]
    pub activity_poll_ms: u64,
    /// Per-axis pixel change ignored by activity detection.
    #[serde(default = "default_activity_tolerance_px")]
    pub activity_tolerance_px: u32,
    #[serde(default = "default_scheduler_tick_ms")]
    pub scheduler_tick_ms: u64,
    #[serde(default = "default_backoff_min_ms")]
    pub backoff_min_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Delay before a resume request takes effect.
    #[serde(default = "default_resume_grace_ms")]
    pub resume_grace_ms: u64,
    /// Length of one smoothed pointer motion.
    #[serde(default = "default_move_duration_ms")]
    pub move_duration_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            activity_poll_ms: default_activity_poll_ms(),
            activity_tolerance_px: default_activity_tolerance_px(),
            scheduler_tick_ms: default_scheduler_tick_ms(),
            backoff_min_ms: default_backoff_min_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            resume_grace_ms: default_resume_grace_ms(),
            move_duration_ms: default_move_duration_ms(),
        }
    }
}

impl TimingConfig {
    pub fn move_duration(&self) -> Duration {
        Duration::from_millis(self.move_duration_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Data directory for the event journal.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write mode changes and moves to a JSONL journal.
    #[serde(default = "default_journal")]
    pub journal: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            level: default_log_level(),
            journal: default_journal(),
        }
    }
}

impl LoggingConfig {
    /// Returns the journal directory path.
    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

// Default value functions
fn default_idle_timeout() -> u64 {
    5
}

fn default_offset_range() -> i32 {
    100
}

fn default_activity_poll_ms() -> u64 {
    100
}

fn default_activity_tolerance_px() -> u32 {
    5
}

fn default_scheduler_tick_ms() -> u64 {
    1000
}

fn default_backoff_min_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    5000
}

fn default_resume_grace_ms() -> u64 {
    1000
}

fn default_move_duration_ms() -> u64 {
    1000
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".mouse-keeper"))
        .unwrap_or_else(|| PathBuf::from(".mouse-keeper"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_journal() -> bool {
    true
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = config_path {
            Self::from_file(path)?
        } else {
            let default_paths = [
                PathBuf::from("config/default.toml"),
                dirs::config_dir()
                    .map(|d| d.join("mouse-keeper/config.toml"))
                    .unwrap_or_default(),
            ];

            let mut loaded = None;
            for path in &default_paths {
                if path.is_file() {
                    loaded = Some(Self::from_file(path)?);
                    break;
                }
            }
            loaded.unwrap_or_default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.logging.data_dir = expand_tilde(&config.logging.data_dir);

        Ok(config)
    }

    /// Apply `MOUSE_KEEPER_*` overrides looked up through `var`.
    fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = var("MOUSE_KEEPER_IDLE_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.keeper.idle_timeout_seconds = v;
        }
        if let Some(v) = var("MOUSE_KEEPER_OFFSET_RANGE").and_then(|v| v.parse().ok()) {
            self.keeper.offset_range = v;
        }
        if let Some(val) = var("MOUSE_KEEPER_DATA_DIR") {
            self.logging.data_dir = PathBuf::from(val);
        }
        if let Some(val) = var("MOUSE_KEEPER_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.timing.move_duration_ms == 0 {
            anyhow::bail!("Move duration must be greater than 0");
        }
        self.settings().validate()?;
        Ok(())
    }

    /// Core loop settings derived from this configuration.
    pub fn settings(&self) -> Settings {
        Settings {
            idle_timeout: self.keeper.idle_timeout(),
            offset_range: self.keeper.offset_range,
            activity_poll: Duration::from_millis(self.timing.activity_poll_ms),
            activity_tolerance: self.timing.activity_tolerance_px,
            scheduler_tick: Duration::from_millis(self.timing.scheduler_tick_ms),
            backoff_min: Duration::from_millis(self.timing.backoff_min_ms),
            backoff_max: Duration::from_millis(self.timing.backoff_max_ms),
            resume_grace: Duration::from_millis(self.timing.resume_grace_ms),
        }
    }
}

/// Expand ~ to home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.settings(), Settings::default());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
        let config = Config::from_file(path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.settings(), Settings::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[keeper]\nidle_timeout_seconds = 300\n\n[timing]\nactivity_poll_ms = 150\n"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.keeper.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.keeper.offset_range, 100);
        assert_eq!(config.timing.activity_poll_ms, 150);
        assert_eq!(config.timing.activity_tolerance_px, 5);
        assert!(config.logging.journal);
    }

    #[test]
    fn test_negative_timeout_fails_to_parse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[keeper]\nidle_timeout_seconds = -1\n").unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.keeper.idle_timeout_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.keeper.offset_range = -3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.timing.backoff_min_ms = 9000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.timing.move_duration_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "MOUSE_KEEPER_IDLE_TIMEOUT" => Some("600".to_string()),
            "MOUSE_KEEPER_OFFSET_RANGE" => Some("not a number".to_string()),
            "MOUSE_KEEPER_LOG_LEVEL" => Some("debug".to_string()),
            _ => None,
        });

        assert_eq!(config.keeper.idle_timeout_seconds, 600);
        assert_eq!(config.keeper.offset_range, 100);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_expand_tilde() {
        let plain = PathBuf::from("/var/lib/mouse-keeper");
        assert_eq!(expand_tilde(&plain), plain);

        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/data")), home.join("data"));
        }
    }
}
