//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/countmein/config.toml)
//! 3. Environment variables (COUNTMEIN_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "COUNTMEIN";

/// Longest lifetime a room can be given at once (one year)
pub const MAX_ROOM_TTL_HOURS: u32 = 24 * 365;

/// How queue rewrites reach the document store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Recompute from the local snapshot and overwrite the queue.
    /// Concurrent writers race; the last one wins.
    #[default]
    LastWriterWins,
    /// Recompute from the stored document and write with a version check,
    /// retrying on conflict.
    Versioned,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::LastWriterWins => "last_writer_wins",
            WriteMode::Versioned => "versioned",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last_writer_wins" | "lww" => Ok(WriteMode::LastWriterWins),
            "versioned" | "cas" => Ok(WriteMode::Versioned),
            other => anyhow::bail!(
                "Invalid write mode '{}'. Use 'last_writer_wins' or 'versioned'.",
                other
            ),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for data storage (room documents, host tokens)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Lifetime of a new room, and the default extension
    #[serde(default = "default_room_ttl_hours")]
    pub room_ttl_hours: u32,

    /// How long a notification stays visible
    #[serde(default = "default_notification_ttl_secs")]
    pub notification_ttl_secs: u64,

    /// Queue rewrite strategy
    #[serde(default)]
    pub write_mode: WriteMode,

    /// Attempts for a versioned write before giving up
    #[serde(default = "default_attempts")]
    pub max_write_attempts: u32,

    /// Fresh room codes to try when a code is already taken
    #[serde(default = "default_attempts")]
    pub max_code_attempts: u32,

    /// Polling interval for file-backed subscriptions
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Base URL for shareable join links
    #[serde(default = "default_join_base_url")]
    pub join_base_url: String,

    /// Log file path (logs go to stderr when unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            room_ttl_hours: default_room_ttl_hours(),
            notification_ttl_secs: default_notification_ttl_secs(),
            write_mode: WriteMode::default(),
            max_write_attempts: default_attempts(),
            max_code_attempts: default_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            join_base_url: default_join_base_url(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (COUNTMEIN_DATA_DIR, COUNTMEIN_WRITE_MODE, ...)
    /// 2. Config file (~/.config/countmein/config.toml or COUNTMEIN_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the rest of the program cannot work with
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_ROOM_TTL_HOURS).contains(&self.room_ttl_hours) {
            bail!(
                "room_ttl_hours must be between 1 and {}, got {}",
                MAX_ROOM_TTL_HOURS,
                self.room_ttl_hours
            );
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than 0");
        }
        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        // COUNTMEIN_DATA_DIR
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        // COUNTMEIN_WRITE_MODE
        if let Ok(val) = std::env::var(format!("{}_WRITE_MODE", ENV_PREFIX)) {
            self.write_mode = val
                .parse()
                .with_context(|| format!("Invalid {}_WRITE_MODE", ENV_PREFIX))?;
        }

        // COUNTMEIN_JOIN_BASE_URL
        if let Ok(val) = std::env::var(format!("{}_JOIN_BASE_URL", ENV_PREFIX)) {
            if !val.is_empty() {
                self.join_base_url = val;
            }
        }

        // COUNTMEIN_LOG_FILE
        if let Ok(val) = std::env::var(format!("{}_LOG_FILE", ENV_PREFIX)) {
            self.log_file = if val.is_empty() {
                None
            } else {
                Some(PathBuf::from(val))
            };
        }

        Ok(())
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with COUNTMEIN_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("countmein")
            .join("config.toml")
    }

    /// Directory holding one JSON file per stored document
    pub fn rooms_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }

    /// File remembering which rooms this device hosts
    pub fn host_tokens_path(&self) -> PathBuf {
        self.data_dir.join("host_tokens.json")
    }

    pub fn room_ttl(&self) -> chrono::Duration {
        chrono::Duration::try_hours(i64::from(self.room_ttl_hours))
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_secs(self.notification_ttl_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("countmein")
}

fn default_room_ttl_hours() -> u32 {
    24
}

fn default_notification_ttl_secs() -> u64 {
    5
}

fn default_attempts() -> u32 {
    5
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_join_base_url() -> String {
    "https://countmein.app".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "COUNTMEIN_DATA_DIR",
        "COUNTMEIN_WRITE_MODE",
        "COUNTMEIN_JOIN_BASE_URL",
        "COUNTMEIN_LOG_FILE",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.room_ttl_hours, 24);
        assert_eq!(config.notification_ttl(), Duration::from_secs(5));
        assert_eq!(config.write_mode, WriteMode::LastWriterWins);
        assert!(config.data_dir.ends_with("countmein"));
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();
        assert!(config.rooms_dir().ends_with("documents"));
        assert!(config.host_tokens_path().ends_with("host_tokens.json"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("COUNTMEIN_DATA_DIR", "/tmp/countmein-test");
        config.apply_env_overrides().unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/countmein-test"));
    }

    #[test]
    fn test_env_override_write_mode() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("COUNTMEIN_WRITE_MODE", "versioned");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.write_mode, WriteMode::Versioned);

        env::set_var("COUNTMEIN_WRITE_MODE", "sometimes");
        assert!(config.apply_env_overrides().is_err());
    }

    #[test]
    fn test_env_override_log_file() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("COUNTMEIN_LOG_FILE", "/tmp/countmein.log");
        config.apply_env_overrides().unwrap();
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/countmein.log")));

        // Empty string clears it
        env::set_var("COUNTMEIN_LOG_FILE", "");
        config.apply_env_overrides().unwrap();
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/countmein"),
            write_mode: WriteMode::Versioned,
            room_ttl_hours: 12,
            ..Config::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("write_mode = \"versioned\""));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.write_mode, WriteMode::Versioned);
        assert_eq!(parsed.room_ttl_hours, 12);
    }

    #[test]
    fn test_load_from_str_fills_defaults() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            notification_ttl_secs = 10
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.notification_ttl_secs, 10);
        assert_eq!(config.room_ttl_hours, 24);
        assert_eq!(config.max_code_attempts, 5);
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = Config {
            data_dir: temp_dir.path().join("data"),
            join_base_url: "https://karaoke.example".to_string(),
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.join_base_url, "https://karaoke.example");
        assert!(loaded.data_dir.exists());
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = tempfile::TempDir::new().unwrap();
        env::set_var("COUNTMEIN_DATA_DIR", temp_dir.path().join("data"));

        let path = PathBuf::from("/nonexistent/config.toml");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.write_mode, WriteMode::LastWriterWins);
        assert!(config.data_dir.exists());
    }

    #[test]
    fn test_load_rejects_out_of_range_values() {
        let _guard = EnvGuard::new(ENV_VARS);

        assert!(Config::load_from_str("poll_interval_ms = 0").is_err());
        assert!(Config::load_from_str("room_ttl_hours = 0").is_err());
        assert!(Config::load_from_str("room_ttl_hours = 4294967295").is_err());
        let longest = format!("room_ttl_hours = {}", MAX_ROOM_TTL_HOURS);
        assert!(Config::load_from_str(&longest).is_ok());

        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "poll_interval_ms = 0\n").unwrap();
        env::set_var("COUNTMEIN_DATA_DIR", temp_dir.path().join("data"));
        assert!(Config::load_from_path(&path).is_err());
    }

    #[test]
    fn test_room_ttl_saturates() {
        let config = Config {
            room_ttl_hours: u32::MAX,
            ..Config::default()
        };
        assert_eq!(config.room_ttl(), chrono::Duration::MAX);
    }

    #[test]
    fn test_write_mode_parse() {
        assert_eq!("LWW".parse::<WriteMode>().unwrap(), WriteMode::LastWriterWins);
        assert_eq!(" versioned ".parse::<WriteMode>().unwrap(), WriteMode::Versioned);
        assert!("".parse::<WriteMode>().is_err());
    }
}
