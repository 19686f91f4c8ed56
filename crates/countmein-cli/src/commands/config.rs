//! Config command handlers

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use countmein_core::{Config, WriteMode, MAX_ROOM_TTL_HOURS};

use crate::output::{Output, OutputFormat};

/// Show current configuration
pub fn show(config_path: Option<&PathBuf>, output: &Output) -> Result<()> {
    let config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "room_ttl_hours": config.room_ttl_hours,
                    "notification_ttl_secs": config.notification_ttl_secs,
                    "write_mode": config.write_mode,
                    "max_write_attempts": config.max_write_attempts,
                    "max_code_attempts": config.max_code_attempts,
                    "poll_interval_ms": config.poll_interval_ms,
                    "join_base_url": config.join_base_url,
                    "log_file": config.log_file
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            let effective_path = config_path
                .cloned()
                .unwrap_or_else(Config::config_file_path);
            println!("Configuration:");
            println!("  data_dir:              {}", config.data_dir.display());
            println!("  room_ttl_hours:        {}", config.room_ttl_hours);
            println!("  notification_ttl_secs: {}", config.notification_ttl_secs);
            println!("  write_mode:            {}", config.write_mode);
            println!("  max_write_attempts:    {}", config.max_write_attempts);
            println!("  max_code_attempts:     {}", config.max_code_attempts);
            println!("  poll_interval_ms:      {}", config.poll_interval_ms);
            println!("  join_base_url:         {}", config.join_base_url);
            println!(
                "  log_file:              {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", effective_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(
    key: String,
    value: String,
    config_path: Option<&PathBuf>,
    output: &Output,
) -> Result<()> {
    let mut config =
        Config::load_with_cli_override(config_path).context("Failed to load configuration")?;

    apply(&mut config, &key, &value)?;
    config.validate()?;

    // Save to the CLI-specified path or default
    let save_path = config_path
        .cloned()
        .unwrap_or_else(Config::config_file_path);
    config
        .save_to_path(&save_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => {
            config.data_dir = value.into();
        }
        "room_ttl_hours" => {
            let hours = parse_positive(key, value)?;
            if hours > MAX_ROOM_TTL_HOURS {
                bail!("room_ttl_hours can be at most {}", MAX_ROOM_TTL_HOURS);
            }
            config.room_ttl_hours = hours;
        }
        "notification_ttl_secs" => {
            config.notification_ttl_secs = value
                .parse()
                .with_context(|| format!("Invalid value for {}. Use a number of seconds.", key))?;
        }
        "write_mode" => {
            config.write_mode = value.parse::<WriteMode>()?;
        }
        "max_write_attempts" => {
            config.max_write_attempts = parse_positive(key, value)?;
        }
        "max_code_attempts" => {
            config.max_code_attempts = parse_positive(key, value)?;
        }
        "poll_interval_ms" => {
            let ms: u64 = value
                .parse()
                .with_context(|| format!("Invalid value for {}. Use milliseconds.", key))?;
            if ms == 0 {
                bail!("poll_interval_ms must be greater than 0");
            }
            config.poll_interval_ms = ms;
        }
        "join_base_url" => {
            if value.is_empty() {
                bail!("join_base_url cannot be empty");
            }
            config.join_base_url = value.to_string();
        }
        "log_file" => {
            config.log_file = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.into())
            };
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: data_dir, room_ttl_hours, notification_ttl_secs, write_mode, \
                 max_write_attempts, max_code_attempts, poll_interval_ms, join_base_url, log_file",
                key
            );
        }
    }
    Ok(())
}

fn parse_positive(key: &str, value: &str) -> Result<u32> {
    let n: u32 = value
        .parse()
        .with_context(|| format!("Invalid value for {}. Use a whole number.", key))?;
    if n == 0 {
        bail!("{} must be at least 1", key);
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_known_keys() {
        let mut config = Config::default();

        apply(&mut config, "write_mode", "versioned").unwrap();
        apply(&mut config, "room_ttl_hours", "6").unwrap();
        apply(&mut config, "join_base_url", "https://karaoke.example").unwrap();
        apply(&mut config, "log_file", "/tmp/countmein.log").unwrap();

        assert_eq!(config.write_mode, WriteMode::Versioned);
        assert_eq!(config.room_ttl_hours, 6);
        assert_eq!(config.join_base_url, "https://karaoke.example");
        assert_eq!(config.log_file, Some(PathBuf::from("/tmp/countmein.log")));

        apply(&mut config, "log_file", "none").unwrap();
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = Config::default();

        assert!(apply(&mut config, "room_ttl_hours", "0").is_err());
        assert!(apply(&mut config, "room_ttl_hours", "4294967295").is_err());
        assert!(apply(&mut config, "max_code_attempts", "many").is_err());
        assert!(apply(&mut config, "poll_interval_ms", "0").is_err());
        assert!(apply(&mut config, "write_mode", "eventually").is_err());
        assert!(apply(&mut config, "theme", "dark").is_err());
    }

    #[test]
    fn test_set_writes_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        Config {
            data_dir: temp_dir.path().join("data"),
            ..Config::default()
        }
        .save_to_path(&path)
        .unwrap();

        let output = Output::new(OutputFormat::Quiet, "https://countmein.app");
        set("max_write_attempts".into(), "9".into(), Some(&path), &output).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("max_write_attempts = 9"));
    }
}
