//! Configuration for rune-inline
//!
//! Settings are loaded from `rune.toml`, with environment variables taking
//! precedence for one-off overrides.

use rune_critical::{CriticalOptions, PreloadMode};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RuneConfig {
    /// Logging settings
    pub logging: LoggingConfig,
    /// Critical CSS options, keyed the way the inliner's options are named
    /// (`pruneSource`, `inlineThreshold`, ...)
    pub critical: CriticalOptions,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset: an `EnvFilter` directive such
    /// as `info` or `rune_critical=debug`, or `silent` to disable output.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Filter directive for the subscriber.
    pub fn filter(&self) -> &str {
        match self.level.trim() {
            "silent" => "off",
            "" => "info",
            level => level,
        }
    }
}

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

impl RuneConfig {
    /// Load configuration from a TOML file
    ///
    /// # Returns
    /// * `Ok(RuneConfig)` - Successfully loaded configuration
    /// * `Err(String)` - Error message if loading failed
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    /// Load configuration from rune.toml in the current directory, or the
    /// defaults if it doesn't exist
    pub fn load_or_default() -> Self {
        Self::load_from_file("rune.toml").unwrap_or_default()
    }

    /// Merge configuration with environment variables
    ///
    /// Environment variables take precedence over configuration file values.
    /// Unparseable numeric or mode values are ignored.
    pub fn merge_with_env(&mut self) {
        if let Ok(path) = std::env::var("RUNE_CRITICAL_PATH") {
            self.critical.path = path;
        }
        if let Ok(public_path) = std::env::var("RUNE_CRITICAL_PUBLIC_PATH") {
            self.critical.public_path = public_path;
        }
        if let Ok(val) = std::env::var("RUNE_CRITICAL_PRELOAD") {
            if let Ok(mode) = val.parse::<PreloadMode>() {
                self.critical.preload = mode;
            }
        }
        if let Ok(val) = std::env::var("RUNE_CRITICAL_PRUNE_SOURCE") {
            self.critical.prune_source = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("RUNE_CRITICAL_COMPRESS") {
            self.critical.compress = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("RUNE_CRITICAL_INLINE_THRESHOLD") {
            if let Ok(threshold) = val.parse::<usize>() {
                self.critical.inline_threshold = threshold;
            }
        }

        if let Ok(level) = std::env::var("RUNE_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Load configuration with environment variable overrides
    ///
    /// 1. Load from `path`, or rune.toml (defaults if not found)
    /// 2. Override with environment variables if present
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_or_default(),
        };
        config.merge_with_env();
        Ok(config)
    }
}
