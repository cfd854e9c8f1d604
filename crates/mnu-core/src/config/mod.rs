//! Configuration management for mnu.
//!
//! The configuration lives next to the rest of the per-user state in
//! `~/.config/mnu/config.toml`. A default file is written the first time
//! it is loaded.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mnu_core::{config::Config, state::StateDir};
//!
//! let state = StateDir::resolve()?;
//! let config = Config::load(&state)?;
//! println!("Clearing after {:?}", config.clipboard.clear_after);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::state::StateDir;

/// Default time a secret stays on the clipboard.
pub const DEFAULT_CLEAR_AFTER: Duration = Duration::from_secs(15);

/// Main configuration struct for mnu.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Clipboard settings
    pub clipboard: ClipboardConfig,
    /// Vault backend settings
    pub vault: VaultConfig,
}

/// Clipboard configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardConfig {
    /// How long a copied secret stays on the clipboard
    #[serde(with = "humantime_serde")]
    pub clear_after: Duration,
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            clear_after: DEFAULT_CLEAR_AFTER,
        }
    }
}

/// Vault backend configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Talk to a shared `bw serve` backend instead of running the CLI per request
    pub api_mode: bool,
    /// Backend executable
    pub backend: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            api_mode: true,
            backend: "bw".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the state directory.
    ///
    /// If the file doesn't exist, the defaults are written there and returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(state: &StateDir) -> Result<Self> {
        let path = state.config_file();
        if !path.exists() {
            let config = Self::default();
            if let Err(e) = config.save_to(&path) {
                tracing::warn!("Could not write default config: {}", e);
            }
            return Ok(config);
        }
        Self::load_from(&path)
    }

    /// Load configuration from an explicit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to the state directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    pub fn save(&self, state: &StateDir) -> Result<()> {
        self.save_to(&state.config_file())
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| Error::ConfigError(format!("Failed to write config: {e}")))
    }
}

/// Serde adapter for durations written as `"15s"`, `"2m"` or `"1h"`.
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as whole seconds with an `s` suffix.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}s", duration.as_secs()))
    }

    /// Deserialize from a string with an `s`, `m` or `h` suffix.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid duration '{s}'")))
    }
}

/// Parse a duration string like `"15s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (num, unit) = match s.char_indices().last()? {
        (i, c) if c.is_ascii_alphabetic() => (&s[..i], c),
        _ => (s, 's'),
    };
    let num: u64 = num.parse().ok()?;
    let secs = match unit {
        's' => num,
        'm' => num.checked_mul(60)?,
        'h' => num.checked_mul(3600)?,
        _ => return None,
    };
    Some(Duration::from_secs(secs))
}
