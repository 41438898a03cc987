//! # Configuration
//!
//! IDE settings loaded from JSON. Every field has a default, so an empty
//! object is a valid configuration.

use crate::board::{BoardRegistry, DEFAULT_BOARD};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides [`IdeConfig::arduino_cli`] when set.
pub const ARDUINO_CLI_ENV: &str = "LONGBOARD_ARDUINO_CLI";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdeConfig {
    /// Board selected for new projects
    pub default_board: String,
    /// Path or name of the `arduino-cli` executable
    pub arduino_cli: String,
    /// Sketch folder and file stem; the toolchain requires both to match
    pub sketch_name: String,
    /// Parent directory for the sketch folder, OS temp dir when unset
    pub sketch_root: Option<PathBuf>,
    pub monitor_baud_rate: u32,
}

impl Default for IdeConfig {
    fn default() -> Self {
        Self {
            default_board: DEFAULT_BOARD.to_string(),
            arduino_cli: "arduino-cli".to_string(),
            sketch_name: "longboard_sketch".to_string(),
            sketch_root: None,
            monitor_baud_rate: 9600,
        }
    }
}

impl IdeConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validated()
    }

    /// Load from a JSON file, then apply environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        tracing::debug!("[CONFIG] Loaded {}", path.display());
        Ok(Self::from_json_str(&text)?.with_env_overrides())
    }

    /// Apply environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(cli) = std::env::var(ARDUINO_CLI_ENV) {
            if !cli.trim().is_empty() {
                tracing::debug!("[CONFIG] {} overrides arduino-cli path", ARDUINO_CLI_ENV);
                self.arduino_cli = cli;
            }
        }
        self
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if !BoardRegistry::builtin().contains(&self.default_board) {
            return Err(ConfigError::UnknownBoard(self.default_board));
        }
        Ok(self)
    }

    /// Folder holding the generated sketch.
    pub fn sketch_dir(&self) -> PathBuf {
        self.sketch_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(&self.sketch_name)
    }

    /// Path of the `.ino` file inside [`IdeConfig::sketch_dir`].
    pub fn sketch_file(&self) -> PathBuf {
        self.sketch_dir().join(format!("{}.ino", self.sketch_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        assert_eq!(IdeConfig::from_json_str("{}").unwrap(), IdeConfig::default());
    }

    #[test]
    fn test_partial_config() {
        let config = IdeConfig::from_json_str(
            r#"{"default_board": "esp32", "sketch_root": "/tmp/lb", "monitor_baud_rate": 115200}"#,
        )
        .unwrap();
        assert_eq!(config.default_board, "esp32");
        assert_eq!(config.monitor_baud_rate, 115200);
        assert_eq!(config.arduino_cli, "arduino-cli");
        assert_eq!(
            config.sketch_file(),
            PathBuf::from("/tmp/lb/longboard_sketch/longboard_sketch.ino")
        );
    }

    #[test]
    fn test_unknown_default_board() {
        assert!(matches!(
            IdeConfig::from_json_str(r#"{"default_board": "mega"}"#),
            Err(ConfigError::UnknownBoard(_))
        ));
    }

    #[test]
    fn test_env_overrides_cli_path() {
        std::env::set_var(ARDUINO_CLI_ENV, "/opt/arduino/arduino-cli");
        let config = IdeConfig::default().with_env_overrides();
        assert_eq!(config.arduino_cli, "/opt/arduino/arduino-cli");

        std::env::set_var(ARDUINO_CLI_ENV, "   ");
        assert_eq!(IdeConfig::default().with_env_overrides().arduino_cli, "arduino-cli");

        std::env::remove_var(ARDUINO_CLI_ENV);
        assert_eq!(IdeConfig::default().with_env_overrides(), IdeConfig::default());
    }

    #[test]
    fn test_malformed_config() {
        assert!(matches!(
            IdeConfig::from_json_str("{\"monitor_baud_rate\": \"fast\"}"),
            Err(ConfigError::Parse(_))
        ));
    }
}
