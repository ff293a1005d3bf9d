use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// One of `debug`, `info`, `warn`, `error`. `LOG_LEVEL` overrides it.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Write to this file instead of standard output.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Include the source file and line of each event.
    #[serde(default)]
    pub add_source: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
            file: None,
            add_source: false,
        }
    }
}

impl LogConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.level.as_str() {
            "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(ConfigError::Invalid {
                field: "log level",
                reason: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_level() {
        let config = LogConfig {
            level: "verbose".to_string(),
            ..LogConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(LogConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_unknown_format() {
        let parsed = toml::from_str::<LogConfig>("format = \"xml\"");
        assert!(parsed.is_err());

        let parsed: LogConfig = toml::from_str("format = \"json\"").unwrap();
        assert_eq!(parsed.format, LogFormat::Json);
    }
}
