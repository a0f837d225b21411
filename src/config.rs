use crate::error::YummyError;
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::Path,
    time::Duration,
};

fn default_debounce_ms() -> u64 {
    500
}

fn default_settle_delay_ms() -> u64 {
    10
}

fn default_flash_ms() -> u64 {
    500
}

fn default_keyword_max_chars() -> usize {
    15
}

fn default_content_root() -> String {
    "main".to_string()
}

/// Tunables for the annotation engine. Every field has a default, so an empty TOML document (or
/// a missing config file) yields a working configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Quiescence window of the change feed.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Wait after a text-selection event so the host's own selection handling finishes first.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// How long governed descendants keep the flash marker after a first heading click.
    #[serde(default = "default_flash_ms")]
    pub flash_ms: u64,
    /// Highlights at or under this many characters are collected as keywords, longer ones as
    /// sentences.
    #[serde(default = "default_keyword_max_chars")]
    pub keyword_max_chars: usize,
    /// Tag of the host container that bounds acceptable selections.
    #[serde(default = "default_content_root")]
    pub content_root: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            debounce_ms: default_debounce_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            flash_ms: default_flash_ms(),
            keyword_max_chars: default_keyword_max_chars(),
            content_root: default_content_root(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, YummyError> {
        let config: EngineConfig = toml::from_str(content)?;
        if config.content_root.trim().is_empty() {
            return Err(YummyError::Config(
                "content_root must name a container tag".to_string(),
            ));
        }
        Ok(config)
    }

    /// Reads the configuration at `path`, falling back to defaults when the file does not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, YummyError> {
        let path = path.as_ref();
        tracing::debug!("Attempting to read engine config from: {:?}", path);
        if !path.exists() {
            tracing::debug!("Config file not found, using defaults.");
            return Ok(EngineConfig::default());
        }
        let content = read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), YummyError> {
        tracing::debug!("Attempting to write engine config to: {:?}", path.as_ref());
        let toml_string = toml::to_string(self)?;
        write(path, toml_string)?;
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn flash(&self) -> Duration {
        Duration::from_millis(self.flash_ms)
    }
}
