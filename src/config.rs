//! Run configuration read from the YAML config file.
//!
//! Every key is optional here; command-line flags fill or override values,
//! and the diagnostic reports keys that are missing.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Keys the diagnostic expects to find in the config file.
pub const EXPECTED_KEYS: [&str; 6] = [
    "general_topic",
    "time",
    "intro_video",
    "pexels_api",
    "language",
    "multi_speaker",
];

pub const DEFAULT_LANGUAGE: &str = "English";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    pub general_topic: Option<String>,
    pub time: Option<u32>,
    pub intro_video: Option<String>,
    pub pexels_api: Option<String>,
    pub language: Option<String>,
    pub multi_speaker: Option<bool>,
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        debug!("Loaded run configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Loads `path` if it exists, otherwise returns an empty configuration.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No config file at {}; using flags only", path.display());
            Ok(Self::default())
        }
    }

    pub fn language(&self) -> &str {
        self.language.as_deref().unwrap_or(DEFAULT_LANGUAGE)
    }

    pub fn multi_speaker(&self) -> bool {
        self.multi_speaker.unwrap_or(false)
    }

    /// An explicit command-line choice wins over the file, either way.
    pub fn multi_speaker_with(&self, flag: Option<bool>) -> bool {
        flag.unwrap_or_else(|| self.multi_speaker())
    }
}

/// Which of [`EXPECTED_KEYS`] are absent from the raw YAML document.
pub fn missing_keys(yaml: &str) -> std::result::Result<Vec<&'static str>, serde_yaml::Error> {
    let doc: serde_yaml::Value = if yaml.trim().is_empty() {
        serde_yaml::Value::Null
    } else {
        serde_yaml::from_str(yaml)?
    };
    Ok(EXPECTED_KEYS
        .into_iter()
        .filter(|key| doc.get(*key).is_none_or(|v| v.is_null()))
        .collect())
}
