use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::validator::ValidationReport;

/// Pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Config,
    TemplateLoad,
    Resolve,
    Generate,
    Validate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Config => "config",
            Stage::TemplateLoad => "template-load",
            Stage::Resolve => "resolve",
            Stage::Generate => "generate",
            Stage::Validate => "validate",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("template '{key}' not found in template store")]
    TemplateNotFound { key: String },

    #[error("template store {path} is corrupt: {reason}")]
    TemplateStoreCorrupt { path: String, reason: String },

    #[error("template '{key}' references {{{name}}} but no value was supplied")]
    MissingParameter { key: String, name: String },

    #[error("generation backend unavailable for '{key}': {reason}")]
    GenerationUnavailable { key: String, reason: String },

    #[error("generation backend returned an empty script for '{key}'")]
    GenerationEmpty { key: String },

    #[error("validation failed for '{key}': {report}")]
    ValidationFailed { key: String, report: ValidationReport },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn stage(&self) -> Stage {
        match self {
            Error::TemplateNotFound { .. } | Error::TemplateStoreCorrupt { .. } => {
                Stage::TemplateLoad
            }
            Error::MissingParameter { .. } => Stage::Resolve,
            Error::GenerationUnavailable { .. } | Error::GenerationEmpty { .. } => Stage::Generate,
            Error::ValidationFailed { .. } => Stage::Validate,
            Error::Config(_) | Error::Io { .. } => Stage::Config,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
