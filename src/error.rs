//! Typed errors for style extraction and mapping document handling.
//!
//! Style errors are scoped to a single file: they drop that file's
//! contribution and nothing else. Mapping errors abort the whole run.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StyleError {
    #[error("{path:?} must be a .sld file")]
    Format { path: PathBuf },

    #[error("reading style {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed XML in {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("undecodable rule fragment: {message}")]
    Rule { message: String },
}

impl StyleError {
    /// Attaches a file path to a parse error raised on an in-memory fragment.
    pub(crate) fn with_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            StyleError::Parse { message, .. } => StyleError::Parse {
                path: path.into(),
                message,
            },
            other => other,
        }
    }
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("mapping file {path:?} must be a .json, .yaml or .yml file")]
    UnsupportedFormat { path: PathBuf },

    #[error("reading or writing mapping file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON mapping document")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML mapping document")]
    Yaml(#[from] serde_yaml::Error),

    #[error("table '{table}' is not defined in the mapping")]
    UnknownTable { table: String },

    #[error("generalized table '{table}' has an invalid source chain: {reason}")]
    InvalidGeneralizedSource { table: String, reason: String },
}
