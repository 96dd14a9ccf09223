use std::path::PathBuf;
use thiserror::Error;

use crate::sourcemap::SourceMapError;
use crate::synthesize::PolicyError;

/// Core error type for depsuite operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Source map rejected: {0}")]
    SourceMap(#[from] SourceMapError),

    #[error("Override policy failed: {0}")]
    Policy(#[from] PolicyError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
