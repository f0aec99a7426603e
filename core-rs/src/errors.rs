//! Error types for the configuration engine
//!
//! Every failure carries a taxonomy [`ErrorKind`] so callers (the wire layer,
//! the write queue, tests) can pattern-match on what went wrong instead of
//! parsing messages.

use thiserror::Error;

/// Coarse classification of a [`CfgError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Working copy not under version control, or on a disallowed branch
    StructuralVcs,
    /// Pull/push failure, usually connectivity
    TransientVcs,
    /// Schema mismatch, incomplete file set, unknown configuration/component
    Validation,
    /// Delete of active configuration, delete of in-use component, duplicates
    Guard,
    /// A single managed process action failed
    ProcessControl,
    /// Anything else (I/O, serialization, watcher, panics in queued work)
    Unexpected,
}

#[derive(Error, Debug)]
pub enum CfgError {
    #[error("Version control structure error: {0}")]
    StructuralVcs(String),

    #[error("Version control transient error: {0}")]
    TransientVcs(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Guard violation: {0}")]
    Guard(String),

    #[error("Process control error for {process}: {message}")]
    ProcessControl { process: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("Regex error: {0}")]
    RegexError(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl CfgError {
    /// Taxonomy bucket for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            CfgError::StructuralVcs(_) => ErrorKind::StructuralVcs,
            CfgError::TransientVcs(_) => ErrorKind::TransientVcs,
            CfgError::Validation(_) | CfgError::NotFound(_) => ErrorKind::Validation,
            CfgError::Guard(_) => ErrorKind::Guard,
            CfgError::ProcessControl { .. } => ErrorKind::ProcessControl,
            CfgError::Io(_)
            | CfgError::Json(_)
            | CfgError::Yaml(_)
            | CfgError::Watcher(_)
            | CfgError::RegexError(_)
            | CfgError::Unexpected(_) => ErrorKind::Unexpected,
        }
    }

    pub fn process(process: impl Into<String>, message: impl Into<String>) -> Self {
        CfgError::ProcessControl {
            process: process.into(),
            message: message.into(),
        }
    }
}

impl From<regex::Error> for CfgError {
    fn from(err: regex::Error) -> Self {
        CfgError::RegexError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CfgError>;
