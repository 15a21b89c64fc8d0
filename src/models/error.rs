//! Error types for pipeline stages and batch results.
//!
//! Stages report failure by returning [`StageError`]; the batch
//! executor translates each one into a [`ProcessingError`] keyed by the
//! failing input. No stage error ever escapes the executor.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure taxonomy surfaced to API clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unreadable file, missing file reference, duplicate filenames.
    Input,
    /// No pipeline registered for the file's extension.
    NoPipeline,
    /// A stage received an item of the wrong kind.
    TypeMismatch,
    /// Downstream service or subprocess failure.
    External,
    /// A bounded wait on an external call elapsed.
    Timeout,
    /// External service returned data that did not fit the schema.
    ParseError,
    /// The caller cancelled the batch.
    Cancelled,
}

/// Error returned by a stage's `process_single`.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("input error: {0}")]
    Input(String),

    #[error("no pipeline registered for extension '{0}'")]
    NoPipeline(String),

    #[error("stage operates on {expected} but received {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("external service error: {0}")]
    External(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(_) | Self::Io(_) => ErrorKind::Input,
            Self::NoPipeline(_) => ErrorKind::NoPipeline,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::External(_) => ErrorKind::External,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Parse(_) => ErrorKind::ParseError,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl From<reqwest::Error> for StageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::External(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// One record per input that failed, keyed to the stage that failed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingError {
    pub kind: ErrorKind,
    /// Human-readable failure message.
    pub exc: String,
    /// Captured backtrace frames at the point of translation.
    #[serde(default)]
    pub traceback: Vec<String>,
    /// Filename (batch key) of the offending input.
    pub file: String,
}

impl ProcessingError {
    /// Translate a stage error into the per-item record, capturing the
    /// current backtrace.
    pub fn from_stage_error(err: &StageError, file: impl Into<String>) -> Self {
        let traceback = std::backtrace::Backtrace::force_capture()
            .to_string()
            .lines()
            .map(str::to_string)
            .collect();
        Self {
            kind: err.kind(),
            exc: err.to_string(),
            traceback,
            file: file.into(),
        }
    }

    /// A record without a backtrace, for failures detected outside any
    /// stage (unknown extension, duplicate filenames).
    pub fn new(kind: ErrorKind, exc: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            kind,
            exc: exc.into(),
            traceback: Vec::new(),
            file: file.into(),
        }
    }
}
