use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure category. Callers branch on this, never on `message` text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid settings or missing provider credentials.
    Configuration,
    /// A snapshot, chunk file or source document does not exist.
    NotFound,
    /// A snapshot exists but cannot be decoded. Never reported as `NotFound`.
    CorruptState,
    /// Embedding or context-generation call failed or timed out.
    Provider,
    /// Search invoked on a store holding no vectors.
    EmptyIndex,
    /// A single record in a bulk file failed to parse.
    MalformedRecord,
    /// Caller-supplied argument out of range (e.g. `k == 0`).
    InvalidInput,
    /// Local filesystem failure unrelated to snapshot content.
    Io,
}

/// Single structured error shape used across all crates and surfaced by the CLI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub details: Option<String>,
    pub retryable: bool,
}

impl AppError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(details) = self.details.as_deref() {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}
