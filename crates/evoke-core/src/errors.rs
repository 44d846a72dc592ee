//! Structured error types shared across evoke crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`BatchError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (subject, run, stage, path, ...).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the operator resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

/// Canonical error type for the evoke batch pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum BatchError {
    /// Dataset metadata could not be parsed into a unit.
    #[error("malformed unit: {0}")]
    MalformedUnit(ErrorInfo),
    /// Mutually exclusive or inconsistent configuration.
    #[error("configuration error: {0}")]
    Configuration(ErrorInfo),
    /// A write without overwrite hit an occupied artifact key.
    #[error("artifact already exists: {0}")]
    AlreadyExists(ErrorInfo),
    /// A pipeline stage failed for one unit.
    #[error("stage failure: {0}")]
    Stage(ErrorInfo),
    /// The execution backend rejected a job submission.
    #[error("submission error: {0}")]
    Submission(ErrorInfo),
    /// A signal transform rejected its input.
    #[error("signal error: {0}")]
    Signal(ErrorInfo),
    /// Filesystem errors.
    #[error("io error: {0}")]
    Io(ErrorInfo),
    /// Serialization and schema errors.
    #[error("serde error: {0}")]
    Serde(ErrorInfo),
}

impl BatchError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            BatchError::MalformedUnit(info)
            | BatchError::Configuration(info)
            | BatchError::AlreadyExists(info)
            | BatchError::Stage(info)
            | BatchError::Submission(info)
            | BatchError::Signal(info)
            | BatchError::Io(info)
            | BatchError::Serde(info) => info,
        }
    }

    /// Returns the stable machine readable code of the payload.
    pub fn code(&self) -> &str {
        &self.info().code
    }

    /// Whether the error must abort the whole batch rather than a single unit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BatchError::Configuration(_))
    }
}
