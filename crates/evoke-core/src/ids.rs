//! Subject, run and unit identifiers.
//!
//! BIDS labels are opaque strings, but datasets pad them inconsistently
//! (`"2"`, `"02"`, `"010"`), so ordering always goes through the parsed
//! numeric key and only falls back to the raw label to break ties.

use std::cmp::Ordering;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::errors::{BatchError, ErrorInfo};

fn validate_label(kind: &str, label: &str) -> Result<(), BatchError> {
    if label.is_empty() {
        return Err(BatchError::MalformedUnit(
            ErrorInfo::new(format!("{kind}_empty"), format!("{kind} label is empty")),
        ));
    }
    if !label.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(BatchError::MalformedUnit(
            ErrorInfo::new(
                format!("{kind}_label"),
                format!("{kind} label contains non-alphanumeric characters"),
            )
            .with_context(kind, label),
        ));
    }
    Ok(())
}

fn numeric_key(label: &str) -> Option<u64> {
    let trimmed = label.trim_start_matches('0');
    if trimmed.is_empty() {
        return label.chars().all(|c| c == '0').then_some(0);
    }
    trimmed.parse().ok()
}

fn compare_labels(a: &str, b: &str) -> Ordering {
    match (numeric_key(a), numeric_key(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

macro_rules! label_type {
    ($name:ident, $kind:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validates and wraps a raw BIDS label.
            pub fn new(label: impl Into<String>) -> Result<Self, BatchError> {
                let label = label.into();
                validate_label($kind, &label)?;
                Ok(Self(label))
            }

            /// Returns the label exactly as it appears in the dataset.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Numeric sort key, `None` when the label is not a number.
            pub fn sort_key(&self) -> Option<u64> {
                numeric_key(&self.0)
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                compare_labels(&self.0, &other.0)
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = BatchError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

label_type!(SubjectId, "subject", "Opaque subject label with a numeric sort key.");
label_type!(RunId, "run", "Opaque run label with a numeric sort key.");

/// Unit of dispatch and idempotence: one subject, one task, optionally one run.
///
/// Per-run pipelines carry `Some(run)`; per-subject pipelines that merge every
/// run of a subject carry `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Subject label.
    pub subject: SubjectId,
    /// BIDS task label.
    pub task: String,
    /// Run label for per-run units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<RunId>,
}

impl Unit {
    /// Builds a per-run unit.
    pub fn per_run(subject: SubjectId, task: impl Into<String>, run: RunId) -> Self {
        Self {
            subject,
            task: task.into(),
            run: Some(run),
        }
    }

    /// Builds a per-subject unit.
    pub fn per_subject(subject: SubjectId, task: impl Into<String>) -> Self {
        Self {
            subject,
            task: task.into(),
            run: None,
        }
    }

    /// Positional worker arguments: the subject, then the run when present.
    pub fn worker_args(&self) -> Vec<String> {
        let mut args = vec![self.subject.to_string()];
        if let Some(run) = &self.run {
            args.push(run.to_string());
        }
        args
    }
}

impl Ord for Unit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.subject
            .cmp(&other.subject)
            .then_with(|| self.run.cmp(&other.run))
            .then_with(|| self.task.cmp(&other.task))
    }
}

impl PartialOrd for Unit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}_task-{}", self.subject, self.task)?;
        if let Some(run) = &self.run {
            write!(f, "_run-{run}")?;
        }
        Ok(())
    }
}
