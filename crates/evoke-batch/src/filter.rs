use std::collections::BTreeSet;

use evoke_core::errors::{BatchError, ErrorInfo};
use evoke_core::{SubjectId, Unit};
use serde::{Deserialize, Serialize};

/// Operator supplied subject filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// When non-empty, only these subjects are considered (`--subs`).
    pub include: Vec<String>,
    /// Subjects the operator opted out (`--skips`).
    pub skip: Vec<String>,
    /// Dispatch even when the terminal artifact exists (`--force`).
    pub force: bool,
}

/// Why a unit was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Subject is known to be defective.
    BadList,
    /// Subject was opted out.
    SkipList,
    /// An include list is active and does not name the subject.
    NotIncluded,
    /// The terminal artifact exists and force is off.
    AlreadyDone,
}

impl SkipReason {
    /// Human readable reason used in logs.
    pub fn describe(self) -> &'static str {
        match self {
            SkipReason::BadList => "subject is on the bad list",
            SkipReason::SkipList => "subject is on the skip list",
            SkipReason::NotIncluded => "subject is not on the include list",
            SkipReason::AlreadyDone => "already done",
        }
    }
}

/// Completion filter verdict for one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "action", content = "reason")]
pub enum Decision {
    /// Submit the unit; `true` when it will replace an existing artifact.
    Dispatch(bool),
    /// Leave the unit alone.
    Skip(SkipReason),
}

fn subject_set(labels: &[String], list: &str) -> Result<BTreeSet<SubjectId>, BatchError> {
    labels
        .iter()
        .map(|label| {
            SubjectId::new(label.clone()).map_err(|_| {
                BatchError::Configuration(
                    ErrorInfo::new("filter_subject", "subject label is not valid")
                        .with_context("list", list)
                        .with_context("subject", label.clone()),
                )
            })
        })
        .collect()
}

/// Validated filter applying the skip/dispatch policy table.
///
/// Precedence: bad list, then skip list, then include list, then the
/// terminal artifact check.
#[derive(Debug, Clone)]
pub struct CompletionFilter {
    bad: BTreeSet<SubjectId>,
    skip: BTreeSet<SubjectId>,
    include: BTreeSet<SubjectId>,
    force: bool,
}

impl CompletionFilter {
    /// Validates the operator filters against the configured bad list.
    ///
    /// A non-empty include list together with a non-empty skip list is a
    /// [`BatchError::Configuration`].
    pub fn new(spec: &FilterSpec, bad_subjects: &[String]) -> Result<Self, BatchError> {
        if !spec.include.is_empty() && !spec.skip.is_empty() {
            return Err(BatchError::Configuration(
                ErrorInfo::new(
                    "filter_exclusive",
                    "include and skip lists are mutually exclusive",
                )
                .with_context("include", spec.include.join(","))
                .with_context("skip", spec.skip.join(","))
                .with_hint("pass either --subs or --skips, not both"),
            ));
        }
        Ok(Self {
            bad: subject_set(bad_subjects, "bad")?,
            skip: subject_set(&spec.skip, "skip")?,
            include: subject_set(&spec.include, "include")?,
            force: spec.force,
        })
    }

    /// Decides one unit. `terminal_exists` is only queried when no list
    /// excludes the subject.
    pub fn decide(&self, unit: &Unit, terminal_exists: impl FnOnce() -> bool) -> Decision {
        if self.bad.contains(&unit.subject) {
            return Decision::Skip(SkipReason::BadList);
        }
        if self.skip.contains(&unit.subject) {
            return Decision::Skip(SkipReason::SkipList);
        }
        if !self.include.is_empty() && !self.include.contains(&unit.subject) {
            return Decision::Skip(SkipReason::NotIncluded);
        }
        match (terminal_exists(), self.force) {
            (true, false) => Decision::Skip(SkipReason::AlreadyDone),
            (exists, _) => Decision::Dispatch(exists),
        }
    }
}
