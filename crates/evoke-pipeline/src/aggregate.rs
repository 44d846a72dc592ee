//! Group-level evoked averages over every subject's cleaned epochs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use evoke_core::errors::{BatchError, ErrorInfo};
use evoke_core::{BatchConfig, SubjectId};
use evoke_index::DatasetIndex;
use evoke_store::serde::from_bincode_slice;
use evoke_store::{ArtifactKey, ArtifactStore};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::epochs::EpochSet;

fn aggregate_error(code: &str, err: impl ToString) -> BatchError {
    BatchError::Io(ErrorInfo::new(code, err.to_string()))
}

#[derive(Debug, Serialize)]
struct EvokedRow<'a> {
    sub: &'a str,
    condition: &'a str,
    chan: &'a str,
    msec: f64,
    #[serde(rename = "uV")]
    microvolts: f64,
}

/// Outcome of an aggregate pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSummary {
    /// Group output file.
    pub path: PathBuf,
    /// Subjects contributing rows, in numeric order.
    pub subjects: Vec<SubjectId>,
    /// Epoch files skipped by the channel-count check or a layout mismatch.
    pub skipped: Vec<String>,
    /// CSV rows written, header excluded.
    pub rows: usize,
}

fn load_subject(
    config: &BatchConfig,
    store: &ArtifactStore,
    keys: &[ArtifactKey],
    skipped: &mut Vec<String>,
) -> Result<Option<EpochSet>, BatchError> {
    let mut runs = Vec::with_capacity(keys.len());
    for key in keys {
        let set: EpochSet = from_bincode_slice(&store.read(key)?)?;
        if let Some(expected) = config.aggregate.expected_channels {
            if set.channels.len() != expected {
                warn!(
                    path = %key.path().display(),
                    expected,
                    found = set.channels.len(),
                    "skipping epochs with unexpected channel count"
                );
                skipped.push(key.file_name());
                continue;
            }
        }
        runs.push(set);
    }
    if runs.is_empty() {
        return Ok(None);
    }
    match EpochSet::concatenate(runs) {
        Ok(set) => Ok(Some(set)),
        Err(err) => {
            warn!(error = %err, "skipping subject with inconsistent runs");
            skipped.extend(keys.iter().map(ArtifactKey::file_name));
            Ok(None)
        }
    }
}

/// Averages each condition per subject and channel and writes one CSV.
pub struct AggregatePipeline<'a> {
    config: &'a BatchConfig,
    index: &'a dyn DatasetIndex,
    store: &'a ArtifactStore,
    threads: usize,
}

struct LoadedSubject {
    subject: SubjectId,
    set: Option<EpochSet>,
    skipped: Vec<String>,
}

impl<'a> AggregatePipeline<'a> {
    /// Creates the pipeline.
    pub fn new(config: &'a BatchConfig, index: &'a dyn DatasetIndex, store: &'a ArtifactStore) -> Self {
        Self {
            config,
            index,
            store,
            threads: 0,
        }
    }

    /// Worker threads used to load subjects; `0` lets rayon decide.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    fn subject_runs(&self) -> Result<BTreeMap<SubjectId, Vec<ArtifactKey>>, BatchError> {
        let erp = &self.config.erp;
        let mut grouped: BTreeMap<SubjectId, Vec<ArtifactKey>> = BTreeMap::new();
        for key in self
            .index
            .derivative_keys(&erp.derivative, &erp.description, &erp.suffix)?
        {
            if key.task.as_deref() != Some(self.config.task.as_str()) {
                continue;
            }
            grouped.entry(key.subject.clone()).or_default().push(key);
        }
        Ok(grouped)
    }

    fn load_subjects(&self) -> Result<Vec<LoadedSubject>, BatchError> {
        let grouped: Vec<_> = self.subject_runs()?.into_iter().collect();
        let (config, store) = (self.config, self.store);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|err| aggregate_error("thread_pool", err))?;

        // indexed collect keeps subjects in numeric order
        pool.install(|| {
            grouped
                .into_par_iter()
                .map(|(subject, keys)| -> Result<LoadedSubject, BatchError> {
                    let mut skipped = Vec::new();
                    let set = load_subject(config, store, &keys, &mut skipped)?;
                    Ok(LoadedSubject {
                        subject,
                        set,
                        skipped,
                    })
                })
                .collect()
        })
    }

    /// Writes `sub, condition, chan, msec, uV` rows to the group key.
    pub fn run(&self) -> Result<AggregateSummary, BatchError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        let mut subjects = Vec::new();
        let mut skipped = Vec::new();
        let mut rows = 0;

        for loaded in self.load_subjects()? {
            skipped.extend(loaded.skipped);
            let Some(set) = loaded.set else {
                continue;
            };
            let subject = loaded.subject;
            let conditions: BTreeSet<&str> = set.epochs.iter().map(|e| e.label.as_str()).collect();
            let mut contributed = false;
            for condition in conditions {
                let members: Vec<_> = set.epochs.iter().filter(|e| e.label == condition).collect();
                for channel in &self.config.aggregate.channels {
                    let Some(idx) = set.channel_index(channel) else {
                        continue;
                    };
                    for k in 0..set.n_times() {
                        let volts = members.iter().map(|e| e.data[idx][k]).sum::<f64>()
                            / members.len() as f64;
                        writer
                            .serialize(EvokedRow {
                                sub: subject.as_str(),
                                condition,
                                chan: channel,
                                msec: (set.time_at(k) * 1.0e6).round() / 1.0e3,
                                microvolts: volts * 1.0e6,
                            })
                            .map_err(|err| aggregate_error("aggregate_csv", err))?;
                        rows += 1;
                        contributed = true;
                    }
                }
            }
            if contributed {
                subjects.push(subject);
            }
        }

        if rows == 0 {
            return Err(BatchError::Io(
                ErrorInfo::new("aggregate_empty", "no epochs to aggregate")
                    .with_hint("run the erp pipeline first"),
            ));
        }
        let payload = writer
            .into_inner()
            .map_err(|err| aggregate_error("aggregate_csv", err))?;
        let key = self.store.group_key(
            &self.config.erp.derivative,
            &self.config.aggregate.description,
            "ave",
            "csv",
        );
        let path = self.store.write_group(&key, &payload)?;
        info!(path = %path.display(), subjects = subjects.len(), rows, "group average written");
        Ok(AggregateSummary {
            path,
            subjects,
            skipped,
            rows,
        })
    }
}
