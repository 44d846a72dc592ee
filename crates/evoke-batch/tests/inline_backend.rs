use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use evoke_batch::{run_batch, FilterSpec, InlineBackend, SkipReason};
use evoke_core::{BatchConfig, BatchError, ErpParams, ErrorInfo, RunId, SubjectId, Unit};
use evoke_index::BidsIndex;
use evoke_pipeline::{
    synthetic, DecomposedEpochs, EpochSet, LoadedRecording, PipelineKind, ReferenceOps, SignalOps,
};
use evoke_store::ArtifactStore;

#[derive(Default)]
struct ProbeOps {
    fail_subject: Option<&'static str>,
    current: Mutex<Option<String>>,
    loads: AtomicUsize,
}

impl ProbeOps {
    fn failing_for(subject: &'static str) -> Self {
        Self {
            fail_subject: Some(subject),
            ..Self::default()
        }
    }
}

impl SignalOps for ProbeOps {
    fn load(&self, unit: &Unit, path: &Path) -> Result<LoadedRecording, BatchError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        *self.current.lock().expect("lock") = Some(unit.subject.to_string());
        ReferenceOps.load(unit, path)
    }

    fn decompose(&self, epochs: EpochSet, params: &ErpParams) -> Result<DecomposedEpochs, BatchError> {
        let current = self.current.lock().expect("lock").clone();
        if current.is_some() && current.as_deref() == self.fail_subject {
            return Err(BatchError::Signal(ErrorInfo::new(
                "decompose_diverged",
                "decomposition did not converge",
            )));
        }
        ReferenceOps.decompose(epochs, params)
    }
}

fn dataset(units: &[(&str, &str)]) -> (tempfile::TempDir, BatchConfig, BidsIndex, ArtifactStore) {
    let temp = tempfile::tempdir().expect("tmp dir");
    synthetic::write_dataset(temp.path(), "pitch", units).expect("dataset");
    let config = synthetic::config(temp.path());
    let index = BidsIndex::new(&config.bids_root, config.derivatives_root(), "json");
    let store = ArtifactStore::new(config.derivatives_root());
    (temp, config, index, store)
}

fn unit(subject: &str) -> Unit {
    Unit::per_run(
        SubjectId::new(subject).expect("subject"),
        "pitch",
        RunId::new("1").expect("run"),
    )
}

#[test]
fn stage_failure_is_isolated_to_its_unit() {
    let (_temp, config, index, store) = dataset(&[("3", "1"), ("4", "1")]);
    let ops = ProbeOps::failing_for("3");
    let backend = InlineBackend::new(&config, &index, &store, &ops);

    let report = run_batch(
        PipelineKind::Erp,
        &config,
        &FilterSpec::default(),
        &index,
        &store,
        &backend,
    )
    .expect("batch");

    assert_eq!(report.failed.len(), 1);
    let failed = &report.failed[0];
    assert_eq!(failed.unit, unit("3"));
    assert_eq!(failed.error.code(), "inline_stage_failed");
    assert_eq!(
        failed.error.info().context.get("stage").map(String::as_str),
        Some("decompose")
    );
    let key = PipelineKind::Erp.terminal_key(&config, &store, &unit("3"));
    assert!(!store.exists(&key));

    assert_eq!(report.dispatched_units(), vec![&unit("4")]);
    let key = PipelineKind::Erp.terminal_key(&config, &store, &unit("4"));
    assert!(store.exists(&key));
}

#[test]
fn second_pass_runs_no_stage_and_keeps_bytes() {
    let (_temp, config, index, store) = dataset(&[("1", "1"), ("2", "1")]);
    let first_ops = ProbeOps::default();
    let first = run_batch(
        PipelineKind::Erp,
        &config,
        &FilterSpec::default(),
        &index,
        &store,
        &InlineBackend::new(&config, &index, &store, &first_ops),
    )
    .expect("first pass");
    assert_eq!(first.dispatched.len(), 2);
    assert_eq!(first_ops.loads.load(Ordering::SeqCst), 2);
    let key = PipelineKind::Erp.terminal_key(&config, &store, &unit("1"));
    let before = store.read(&key).expect("read");

    let second_ops = ProbeOps::default();
    let second = run_batch(
        PipelineKind::Erp,
        &config,
        &FilterSpec::default(),
        &index,
        &store,
        &InlineBackend::new(&config, &index, &store, &second_ops),
    )
    .expect("second pass");
    assert!(second.dispatched.is_empty());
    assert_eq!(second_ops.loads.load(Ordering::SeqCst), 0);
    assert!(second
        .skipped
        .iter()
        .all(|s| s.reason == SkipReason::AlreadyDone));
    assert_eq!(store.read(&key).expect("read"), before);
}

#[test]
fn microstates_follow_completed_erp_units() {
    let (_temp, config, index, store) = dataset(&[("1", "1"), ("1", "2"), ("2", "1")]);
    let ops = ProbeOps::failing_for("2");
    let backend = InlineBackend::new(&config, &index, &store, &ops);
    run_batch(
        PipelineKind::Erp,
        &config,
        &FilterSpec::default(),
        &index,
        &store,
        &backend,
    )
    .expect("erp pass");

    let report = run_batch(
        PipelineKind::Microstates,
        &config,
        &FilterSpec::default(),
        &index,
        &store,
        &backend,
    )
    .expect("microstate pass");
    let subjects: Vec<String> = report
        .dispatched
        .iter()
        .map(|d| d.unit.subject.to_string())
        .collect();
    assert_eq!(subjects, vec!["1"]);
    assert!(report.dispatched[0].unit.run.is_none());
}
