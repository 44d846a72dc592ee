use evoke_core::{BatchConfig, BatchError, ErpParams, RunId, SubjectId, Unit};
use evoke_index::BidsIndex;
use evoke_pipeline::{
    synthetic, ChannelKind, DecomposedEpochs, EpochSet, ErpPipeline, ErpReport, PipelineExecutor,
    PipelineKind, ReferenceOps, SignalOps, Stage,
};
use evoke_store::serde::{from_bincode_slice, from_json_slice};
use evoke_store::{content_hash, ArtifactStore};
use tempfile::TempDir;

struct Fixture {
    _temp: TempDir,
    config: BatchConfig,
    index: BidsIndex,
    store: ArtifactStore,
}

fn fixture(units: &[(&str, &str)], tweak: impl FnOnce(&mut BatchConfig)) -> Fixture {
    let temp = tempfile::tempdir().expect("tmp dir");
    synthetic::write_dataset(temp.path(), "pitch", units).expect("dataset");
    let mut config = synthetic::config(temp.path());
    tweak(&mut config);
    let index = BidsIndex::new(
        &config.bids_root,
        config.derivatives_root(),
        &config.recording_extension,
    );
    let store = ArtifactStore::new(config.derivatives_root());
    Fixture {
        _temp: temp,
        config,
        index,
        store,
    }
}

fn unit(subject: &str, run: &str) -> Unit {
    Unit::per_run(
        SubjectId::new(subject).expect("subject"),
        "pitch",
        RunId::new(run).expect("run"),
    )
}

struct FailingDecompose;

impl SignalOps for FailingDecompose {
    fn decompose(&self, _epochs: EpochSet, _params: &ErpParams) -> Result<DecomposedEpochs, BatchError> {
        Err(BatchError::Signal(evoke_core::ErrorInfo::new(
            "decompose_diverged",
            "decomposition did not converge",
        )))
    }
}

#[test]
fn erp_writes_terminal_epochs_then_report() {
    let fx = fixture(&[("3", "1")], |_| {});
    let pipeline = ErpPipeline::new(&fx.config, &fx.index, &fx.store, &ReferenceOps);
    let artifact = pipeline.execute(&unit("3", "1")).expect("execute");

    let key = PipelineKind::Erp.terminal_key(&fx.config, &fx.store, &unit("3", "1"));
    assert_eq!(artifact.path, key.path());
    assert!(artifact
        .path
        .ends_with("erp/sub-3/sub-3_task-pitch_run-1_desc-forERP_epo.bin"));

    let bytes = fx.store.read(&key).expect("read epochs");
    assert_eq!(artifact.content_hash, content_hash(&bytes));
    let epochs: EpochSet = from_bincode_slice(&bytes).expect("decode epochs");
    assert!(!epochs.epochs.is_empty());
    assert!(epochs.epochs.len() <= 19);
    assert!(epochs.channels.iter().all(|c| c.kind == ChannelKind::Eeg));
    assert_eq!(epochs.n_times(), 151);

    let report_path = artifact.report.expect("report written");
    let report: ErpReport =
        from_json_slice(&std::fs::read(report_path).expect("read report")).expect("parse report");
    assert_eq!(report.artifact_hash, artifact.content_hash);
    assert_eq!(report.epochs_after, epochs.epochs.len());
    assert!(report.epochs_before >= report.epochs_after);
    assert!(report.noisy_channels.iter().all(|c| c != "leog" && c != "reog"));
}

#[test]
fn repeated_execution_is_deterministic() {
    let first = fixture(&[("5", "2")], |_| {});
    let second = fixture(&[("5", "2")], |_| {});
    let run = |fx: &Fixture| {
        let artifact = ErpPipeline::new(&fx.config, &fx.index, &fx.store, &ReferenceOps)
            .execute(&unit("5", "2"))
            .expect("execute");
        let report: ErpReport = from_json_slice(
            &std::fs::read(artifact.report.expect("report")).expect("read report"),
        )
        .expect("parse report");
        (artifact.content_hash, report)
    };
    let (hash_a, report_a) = run(&first);
    let (hash_b, report_b) = run(&second);

    assert_eq!(hash_a, hash_b);
    assert_eq!(report_a.epochs_after, report_b.epochs_after);
    assert!(!report_a.flagged_components.is_empty());
    assert_eq!(report_a.flagged_components, report_b.flagged_components);
    assert_eq!(report_a.noisy_channels, report_b.noisy_channels);
}

#[test]
fn decompose_failure_leaves_no_terminal_artifact() {
    let fx = fixture(&[("3", "1")], |_| {});
    let pipeline = ErpPipeline::new(&fx.config, &fx.index, &fx.store, &FailingDecompose);
    let failure = pipeline.execute(&unit("3", "1")).expect_err("stage fails");

    assert_eq!(failure.stage, Stage::Decompose);
    assert_eq!(failure.error.code(), "decompose_diverged");
    let key = PipelineKind::Erp.terminal_key(&fx.config, &fx.store, &unit("3", "1"));
    assert!(!fx.store.exists(&key));
    let report = PipelineKind::Erp.report_key(&fx.config, &fx.store, &unit("3", "1"));
    assert!(!fx.store.exists(&report));

    let err = BatchError::from(failure);
    assert!(matches!(err, BatchError::Stage(_)));
    assert_eq!(err.info().context.get("stage").map(String::as_str), Some("decompose"));
    assert_eq!(
        err.info().context.get("unit").map(String::as_str),
        Some("sub-3_task-pitch_run-1")
    );
    assert!(!err.is_fatal());
}

#[test]
fn zero_flagged_components_still_completes() {
    let fx = fixture(&[("4", "1")], |config| config.erp.eog_threshold = 1.0e9);
    let artifact = ErpPipeline::new(&fx.config, &fx.index, &fx.store, &ReferenceOps)
        .execute(&unit("4", "1"))
        .expect("execute");
    let raw = std::fs::read(artifact.report.expect("report")).expect("read report");
    let value: serde_json::Value = serde_json::from_slice(&raw).expect("json");
    assert!(value.get("flagged_components").is_none());
    assert!(value.get("component_scores").is_some());
}

#[test]
fn missing_recording_fails_in_load() {
    let fx = fixture(&[("1", "1")], |_| {});
    let failure = ErpPipeline::new(&fx.config, &fx.index, &fx.store, &ReferenceOps)
        .execute(&unit("9", "1"))
        .expect_err("no recording");
    assert_eq!(failure.stage, Stage::Load);
    assert_eq!(failure.error.code(), "recording_missing");
}

#[test]
fn persist_without_overwrite_refuses_existing_artifact() {
    let fx = fixture(&[("2", "1")], |_| {});
    let pipeline =
        ErpPipeline::new(&fx.config, &fx.index, &fx.store, &ReferenceOps).with_overwrite(false);
    let first = pipeline.execute(&unit("2", "1")).expect("first run");
    let before = std::fs::read(&first.path).expect("read");

    let failure = pipeline.execute(&unit("2", "1")).expect_err("occupied");
    assert_eq!(failure.stage, Stage::Persist);
    assert!(matches!(failure.error, BatchError::AlreadyExists(_)));
    assert_eq!(std::fs::read(&first.path).expect("read"), before);
}

#[test]
fn missing_eog_partner_is_a_rereference_failure() {
    let fx = fixture(&[("6", "1")], |config| {
        config.erp.eog_pairs = vec![evoke_core::ChannelPair::new("leog", "Fp9")];
    });
    let failure = ErpPipeline::new(&fx.config, &fx.index, &fx.store, &ReferenceOps)
        .execute(&unit("6", "1"))
        .expect_err("missing channel");
    assert_eq!(failure.stage, Stage::Rereference);
    assert_eq!(failure.error.code(), "reref_channel_missing");
}
