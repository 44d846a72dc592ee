use evoke_core::{BatchConfig, BatchError, RunId, SubjectId, Unit};
use evoke_index::BidsIndex;
use evoke_pipeline::{
    synthetic, AggregatePipeline, ChannelInfo, ChannelKind, Epoch, EpochSet, ErpPipeline,
    PipelineExecutor, PipelineKind, ReferenceOps,
};
use evoke_store::serde::to_bincode_bytes;
use evoke_store::ArtifactStore;

fn unit(subject: &str, run: &str) -> Unit {
    Unit::per_run(
        SubjectId::new(subject).expect("subject"),
        "pitch",
        RunId::new(run).expect("run"),
    )
}

fn write_narrow_epochs(config: &BatchConfig, store: &ArtifactStore, unit: &Unit) {
    let set = EpochSet {
        sfreq: 250.0,
        tmin: -0.3,
        channels: ["Cz", "Pz", "Oz"]
            .iter()
            .map(|name| ChannelInfo {
                name: name.to_string(),
                kind: ChannelKind::Eeg,
            })
            .collect(),
        epochs: vec![Epoch {
            label: "standard".to_string(),
            data: vec![vec![1.0e-6; 151]; 3],
        }],
    };
    let key = PipelineKind::Erp.terminal_key(config, store, unit);
    store
        .write(&key, &to_bincode_bytes(&set).expect("encode"), false)
        .expect("write");
}

#[test]
fn averages_conditions_per_subject_and_channel() {
    let temp = tempfile::tempdir().expect("tmp dir");
    synthetic::write_dataset(temp.path(), "pitch", &[("10", "1"), ("2", "1")]).expect("dataset");
    let mut config = synthetic::config(temp.path());
    config.aggregate.expected_channels = Some(synthetic::EEG_CHANNELS.len());
    let index = BidsIndex::new(&config.bids_root, config.derivatives_root(), "json");
    let store = ArtifactStore::new(config.derivatives_root());
    for u in [unit("10", "1"), unit("2", "1")] {
        ErpPipeline::new(&config, &index, &store, &ReferenceOps)
            .execute(&u)
            .expect("erp");
    }
    write_narrow_epochs(&config, &store, &unit("3", "1"));

    let summary = AggregatePipeline::new(&config, &index, &store)
        .run()
        .expect("aggregate");
    let subjects: Vec<&str> = summary.subjects.iter().map(SubjectId::as_str).collect();
    assert_eq!(subjects, vec!["2", "10"]);
    assert_eq!(
        summary.skipped,
        vec!["sub-3_task-pitch_run-1_desc-forERP_epo.bin".to_string()]
    );
    assert!(summary
        .path
        .ends_with("derivatives/erp/group_desc-evokeds_ave.csv"));
    assert_eq!(summary.rows % 151, 0);

    let mut reader = csv::Reader::from_path(&summary.path).expect("open csv");
    let headers = reader.headers().expect("headers").clone();
    assert_eq!(
        headers.iter().collect::<Vec<_>>(),
        vec!["sub", "condition", "chan", "msec", "uV"]
    );
    let records: Vec<csv::StringRecord> = reader.records().map(|r| r.expect("row")).collect();
    assert_eq!(records.len(), summary.rows);
    assert_eq!(&records[0][0], "2");
    assert_eq!(records[0][3].parse::<f64>().expect("msec"), -300.0);
    assert!(records.iter().all(|r| &r[2] == "Cz" || &r[2] == "Pz"));
}

#[test]
fn narrow_epochs_count_when_no_channel_check_is_set() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let config = synthetic::config(temp.path());
    let index = BidsIndex::new(&config.bids_root, config.derivatives_root(), "json");
    let store = ArtifactStore::new(config.derivatives_root());
    write_narrow_epochs(&config, &store, &unit("3", "1"));

    let summary = AggregatePipeline::new(&config, &index, &store)
        .run()
        .expect("aggregate");
    assert!(summary.skipped.is_empty());
    assert_eq!(summary.rows, 2 * 151);
}

#[test]
fn nothing_to_aggregate_is_an_error() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let config = synthetic::config(temp.path());
    let index = BidsIndex::new(&config.bids_root, config.derivatives_root(), "json");
    let store = ArtifactStore::new(config.derivatives_root());
    let err = AggregatePipeline::new(&config, &index, &store)
        .run()
        .expect_err("empty");
    assert!(matches!(err, BatchError::Io(_)));
}

#[test]
fn thread_count_does_not_change_the_table() {
    let temp = tempfile::tempdir().expect("tmp dir");
    synthetic::write_dataset(temp.path(), "pitch", &[("1", "1"), ("2", "1"), ("3", "1")])
        .expect("dataset");
    let config = synthetic::config(temp.path());
    let index = BidsIndex::new(&config.bids_root, config.derivatives_root(), "json");
    let store = ArtifactStore::new(config.derivatives_root());
    for u in [unit("1", "1"), unit("2", "1"), unit("3", "1")] {
        ErpPipeline::new(&config, &index, &store, &ReferenceOps)
            .execute(&u)
            .expect("erp");
    }

    let serial = AggregatePipeline::new(&config, &index, &store)
        .with_threads(1)
        .run()
        .expect("serial");
    let serial_bytes = std::fs::read(&serial.path).expect("read");
    let parallel = AggregatePipeline::new(&config, &index, &store)
        .with_threads(4)
        .run()
        .expect("parallel");
    assert_eq!(parallel.subjects, serial.subjects);
    assert_eq!(std::fs::read(&parallel.path).expect("read"), serial_bytes);
}
