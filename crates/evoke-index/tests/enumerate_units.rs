use std::fs;
use std::path::Path;

use evoke_core::{BatchError, RunId, SubjectId};
use evoke_index::{list_subject_units, list_units, recording_for, BidsIndex, DatasetIndex};
use evoke_store::ArtifactStore;

fn touch(root: &Path, subject: &str, name: &str) {
    let dir = root.join(format!("sub-{subject}")).join("eeg");
    fs::create_dir_all(&dir).expect("eeg dir");
    fs::write(dir.join(name), b"{}").expect("write recording");
}

fn index_for(root: &Path) -> BidsIndex {
    BidsIndex::new(root, root.join("derivatives"), "json")
}

#[test]
fn units_are_ordered_numerically() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let root = temp.path();
    touch(root, "10", "sub-10_task-pitch_run-1_eeg.json");
    touch(root, "2", "sub-2_task-pitch_run-10_eeg.json");
    touch(root, "2", "sub-2_task-pitch_run-2_eeg.json");
    touch(root, "1", "sub-1_task-pitch_run-01_eeg.json");

    let enumeration = list_units(&index_for(root), "pitch").expect("enumerate");
    let rendered: Vec<String> = enumeration.units.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        vec![
            "sub-1_task-pitch_run-01",
            "sub-2_task-pitch_run-2",
            "sub-2_task-pitch_run-10",
            "sub-10_task-pitch_run-1",
        ]
    );
    assert!(enumeration.malformed.is_empty());
}

#[test]
fn other_tasks_and_files_are_ignored() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let root = temp.path();
    touch(root, "1", "sub-1_task-pitch_run-1_eeg.json");
    touch(root, "1", "sub-1_task-rest_run-1_eeg.json");
    touch(root, "1", "sub-1_task-pitch_run-1_events.tsv");
    touch(root, "1", "sub-1_task-pitch_run-1_eeg.vhdr");
    let enumeration = list_units(&index_for(root), "pitch").expect("enumerate");
    assert_eq!(enumeration.units.len(), 1);
}

#[test]
fn malformed_units_are_excluded_not_fatal() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let root = temp.path();
    touch(root, "1", "sub-1_task-pitch_run-1_eeg.json");
    touch(root, "2", "sub-2_task-pitch_run-x_eeg.json");
    touch(root, "3", "sub-3_task-pitch_eeg.json");

    let enumeration = list_units(&index_for(root), "pitch").expect("enumerate");
    assert_eq!(enumeration.units.len(), 1);
    assert_eq!(enumeration.units[0].subject.as_str(), "1");
    assert_eq!(enumeration.malformed.len(), 2);
    assert!(enumeration
        .malformed
        .iter()
        .all(|err| matches!(err, BatchError::MalformedUnit(_))));
    let codes: Vec<&str> = enumeration.malformed.iter().map(|err| err.code()).collect();
    assert_eq!(codes, vec!["unit_run", "unit_run_missing"]);
}

#[test]
fn derivatives_directory_is_not_scanned_for_recordings() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let root = temp.path();
    touch(root, "1", "sub-1_task-pitch_run-1_eeg.json");
    let shadow = root.join("derivatives").join("sub-9").join("eeg");
    fs::create_dir_all(&shadow).expect("shadow dir");
    fs::write(shadow.join("sub-9_task-pitch_run-1_eeg.json"), b"{}").expect("shadow");
    let recordings = index_for(root).recordings().expect("recordings");
    assert_eq!(recordings.len(), 1);
}

#[test]
fn missing_root_is_an_error() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let index = index_for(&temp.path().join("absent"));
    assert!(matches!(list_units(&index, "pitch"), Err(BatchError::Io(_))));
}

#[test]
fn recording_lookup_matches_unit() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let root = temp.path();
    touch(root, "4", "sub-4_task-pitch_run-1_eeg.json");
    touch(root, "4", "sub-4_task-pitch_run-2_eeg.json");
    let index = index_for(root);
    let units = list_units(&index, "pitch").expect("enumerate").units;
    let entry = recording_for(&index, &units[1]).expect("lookup");
    assert!(entry.path.ends_with("sub-4_task-pitch_run-2_eeg.json"));
}

#[test]
fn subject_units_require_upstream_artifacts() {
    let temp = tempfile::tempdir().expect("tmp dir");
    let root = temp.path();
    let store = ArtifactStore::new(root.join("derivatives"));
    for (subject, run) in [("10", "1"), ("2", "2"), ("2", "1")] {
        let key = store
            .key("erp", SubjectId::new(subject).expect("subject"))
            .task("pitch")
            .run(RunId::new(run).expect("run"))
            .description("forERP")
            .suffix("epo")
            .extension("bin");
        store.write(&key, b"epochs", false).expect("write");
    }
    let report = store
        .key("erp", SubjectId::new("5").expect("subject"))
        .task("pitch")
        .description("forERP")
        .suffix("report")
        .extension("json");
    store.write(&report, b"{}", false).expect("report");

    let index = index_for(root);
    let keys = index.derivative_keys("erp", "forERP", "epo").expect("keys");
    let order: Vec<String> = keys.iter().map(|k| k.file_name()).collect();
    assert_eq!(
        order,
        vec![
            "sub-2_task-pitch_run-1_desc-forERP_epo.bin",
            "sub-2_task-pitch_run-2_desc-forERP_epo.bin",
            "sub-10_task-pitch_run-1_desc-forERP_epo.bin",
        ]
    );

    let enumeration =
        list_subject_units(&index, "pitch", "erp", "forERP", "epo").expect("subject units");
    let subjects: Vec<&str> = enumeration
        .units
        .iter()
        .map(|unit| unit.subject.as_str())
        .collect();
    assert_eq!(subjects, vec!["2", "10"]);
    assert!(enumeration.units.iter().all(|unit| unit.run.is_none()));
}
