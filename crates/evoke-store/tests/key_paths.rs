use std::path::{Path, PathBuf};

use evoke_core::{RunId, SubjectId, Unit};
use evoke_store::{ArtifactKey, GroupKey};

fn erp_key(root: &Path) -> ArtifactKey {
    ArtifactKey::new(root, "erp", SubjectId::new("3").expect("subject"))
        .task("pitch")
        .run(RunId::new("1").expect("run"))
        .description("forERP")
        .suffix("epo")
        .extension("fif.gz")
}

#[test]
fn path_encodes_every_entity() {
    let key = erp_key(Path::new("/bids/derivatives"));
    assert_eq!(
        key.path(),
        PathBuf::from("/bids/derivatives/erp/sub-3/sub-3_task-pitch_run-1_desc-forERP_epo.fif.gz")
    );
}

#[test]
fn identical_fields_yield_identical_paths() {
    let a = erp_key(Path::new("/d"));
    let b = erp_key(Path::new("/d"));
    assert_eq!(a, b);
    assert_eq!(a.path(), b.path());
}

#[test]
fn optional_entities_are_omitted() {
    let key = ArtifactKey::new("/d", "microstates", SubjectId::new("12").expect("subject"))
        .task("pitch")
        .description("microstates")
        .suffix("ModKMeans")
        .extension(".json");
    assert_eq!(key.extension, "json");
    assert_eq!(
        key.path(),
        PathBuf::from("/d/microstates/sub-12/sub-12_task-pitch_desc-microstates_ModKMeans.json")
    );
}

#[test]
fn unit_keys_carry_task_and_run() {
    let unit = Unit::per_run(
        SubjectId::new("4").expect("subject"),
        "pitch",
        RunId::new("2").expect("run"),
    );
    let key = ArtifactKey::for_unit("/d", "erp", &unit)
        .description("forERP")
        .suffix("epo")
        .extension("bin");
    assert_eq!(key.file_name(), "sub-4_task-pitch_run-2_desc-forERP_epo.bin");
}

#[test]
fn parse_inverts_path() {
    let root = Path::new("/bids/derivatives");
    let key = erp_key(root);
    let parsed = ArtifactKey::parse(root, "erp", &key.path()).expect("parse");
    assert_eq!(parsed, key);
}

#[test]
fn parse_rejects_foreign_files() {
    let root = Path::new("/d");
    let rejects = [
        "/d/erp/sub-3.html",
        "/d/erp/sub-3/sub-3_task-pitch_run-1_epo.bin",
        "/d/erp/sub-3/sub-4_task-pitch_desc-forERP_epo.bin",
        "/d/erp/sub-3/nested/sub-3_desc-forERP_epo.bin",
        "/d/other/sub-3/sub-3_desc-forERP_epo.bin",
        "/d/erp/sub-3/sub-3_acq-x_desc-forERP_epo.bin",
    ];
    for path in rejects {
        assert!(
            ArtifactKey::parse(root, "erp", Path::new(path)).is_none(),
            "{path} should not parse"
        );
    }
}

#[test]
fn group_key_lives_in_derivative_root() {
    let key = GroupKey::new("/d", "erp", "evokeds", "ave", ".csv");
    assert_eq!(key.path(), PathBuf::from("/d/erp/group_desc-evokeds_ave.csv"));
}
