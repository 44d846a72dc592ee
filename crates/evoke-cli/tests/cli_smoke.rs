use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use evoke_pipeline::synthetic;
use tempfile::TempDir;

fn evoke(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_evoke"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn evoke")
}

/// Two subjects with one run each, plus a config matched to the synthetic montage.
fn dataset() -> (TempDir, PathBuf) {
    dataset_with("")
}

fn dataset_with(extra_yaml: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().join("bids");
    synthetic::write_dataset(&root, "pitch", &[("1", "1"), ("2", "1")]).expect("dataset");
    let config = dir.path().join("evoke.yaml");
    fs::write(
        &config,
        format!(
            "bids_root: {}\nerp:\n  resample_hz: 250.0\n  passband: [0.5, 40.0]\naggregate:\n  channels: [Cz, Pz]\n{extra_yaml}",
            root.display()
        ),
    )
    .expect("config");
    (dir, config)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("utf-8 path")
}

#[test]
fn include_and_skip_lists_are_rejected() {
    let (_dir, config) = dataset();
    let output = evoke(&[
        "dispatch", "erp", "--config", path_str(&config), "--subs", "1", "--skips", "2", "--dry-run",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("filter_exclusive"));
}

#[test]
fn dry_run_counts_every_pending_unit() {
    let (_dir, config) = dataset();
    let output = evoke(&["dispatch", "erp", "--config", path_str(&config), "--dry-run"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("dispatched=2 skipped=0 failed=0 malformed=0"));
}

#[test]
fn worker_run_writes_the_terminal_artifact() {
    let (_dir, config) = dataset();
    let output = evoke(&["run", "erp", "1", "1", "--config", path_str(&config)]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let printed = stdout(&output);
    let artifact = PathBuf::from(printed.trim());
    assert!(artifact.is_file(), "missing {}", artifact.display());
}

#[test]
fn worker_rejects_a_run_label_for_microstates() {
    let (_dir, config) = dataset();
    let output = evoke(&["run", "microstates", "1", "1", "--config", path_str(&config)]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("worker_arguments"));
}

#[test]
fn local_dispatch_then_status_reports_done() {
    let (dir, config) = dataset();
    let report = dir.path().join("report.json");
    let output = evoke(&[
        "dispatch", "erp", "--config", path_str(&config), "--local", "--report", path_str(&report),
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let parsed: serde_json::Value =
        serde_json::from_slice(&fs::read(&report).expect("report")).expect("json");
    assert_eq!(parsed["dispatched"].as_array().expect("dispatched").len(), 2);

    let status = evoke(&["status", "erp", "--config", path_str(&config)]);
    assert!(status.status.success());
    assert!(stdout(&status).contains("2/2 done"));

    let again = evoke(&["dispatch", "erp", "--config", path_str(&config), "--dry-run"]);
    assert!(stdout(&again).contains("dispatched=0 skipped=2"));

    let aggregate = evoke(&["aggregate", "--config", path_str(&config)]);
    assert!(aggregate.status.success(), "{}", String::from_utf8_lossy(&aggregate.stderr));
    assert!(stdout(&aggregate).contains("2 subjects"));
}

#[test]
fn bare_subject_list_means_every_subject() {
    let (_dir, config) = dataset();
    let output = evoke(&["dispatch", "erp", "--config", path_str(&config), "--subs", "--dry-run"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout(&output).contains("dispatched=2"));
}

#[cfg(unix)]
#[test]
fn command_backend_workers_receive_the_dispatcher_config() {
    let backend = format!(
        "backend:\n  program: /usr/bin/env\n  worker: {}\n  args: [run]\n  wrap: false\n",
        env!("CARGO_BIN_EXE_evoke")
    );
    let (dir, config) = dataset_with(&backend);
    let output = Command::new(env!("CARGO_BIN_EXE_evoke"))
        .args(["dispatch", "erp", "--config", path_str(&config)])
        .current_dir(dir.path())
        .env_remove("RUST_LOG")
        .output()
        .expect("spawn evoke");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(
        stdout(&output).contains("dispatched=2 skipped=0 failed=0"),
        "{}",
        stdout(&output)
    );

    let erp = dir.path().join("bids/derivatives/erp");
    for subject in ["1", "2"] {
        let artifact = erp
            .join(format!("sub-{subject}"))
            .join(format!("sub-{subject}_task-pitch_run-1_desc-forERP_epo.bin"));
        assert!(artifact.is_file(), "missing {}", artifact.display());
    }

    let again = evoke(&["dispatch", "erp", "--config", path_str(&config), "--dry-run"]);
    assert!(stdout(&again).contains("dispatched=0 skipped=2"));
}
