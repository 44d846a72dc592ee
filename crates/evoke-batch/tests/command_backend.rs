#![cfg(unix)]

use evoke_batch::{Backend, CommandBackend, JobCommand};
use evoke_core::{BackendSpec, BatchError, RunId, SubjectId, Unit};
use evoke_pipeline::PipelineKind;

fn job() -> JobCommand {
    JobCommand::new(
        PipelineKind::Erp,
        Unit::per_run(
            SubjectId::new("3").expect("subject"),
            "pitch",
            RunId::new("1").expect("run"),
        ),
    )
}

fn backend(program: &str, worker: &str) -> CommandBackend {
    CommandBackend::new(BackendSpec {
        program: program.to_string(),
        worker: worker.to_string(),
        args: vec!["run".to_string()],
        wrap: false,
    })
}

#[test]
fn first_stdout_line_is_the_job_handle() {
    let handle = backend("echo", "queued")
        .submit(&job())
        .expect("submit");
    assert_eq!(handle.0, "queued run erp 3 1");
}

#[test]
fn forwarded_config_reaches_the_worker() {
    let handle = backend("echo", "queued")
        .with_config("/data/evoke.yaml")
        .submit(&job())
        .expect("submit");
    assert_eq!(handle.0, "queued run erp 3 1 --config /data/evoke.yaml");
}

#[test]
fn wrapped_template_passes_one_shell_string() {
    let wrapped = CommandBackend::new(BackendSpec {
        program: "echo".to_string(),
        worker: "evoke".to_string(),
        args: vec!["run".to_string()],
        wrap: true,
    });
    let handle = wrapped.submit(&job()).expect("submit");
    assert_eq!(handle.0, "--wrap evoke run erp 3 1");
}

#[test]
fn non_zero_exit_is_a_submission_error() {
    let err = backend("false", "evoke")
        .submit(&job())
        .expect_err("rejected");
    assert!(matches!(err, BatchError::Submission(_)));
    assert_eq!(err.code(), "submit_status");
    assert!(!err.is_fatal());
}

#[test]
fn missing_program_is_a_submission_error() {
    let err = backend("/nonexistent/evoke-submit", "evoke")
        .submit(&job())
        .expect_err("spawn fails");
    assert_eq!(err.code(), "submit_spawn");
    assert_eq!(
        err.info().context.get("unit").map(String::as_str),
        Some("sub-3_task-pitch_run-1")
    );
}
