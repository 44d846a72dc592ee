//! Execution backends the dispatcher hands units to.

use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::process::Command;

use evoke_core::errors::{BatchError, ErrorInfo};
use evoke_core::{BackendSpec, BatchConfig, Unit};
use evoke_index::DatasetIndex;
use evoke_pipeline::{executor, PipelineKind, SignalOps, StageFailure};
use evoke_store::{content_hash, ArtifactStore, GroupKey};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One unit of work as handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCommand {
    /// Pipeline to run.
    pub pipeline: PipelineKind,
    /// Unit to run it on.
    pub unit: Unit,
}

impl JobCommand {
    /// Creates a job for `unit`.
    pub fn new(pipeline: PipelineKind, unit: Unit) -> Self {
        Self { pipeline, unit }
    }

    /// Worker argument vector:
    /// `<worker> <args..> <pipeline> <subject> [<run>] [--config <path>]`.
    pub fn worker_argv(&self, spec: &BackendSpec, config: Option<&Path>) -> Vec<String> {
        let mut argv = Vec::with_capacity(spec.args.len() + 6);
        argv.push(spec.worker.clone());
        argv.extend(spec.args.iter().cloned());
        argv.push(self.pipeline.name().to_string());
        argv.extend(self.unit.worker_args());
        if let Some(path) = config {
            argv.push("--config".to_string());
            argv.push(path.display().to_string());
        }
        argv
    }

    /// Arguments handed to the submission program. With `spec.wrap` the
    /// worker command becomes a single `--wrap` shell string.
    pub fn submit_argv(&self, spec: &BackendSpec, config: Option<&Path>) -> Vec<String> {
        let argv = self.worker_argv(spec, config);
        if !spec.wrap {
            return argv;
        }
        let command = argv
            .iter()
            .map(String::as_str)
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ");
        vec!["--wrap".to_string(), command]
    }
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\\''"))
    }
}

/// Effective configuration handed to out-of-process workers.
///
/// The document is the resolved configuration (absolute roots), stored under
/// `derivatives/evoke/` and named by its content hash so that concurrent
/// dispatchers with the same configuration share one file.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    store: ArtifactStore,
    key: GroupKey,
    yaml: String,
}

impl WorkerConfig {
    /// Resolves `config` and computes its location without writing it.
    pub fn prepare(config: &BatchConfig) -> Result<Self, BatchError> {
        let resolved = config.resolved()?;
        let yaml = resolved.to_yaml()?;
        let store = ArtifactStore::new(resolved.derivatives_root());
        let digest = content_hash(yaml.as_bytes());
        let key = store.group_key("evoke", &digest[..16], "config", "yaml");
        Ok(Self { store, key, yaml })
    }

    /// Absolute path workers receive through `--config`.
    pub fn path(&self) -> PathBuf {
        self.key.path()
    }

    /// Writes the document and returns its path.
    pub fn publish(&self) -> Result<PathBuf, BatchError> {
        self.store.write_group(&self.key, self.yaml.as_bytes())
    }
}

/// Opaque identifier returned by a backend for a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(pub String);

impl Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Asynchronous execution backend.
///
/// `submit` returns once the backend accepted or rejected the job; it never
/// waits for the job itself.
pub trait Backend {
    /// Submits one job.
    fn submit(&self, job: &JobCommand) -> Result<JobHandle, BatchError>;
}

fn submission_info(code: &str, program: &str, job: &JobCommand, message: impl Into<String>) -> ErrorInfo {
    ErrorInfo::new(code, message)
        .with_context("program", program)
        .with_context("pipeline", job.pipeline.name())
        .with_context("unit", job.unit.to_string())
}

/// Runs `<program> <worker> <args..> <pipeline> <subject> [<run>]`, or
/// `<program> --wrap '<worker command>'` when the template wraps.
#[derive(Debug, Clone)]
pub struct CommandBackend {
    spec: BackendSpec,
    config: Option<PathBuf>,
}

impl CommandBackend {
    /// Backend built from the configured command template.
    pub fn new(spec: BackendSpec) -> Self {
        Self { spec, config: None }
    }

    /// Forwards `--config <path>` to every worker.
    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }
}

impl Backend for CommandBackend {
    fn submit(&self, job: &JobCommand) -> Result<JobHandle, BatchError> {
        let program = self.spec.program.as_str();
        let output = Command::new(program)
            .args(job.submit_argv(&self.spec, self.config.as_deref()))
            .output()
            .map_err(|err| {
                BatchError::Submission(submission_info("submit_spawn", program, job, err.to_string()))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let info = submission_info(
                "submit_status",
                program,
                job,
                format!("submission exited with {}", output.status),
            );
            return Err(BatchError::Submission(info.with_context("stderr", stderr)));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let handle = stdout.lines().next().unwrap_or_default().trim();
        Ok(JobHandle(if handle.is_empty() {
            format!("{program}:{}", job.unit)
        } else {
            handle.to_string()
        }))
    }
}

/// Logs the command a [`CommandBackend`] would run and submits nothing.
#[derive(Debug, Clone)]
pub struct DryRunBackend {
    spec: BackendSpec,
    config: Option<PathBuf>,
}

impl DryRunBackend {
    /// Dry-run over the configured command template.
    pub fn new(spec: BackendSpec) -> Self {
        Self { spec, config: None }
    }

    /// Includes `--config <path>` in the logged commands.
    pub fn with_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.config = Some(path.into());
        self
    }
}

impl Backend for DryRunBackend {
    fn submit(&self, job: &JobCommand) -> Result<JobHandle, BatchError> {
        let command = std::iter::once(self.spec.program.clone())
            .chain(job.submit_argv(&self.spec, self.config.as_deref()))
            .collect::<Vec<_>>()
            .join(" ");
        info!(unit = %job.unit, command = %command, "dry run");
        Ok(JobHandle(format!("dry-run:{}", job.unit)))
    }
}

/// Executes each job synchronously in this process.
pub struct InlineBackend<'a> {
    config: &'a BatchConfig,
    index: &'a dyn DatasetIndex,
    store: &'a ArtifactStore,
    ops: &'a dyn SignalOps,
}

impl<'a> InlineBackend<'a> {
    /// Backend running pipelines against the given collaborators.
    pub fn new(
        config: &'a BatchConfig,
        index: &'a dyn DatasetIndex,
        store: &'a ArtifactStore,
        ops: &'a dyn SignalOps,
    ) -> Self {
        Self {
            config,
            index,
            store,
            ops,
        }
    }
}

fn inline_failure(failure: StageFailure) -> BatchError {
    BatchError::Submission(
        ErrorInfo::new("inline_stage_failed", failure.to_string())
            .with_context("stage", failure.stage.as_str())
            .with_context("unit", failure.unit.to_string())
            .with_context("cause", failure.error.code()),
    )
}

impl Backend for InlineBackend<'_> {
    fn submit(&self, job: &JobCommand) -> Result<JobHandle, BatchError> {
        let pipeline = executor(job.pipeline, self.config, self.index, self.store, self.ops);
        let artifact = pipeline.execute(&job.unit).map_err(inline_failure)?;
        Ok(JobHandle(format!("inline:{}", artifact.content_hash)))
    }
}
