use std::error::Error;

use clap::Args;
use evoke_core::errors::{BatchError, ErrorInfo};
use evoke_core::{RunId, SubjectId, Unit};
use evoke_pipeline::{executor, PipelineKind, ReferenceOps};

use super::{open_dataset, DatasetArgs};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Pipeline to execute (`erp` or `microstates`).
    pub pipeline: PipelineKind,
    /// Subject label.
    pub subject: String,
    /// Run label; required by `erp`, rejected by `microstates`.
    pub run: Option<String>,
    #[command(flatten)]
    pub dataset: DatasetArgs,
}

fn unit_for(args: &RunArgs, task: &str) -> Result<Unit, BatchError> {
    let subject = SubjectId::new(args.subject.clone())?;
    match (args.pipeline, &args.run) {
        (PipelineKind::Erp, Some(run)) => Ok(Unit::per_run(subject, task, RunId::new(run.clone())?)),
        (PipelineKind::Microstates, None) => Ok(Unit::per_subject(subject, task)),
        (pipeline, _) => Err(BatchError::Configuration(
            ErrorInfo::new("worker_arguments", "run argument does not match the pipeline")
                .with_context("pipeline", pipeline.name())
                .with_hint("erp takes <subject> <run>, microstates takes <subject>"),
        )),
    }
}

/// Worker entry point: one unit, always overwriting.
pub fn run(args: &RunArgs) -> Result<(), Box<dyn Error>> {
    let config = args.dataset.load()?;
    let unit = unit_for(args, &config.task)?;
    let (index, store) = open_dataset(&config);
    let pipeline = executor(args.pipeline, &config, &index, &store, &ReferenceOps);
    let artifact = pipeline.execute(&unit).map_err(BatchError::from)?;
    println!("{}", artifact.path.display());
    Ok(())
}
