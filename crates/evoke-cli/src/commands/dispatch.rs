use std::error::Error;
use std::path::PathBuf;

use clap::Args;
use evoke_batch::{
    run_batch, Backend, CommandBackend, CompletionFilter, DryRunBackend, FilterSpec,
    InlineBackend, WorkerConfig,
};
use evoke_pipeline::{PipelineKind, ReferenceOps};

use super::{open_dataset, DatasetArgs};

#[derive(Args, Debug)]
pub struct DispatchArgs {
    /// Pipeline to dispatch (`erp` or `microstates`).
    pub pipeline: PipelineKind,
    #[command(flatten)]
    pub dataset: DatasetArgs,
    /// Dispatch units whose terminal artifact already exists.
    #[arg(long)]
    pub force: bool,
    /// Restrict the batch to these subjects; empty means all.
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub subs: Vec<String>,
    /// Exclude these subjects.
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub skips: Vec<String>,
    /// Log the submit commands without running them.
    #[arg(long, conflicts_with = "local")]
    pub dry_run: bool,
    /// Run every unit in this process instead of submitting it.
    #[arg(long)]
    pub local: bool,
    /// Write the batch report as JSON.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

pub fn run(args: &DispatchArgs) -> Result<(), Box<dyn Error>> {
    let config = args.dataset.load()?;
    let (index, store) = open_dataset(&config);
    let filters = FilterSpec {
        include: args.subs.clone(),
        skip: args.skips.clone(),
        force: args.force,
    };
    // filter errors must surface before anything is written
    CompletionFilter::new(&filters, &config.bad_subjects)?;

    let backend: Box<dyn Backend + '_> = if args.local {
        Box::new(InlineBackend::new(&config, &index, &store, &ReferenceOps))
    } else {
        let handoff = WorkerConfig::prepare(&config)?;
        if args.dry_run {
            Box::new(DryRunBackend::new(config.backend.clone()).with_config(handoff.path()))
        } else {
            let path = handoff.publish()?;
            Box::new(CommandBackend::new(config.backend.clone()).with_config(path))
        }
    };

    let report = run_batch(
        args.pipeline,
        &config,
        &filters,
        &index,
        &store,
        backend.as_ref(),
    )?;
    if let Some(path) = &args.report {
        report.write_json(path)?;
    }
    println!("{}: {}", args.pipeline, report.summary());
    Ok(())
}
