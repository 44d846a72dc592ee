use std::error::Error;

use clap::Args;
use evoke_pipeline::AggregatePipeline;

use super::{open_dataset, DatasetArgs};

#[derive(Args, Debug)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,
    /// Skip epoch files whose channel count differs.
    #[arg(long)]
    pub expected_channels: Option<usize>,
    /// Threads used to load subjects (0 = one per core).
    #[arg(long, default_value_t = 0)]
    pub threads: usize,
}

pub fn run(args: &AggregateArgs) -> Result<(), Box<dyn Error>> {
    let mut config = args.dataset.load()?;
    if args.expected_channels.is_some() {
        config.aggregate.expected_channels = args.expected_channels;
    }
    let (index, store) = open_dataset(&config);
    let summary = AggregatePipeline::new(&config, &index, &store)
        .with_threads(args.threads)
        .run()?;
    println!(
        "{} ({} subjects, {} rows, {} skipped)",
        summary.path.display(),
        summary.subjects.len(),
        summary.rows,
        summary.skipped.len()
    );
    Ok(())
}
