use std::error::Error;

use clap::Args;
use evoke_batch::{unit_status, FilterSpec, UnitState};
use evoke_pipeline::PipelineKind;

use super::{open_dataset, DatasetArgs};

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Pipeline to inspect.
    pub pipeline: PipelineKind,
    #[command(flatten)]
    pub dataset: DatasetArgs,
    /// Treat only these subjects as included.
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub subs: Vec<String>,
    /// Treat these subjects as skipped.
    #[arg(long, value_delimiter = ',', num_args = 0..)]
    pub skips: Vec<String>,
}

pub fn run(args: &StatusArgs) -> Result<(), Box<dyn Error>> {
    let config = args.dataset.load()?;
    let (index, store) = open_dataset(&config);
    let filters = FilterSpec {
        include: args.subs.clone(),
        skip: args.skips.clone(),
        force: false,
    };
    let rows = unit_status(args.pipeline, &config, &filters, &index, &store)?;
    let mut done = 0;
    for row in &rows {
        let state = match row.state {
            UnitState::Done => {
                done += 1;
                "done"
            }
            UnitState::Pending => "pending",
            UnitState::Excluded => "excluded",
        };
        println!("{}\t{state}", row.unit);
    }
    println!("{done}/{} done", rows.len());
    Ok(())
}
