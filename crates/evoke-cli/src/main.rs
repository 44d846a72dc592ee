use std::error::Error;

use clap::{Parser, Subcommand};
use commands::{
    aggregate::{self, AggregateArgs},
    dispatch::{self, DispatchArgs},
    run::{self, RunArgs},
    status::{self, StatusArgs},
};

mod commands;
mod logging;

#[derive(Parser, Debug)]
#[command(name = "evoke", about = "Idempotent per-unit EEG batch pipeline")]
struct Cli {
    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit every pending unit of a pipeline to the execution backend.
    Dispatch(DispatchArgs),
    /// Execute one unit in this process (worker entry point).
    Run(RunArgs),
    /// Average every subject's ERP epochs into one group table.
    Aggregate(AggregateArgs),
    /// Show which units are done, pending or excluded.
    Status(StatusArgs),
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logging::init_subscriber(&cli.log_level);
    match cli.command {
        Command::Dispatch(args) => dispatch::run(&args),
        Command::Run(args) => run::run(&args),
        Command::Aggregate(args) => aggregate::run(&args),
        Command::Status(args) => status::run(&args),
    }
}
