mod ask;
mod cli;
mod config;
mod ingest;
mod load;
mod logging;
mod report;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = if cli.verbose {
        true
    } else {
        logging::env_flag()
    };
    logging::init(verbose);
    match cli.command {
        Command::Ingest {
            input,
            kind,
            mapping,
        } => ingest::run(input, kind, mapping),
        Command::Metrics {
            input,
            kind,
            mapping,
            filter,
            spend,
            visitors,
        } => report::run(input, kind, mapping, filter, spend, visitors),
        Command::Ask {
            input,
            question,
            kind,
            mapping,
            filter,
            top_k,
        } => ask::run(input, question, kind, mapping, filter, top_k),
    }
}
