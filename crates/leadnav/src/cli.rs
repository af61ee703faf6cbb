use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "leadnav", about = "Marketing dataset analysis CLI")]
pub struct Cli {
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load a file, normalize it, and print ingest statistics.
    Ingest {
        input: String,
        #[arg(long, default_value = "buyers")]
        kind: String,
        /// JSON file mapping raw headers to canonical column names.
        #[arg(long)]
        mapping: Option<String>,
    },
    /// Compute KPIs and chart data for a (optionally filtered) dataset.
    Metrics {
        input: String,
        #[arg(long, default_value = "buyers")]
        kind: String,
        #[arg(long)]
        mapping: Option<String>,
        /// JSON file holding the filter selections to apply.
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        spend: Option<f64>,
        #[arg(long)]
        visitors: Option<u64>,
    },
    /// Ask a natural-language question about a dataset.
    Ask {
        input: String,
        question: String,
        #[arg(long, default_value = "buyers")]
        kind: String,
        #[arg(long)]
        mapping: Option<String>,
        #[arg(long)]
        filter: Option<String>,
        /// Snippets to retrieve; falls back to LEADNAV_TOP_K, then 5.
        #[arg(long)]
        top_k: Option<usize>,
    },
}
