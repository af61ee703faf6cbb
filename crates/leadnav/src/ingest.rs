use anyhow::Result;

use crate::load::{self, LoadedDataset};
use crate::logging;

pub fn run(input: String, kind: String, mapping: Option<String>) -> Result<()> {
    let LoadedDataset { dataset, stats } = load::load_dataset(&input, &kind, mapping.as_deref())?;
    logging::stage(
        "ingest",
        format!("{} rows across {} columns", dataset.len(), dataset.columns.len()),
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
