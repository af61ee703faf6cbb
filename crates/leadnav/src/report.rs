use anyhow::Result;

use leadnav_core::{apply_filter, compute_metrics, FilterWarning, MetricsInput};

use crate::load;
use crate::logging;

pub fn run(
    input: String,
    kind: String,
    mapping: Option<String>,
    filter: Option<String>,
    spend: Option<f64>,
    visitors: Option<u64>,
) -> Result<()> {
    let loaded = load::load_dataset(&input, &kind, mapping.as_deref())?;
    let spec = load::read_filter(filter.as_deref())?;
    let view = apply_filter(&loaded.dataset, &spec);
    for warning in &view.warnings {
        match warning {
            FilterWarning::UnknownColumn(name) => {
                logging::info(format!("filter references unknown column '{name}'"));
            }
        }
    }
    logging::stage(
        "metrics",
        format!("{} of {} rows match the filter", view.len(), loaded.dataset.len()),
    );
    let metrics_input = MetricsInput {
        acquisition_spend: spend,
        visitor_baseline: visitors,
        ..MetricsInput::default()
    };
    let result = compute_metrics(&view, &metrics_input);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
