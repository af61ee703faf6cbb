use serde::{Deserialize, Serialize};

use leadnav_core::{ChartSeries, Dataset, MetricValue, MetricsResult, Value, ValueKind};

/// How many distinct sample values a category column contributes to its
/// snippet.
const CATEGORY_SAMPLES: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub id: String,
    pub text: String,
}

/// Turn a dataset and its computed metrics into retrievable text snippets.
/// One overview, one KPI digest, one snippet per column, one per channel
/// and one per month of activity. Rebuilt whenever metrics change.
pub fn build_snippets(dataset: &Dataset, metrics: &MetricsResult) -> Vec<Snippet> {
    let mut snippets = Vec::new();
    snippets.push(overview_snippet(dataset));
    if !metrics.kpis.is_empty() {
        snippets.push(kpi_snippet(metrics));
    }
    for (idx, column) in dataset.columns.iter().enumerate() {
        snippets.push(column_snippet(dataset, idx, &column.name, column.kind));
    }
    for chart in &metrics.charts {
        if chart.name.starts_with("channel_") {
            snippets.extend(channel_snippets(chart));
        }
        if chart.name.starts_with("activity_") {
            snippets.extend(month_snippets(chart));
        }
    }
    snippets
}

fn overview_snippet(dataset: &Dataset) -> Snippet {
    let names: Vec<&str> = dataset.columns.iter().map(|c| c.name.as_str()).collect();
    Snippet {
        id: "overview".to_string(),
        text: format!(
            "This {} dataset has {} rows and {} columns: {}.",
            dataset.kind.as_str(),
            dataset.len(),
            names.len(),
            names.join(", "),
        ),
    }
}

fn kpi_snippet(metrics: &MetricsResult) -> Snippet {
    let mut lines = Vec::new();
    for (name, value) in &metrics.kpis {
        lines.push(format!("{}: {}", name.replace('_', " "), format_metric(value)));
    }
    Snippet {
        id: "kpi".to_string(),
        text: format!("Key metrics. {}", lines.join(". ")),
    }
}

fn column_snippet(dataset: &Dataset, idx: usize, name: &str, kind: ValueKind) -> Snippet {
    let values: Vec<&Value> = dataset
        .records
        .iter()
        .map(|r| &r.values[idx])
        .filter(|v| !v.is_missing())
        .collect();
    let missing = dataset.len() - values.len();
    let body = match kind {
        ValueKind::Number => {
            let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_number()).collect();
            if numbers.is_empty() {
                "no numeric values".to_string()
            } else {
                let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
                let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
                format!("numeric, min {min:.2}, max {max:.2}, mean {mean:.2}")
            }
        }
        ValueKind::Date => {
            let mut dates: Vec<_> = values.iter().filter_map(|v| v.as_date()).collect();
            dates.sort_unstable();
            match (dates.first(), dates.last()) {
                (Some(first), Some(last)) => format!("dates from {first} to {last}"),
                _ => "no parseable dates".to_string(),
            }
        }
        ValueKind::Category => {
            let mut seen = Vec::new();
            for value in &values {
                if let Some(text) = value.as_text() {
                    if !seen.iter().any(|s: &String| s == text) {
                        seen.push(text.to_string());
                        if seen.len() == CATEGORY_SAMPLES {
                            break;
                        }
                    }
                }
            }
            format!("categorical, sample values: {}", seen.join(", "))
        }
    };
    Snippet {
        id: format!("column:{name}"),
        text: format!("Column {name}: {body}. {missing} missing values."),
    }
}

fn channel_snippets(chart: &ChartSeries) -> Vec<Snippet> {
    let by_revenue = chart.name == "channel_revenue";
    chart
        .points
        .iter()
        .map(|point| Snippet {
            id: format!("channel:{}", point.label),
            text: if by_revenue {
                format!(
                    "Channel {} produced {} in revenue.",
                    point.label,
                    format_money(point.value),
                )
            } else {
                format!("Channel {} produced {} conversions.", point.label, point.value)
            },
        })
        .collect()
}

/// Collapse daily or weekly activity buckets into month snippets.
fn month_snippets(chart: &ChartSeries) -> Vec<Snippet> {
    let mut months: Vec<(String, f64)> = Vec::new();
    for point in &chart.points {
        let month = point.label.get(..7).unwrap_or(&point.label).to_string();
        match months.last_mut() {
            Some((last, total)) if *last == month => *total += point.value,
            _ => months.push((month, point.value)),
        }
    }
    months
        .into_iter()
        .map(|(month, total)| Snippet {
            id: format!("month:{month}"),
            text: format!("In {month} there were {total} rows of activity."),
        })
        .collect()
}

pub(crate) fn format_metric(value: &MetricValue) -> String {
    match value {
        MetricValue::Count(n) => n.to_string(),
        MetricValue::Money(amount) => format_money(*amount),
        MetricValue::Percent(p) => format!("{p}%"),
        MetricValue::Text(text) => text.clone(),
        MetricValue::NotApplicable => "not available from this data".to_string(),
    }
}

fn format_money(amount: f64) -> String {
    format!("${amount:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadnav_core::{
        apply_filter, compute_metrics, normalize_table, DatasetKind, FilterSpec, MetricsInput,
        RawTable,
    };

    fn fixture() -> (Dataset, MetricsResult) {
        let table = RawTable {
            headers: vec![
                "email".to_string(),
                "revenue".to_string(),
                "source".to_string(),
            ],
            rows: vec![
                vec!["a@x.com".to_string(), "100".to_string(), "organic".to_string()],
                vec!["b@x.com".to_string(), "250".to_string(), "paid".to_string()],
                vec!["c@x.com".to_string(), "40".to_string(), "referral".to_string()],
            ],
        };
        let (dataset, _) = normalize_table(table, DatasetKind::Buyers, None);
        let view = apply_filter(&dataset, &FilterSpec::default());
        let metrics = compute_metrics(&view, &MetricsInput::default());
        (dataset, metrics)
    }

    #[test]
    fn every_column_gets_a_snippet() {
        let (dataset, metrics) = fixture();
        let snippets = build_snippets(&dataset, &metrics);
        for column in &dataset.columns {
            let id = format!("column:{}", column.name);
            assert!(snippets.iter().any(|s| s.id == id), "missing {id}");
        }
    }

    #[test]
    fn channel_snippets_carry_revenue() {
        let (dataset, metrics) = fixture();
        let snippets = build_snippets(&dataset, &metrics);
        let paid = snippets
            .iter()
            .find(|s| s.id == "channel:paid")
            .expect("paid channel snippet");
        assert!(paid.text.contains("$250.00"));
    }

    #[test]
    fn kpi_snippet_spells_out_unavailable_metrics() {
        let (dataset, metrics) = fixture();
        let snippets = build_snippets(&dataset, &metrics);
        let kpi = snippets.iter().find(|s| s.id == "kpi").expect("kpi snippet");
        // No visitor baseline was supplied, so conversion is unavailable.
        assert!(kpi.text.contains("not available"));
    }
}
