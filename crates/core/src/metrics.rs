use chrono::{Datelike, Duration, NaiveDate};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::columns::{find_categorical_fallback, find_column, ColumnRole};
use crate::dataset::{DatasetKind, Value};
use crate::filter::FilteredView;
use crate::ranges::parse_range_or_number;

/// Share of rows that must carry a positive amount before a column counts
/// as real revenue data.
const REVENUE_PRESENCE_SHARE: f64 = 0.1;

const TOP_CHANNELS: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Count(u64),
    Money(f64),
    Percent(f64),
    Text(String),
    /// The metric cannot be computed from the data at hand. Distinct from
    /// zero, which would mislead.
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub points: Vec<ChartPoint>,
}

/// KPI mapping plus chart-ready aggregates. Regenerated wholesale per
/// filter change; never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResult {
    pub kpis: IndexMap<String, MetricValue>,
    pub charts: Vec<ChartSeries>,
}

/// Which column identifies one person/device across rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityKey {
    #[default]
    Auto,
    Email,
    Device,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsInput {
    /// Total acquisition spend supplied by the caller; when absent and the
    /// data has no spend column, CAC is NotApplicable.
    pub acquisition_spend: Option<f64>,
    /// Unique-visitor baseline for conversion rate.
    pub visitor_baseline: Option<u64>,
    pub identity: IdentityKey,
}

/// Compute KPIs and chart datasets for a filtered view. Pure function of
/// its inputs: same view and input always produce the same result.
pub fn compute_metrics(view: &FilteredView<'_>, input: &MetricsInput) -> MetricsResult {
    let mut kpis = IndexMap::new();
    let mut charts = Vec::new();

    let revenue_col = revenue_column(view);
    let identity_col = resolve_identity(view, input.identity);

    match revenue_col {
        Some(col) if view.dataset.kind == DatasetKind::Buyers => {
            revenue_kpis(view, input, col, identity_col, &mut kpis);
        }
        _ => demographic_kpis(view, identity_col, &mut kpis),
    }

    if let Some(series) = activity_over_time(view) {
        charts.push(series);
    }
    if let Some(series) = channel_performance(view, revenue_col) {
        charts.push(series);
    }
    for role in [ColumnRole::Gender, ColumnRole::Age, ColumnRole::Income] {
        if let Some(series) = distribution_chart(view, role) {
            charts.push(series);
        }
    }
    if let Some(pair) = new_vs_returning(view, identity_col) {
        charts.extend(pair);
    }

    MetricsResult { kpis, charts }
}

fn revenue_kpis(
    view: &FilteredView<'_>,
    input: &MetricsInput,
    revenue_col: usize,
    identity_col: Option<usize>,
    kpis: &mut IndexMap<String, MetricValue>,
) {
    let amounts: Vec<f64> = view
        .records()
        .map(|r| cell_amount(&r.values[revenue_col]))
        .collect();
    let total: f64 = amounts.iter().sum();
    kpis.insert("total_revenue".to_string(), MetricValue::Money(total));

    let orders = order_count(view, &amounts);
    kpis.insert(
        "aov".to_string(),
        if orders > 0 {
            MetricValue::Money(total / orders as f64)
        } else {
            MetricValue::NotApplicable
        },
    );

    let unique = identity_col
        .map(|col| distinct_non_missing(view, col))
        .unwrap_or_else(|| view.len());
    kpis.insert(
        "conversion_rate".to_string(),
        match input.visitor_baseline {
            Some(baseline) if baseline > 0 => {
                MetricValue::Percent(round1(unique as f64 / baseline as f64 * 100.0))
            }
            _ => MetricValue::NotApplicable,
        },
    );

    kpis.insert("repeat_rate".to_string(), repeat_rate(view, identity_col));
    kpis.insert(
        "ltv_90d".to_string(),
        ltv_90d(view, revenue_col, identity_col),
    );
    kpis.insert("cac".to_string(), cac(view, input, identity_col));
}

fn demographic_kpis(
    view: &FilteredView<'_>,
    identity_col: Option<usize>,
    kpis: &mut IndexMap<String, MetricValue>,
) {
    let total = view.len() as u64;
    kpis.insert("total".to_string(), MetricValue::Count(total));

    let unique = identity_col
        .map(|col| distinct_non_missing(view, col) as u64)
        .unwrap_or(total);
    kpis.insert("unique".to_string(), MetricValue::Count(unique));

    if let Some((male, female)) = gender_split(view) {
        kpis.insert("male_percent".to_string(), MetricValue::Percent(male));
        kpis.insert("female_percent".to_string(), MetricValue::Percent(female));
    } else {
        kpis.insert("male_percent".to_string(), MetricValue::NotApplicable);
        kpis.insert("female_percent".to_string(), MetricValue::NotApplicable);
    }

    kpis.insert("repeat_rate".to_string(), repeat_rate(view, identity_col));

    for (name, role) in [
        ("top_state", ColumnRole::State),
        ("top_income", ColumnRole::Income),
        ("top_age", ColumnRole::Age),
    ] {
        kpis.insert(
            name.to_string(),
            top_value(view, role)
                .map(MetricValue::Text)
                .unwrap_or(MetricValue::NotApplicable),
        );
    }
}

/// The revenue column, but only when it carries actual amounts: at least
/// 10% of rows with a positive parsed value.
fn revenue_column(view: &FilteredView<'_>) -> Option<usize> {
    let col = find_column(view.dataset, ColumnRole::Revenue)?;
    if view.is_empty() {
        return None;
    }
    let positive = view
        .records()
        .filter(|r| cell_amount(&r.values[col]) > 0.0)
        .count();
    (positive as f64 / view.len() as f64 > REVENUE_PRESENCE_SHARE).then_some(col)
}

fn resolve_identity(view: &FilteredView<'_>, key: IdentityKey) -> Option<usize> {
    match key {
        IdentityKey::Email => find_column(view.dataset, ColumnRole::Email),
        IdentityKey::Device => find_column(view.dataset, ColumnRole::DeviceId),
        IdentityKey::Auto => find_column(view.dataset, ColumnRole::Email)
            .or_else(|| find_column(view.dataset, ColumnRole::DeviceId)),
    }
}

fn cell_amount(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        Value::Category(s) => parse_range_or_number(s),
        _ => 0.0,
    }
}

/// Distinct order ids when an order-id column exists; otherwise rows with
/// a positive amount.
fn order_count(view: &FilteredView<'_>, amounts: &[f64]) -> usize {
    if let Some(col) = find_column(view.dataset, ColumnRole::OrderId) {
        let distinct = distinct_non_missing(view, col);
        if distinct > 0 {
            return distinct;
        }
    }
    amounts.iter().filter(|a| **a > 0.0).count()
}

fn repeat_rate(view: &FilteredView<'_>, identity_col: Option<usize>) -> MetricValue {
    let Some(col) = identity_col else {
        return MetricValue::NotApplicable;
    };
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for record in view.records() {
        let value = &record.values[col];
        if value.is_missing() {
            continue;
        }
        *counts.entry(value.display()).or_insert(0) += 1;
    }
    if counts.is_empty() {
        return MetricValue::NotApplicable;
    }
    let repeat = counts.values().filter(|c| **c > 1).count();
    MetricValue::Percent(round1(repeat as f64 / counts.len() as f64 * 100.0))
}

/// 90-day LTV anchored at each customer's first purchase date: that
/// customer's revenue within [first, first + 90d], averaged over customers.
fn ltv_90d(
    view: &FilteredView<'_>,
    revenue_col: usize,
    identity_col: Option<usize>,
) -> MetricValue {
    let Some(identity_col) = identity_col else {
        return MetricValue::NotApplicable;
    };
    let Some(date_col) = find_column(view.dataset, ColumnRole::Date) else {
        return MetricValue::NotApplicable;
    };
    let mut purchases: IndexMap<String, Vec<(NaiveDate, f64)>> = IndexMap::new();
    for record in view.records() {
        let identity = &record.values[identity_col];
        let Some(date) = record.values[date_col].as_date() else {
            continue;
        };
        if identity.is_missing() {
            continue;
        }
        purchases
            .entry(identity.display())
            .or_default()
            .push((date, cell_amount(&record.values[revenue_col])));
    }
    if purchases.is_empty() {
        return MetricValue::NotApplicable;
    }
    let mut sum = 0.0;
    for orders in purchases.values() {
        let Some(first) = orders.iter().map(|(d, _)| *d).min() else {
            continue;
        };
        let window_end = first + Duration::days(90);
        sum += orders
            .iter()
            .filter(|(d, _)| *d >= first && *d <= window_end)
            .map(|(_, amount)| amount)
            .sum::<f64>();
    }
    MetricValue::Money(sum / purchases.len() as f64)
}

fn cac(
    view: &FilteredView<'_>,
    input: &MetricsInput,
    identity_col: Option<usize>,
) -> MetricValue {
    let spend = input.acquisition_spend.or_else(|| {
        find_column(view.dataset, ColumnRole::Spend).map(|col| {
            view.records()
                .map(|r| cell_amount(&r.values[col]))
                .sum::<f64>()
        })
    });
    let Some(spend) = spend.filter(|s| *s > 0.0) else {
        return MetricValue::NotApplicable;
    };
    let new_customers = identity_col
        .map(|col| distinct_non_missing(view, col))
        .unwrap_or_else(|| view.len());
    if new_customers == 0 {
        return MetricValue::NotApplicable;
    }
    MetricValue::Money(spend / new_customers as f64)
}

/// Male/female percentages over non-missing gender values only.
fn gender_split(view: &FilteredView<'_>) -> Option<(f64, f64)> {
    let col = find_column(view.dataset, ColumnRole::Gender)?;
    let mut male = 0usize;
    let mut female = 0usize;
    let mut known = 0usize;
    for record in view.records() {
        let Some(text) = record.values[col].as_text() else {
            continue;
        };
        known += 1;
        match text.trim().to_uppercase().as_str() {
            "M" | "MALE" | "MAN" => male += 1,
            "F" | "FEMALE" | "WOMAN" => female += 1,
            _ => {}
        }
    }
    if known == 0 {
        return None;
    }
    Some((
        round1(male as f64 / known as f64 * 100.0),
        round1(female as f64 / known as f64 * 100.0),
    ))
}

/// Most frequent non-missing value; ties keep the first-encountered value.
fn top_value(view: &FilteredView<'_>, role: ColumnRole) -> Option<String> {
    let col = find_column(view.dataset, role)?;
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for record in view.records() {
        let value = &record.values[col];
        if value.is_missing() {
            continue;
        }
        *counts.entry(value.display()).or_insert(0) += 1;
    }
    let mut best: Option<(&String, usize)> = None;
    for (value, count) in &counts {
        // Insertion order breaks ties, so the first-seen value wins.
        if best.map_or(true, |(_, c)| *count > c) {
            best = Some((value, *count));
        }
    }
    best.map(|(value, _)| value.clone())
}

fn distinct_non_missing(view: &FilteredView<'_>, col: usize) -> usize {
    let mut seen: rustc_hash::FxHashSet<String> = rustc_hash::FxHashSet::default();
    for record in view.records() {
        let value = &record.values[col];
        if !value.is_missing() {
            seen.insert(value.display());
        }
    }
    seen.len()
}

/// Row counts bucketed over the date column: daily for short spans, weekly
/// past 60 days.
fn activity_over_time(view: &FilteredView<'_>) -> Option<ChartSeries> {
    let col = find_column(view.dataset, ColumnRole::Date)?;
    let mut dates: Vec<NaiveDate> = view
        .records()
        .filter_map(|r| r.values[col].as_date())
        .collect();
    if dates.is_empty() {
        return None;
    }
    dates.sort_unstable();
    let span_days = (*dates.last().unwrap() - dates[0]).num_days();
    let weekly = span_days > 60;
    let mut buckets: IndexMap<NaiveDate, usize> = IndexMap::new();
    for date in dates {
        let bucket = if weekly {
            date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
        } else {
            date
        };
        *buckets.entry(bucket).or_insert(0) += 1;
    }
    buckets.sort_keys();
    Some(ChartSeries {
        name: if weekly {
            "activity_weekly".to_string()
        } else {
            "activity_daily".to_string()
        },
        points: buckets
            .into_iter()
            .map(|(date, count)| ChartPoint {
                label: date.format("%Y-%m-%d").to_string(),
                value: count as f64,
            })
            .collect(),
    })
}

/// Top channels by revenue when revenue is present, else by row count.
fn channel_performance(
    view: &FilteredView<'_>,
    revenue_col: Option<usize>,
) -> Option<ChartSeries> {
    let col = find_column(view.dataset, ColumnRole::Channel)
        .or_else(|| find_categorical_fallback(view.dataset))?;
    let mut totals: IndexMap<String, f64> = IndexMap::new();
    for record in view.records() {
        let Some(channel) = record.values[col].as_text() else {
            continue;
        };
        let weight = match revenue_col {
            Some(rcol) => cell_amount(&record.values[rcol]),
            None => 1.0,
        };
        *totals.entry(channel.trim().to_string()).or_insert(0.0) += weight;
    }
    if totals.is_empty() {
        return None;
    }
    let mut entries: Vec<(String, f64)> = totals.into_iter().collect();
    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    entries.truncate(TOP_CHANNELS);
    Some(ChartSeries {
        name: if revenue_col.is_some() {
            "channel_revenue".to_string()
        } else {
            "channel_conversions".to_string()
        },
        points: entries
            .into_iter()
            .map(|(label, value)| ChartPoint { label, value })
            .collect(),
    })
}

/// Percentage breakdown of a demographic column over non-missing values.
fn distribution_chart(view: &FilteredView<'_>, role: ColumnRole) -> Option<ChartSeries> {
    let col = find_column(view.dataset, role)?;
    let mut counts: IndexMap<String, usize> = IndexMap::new();
    let mut known = 0usize;
    for record in view.records() {
        let value = &record.values[col];
        if value.is_missing() {
            continue;
        }
        known += 1;
        *counts.entry(value.display()).or_insert(0) += 1;
    }
    if known == 0 {
        return None;
    }
    let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    let name = match role {
        ColumnRole::Gender => "gender_breakdown",
        ColumnRole::Age => "age_breakdown",
        ColumnRole::Income => "income_breakdown",
        _ => "breakdown",
    };
    Some(ChartSeries {
        name: name.to_string(),
        points: entries
            .into_iter()
            .map(|(label, count)| ChartPoint {
                label,
                value: round1(count as f64 / known as f64 * 100.0),
            })
            .collect(),
    })
}

/// First occurrence of an identity is "new", later ones "returning",
/// bucketed by day over the date column when one exists, otherwise a
/// single overall bucket.
fn new_vs_returning(
    view: &FilteredView<'_>,
    identity_col: Option<usize>,
) -> Option<Vec<ChartSeries>> {
    let identity_col = identity_col?;
    let date_col = find_column(view.dataset, ColumnRole::Date);
    let mut rows: Vec<(Option<NaiveDate>, String)> = view
        .records()
        .filter_map(|r| {
            let identity = &r.values[identity_col];
            if identity.is_missing() {
                return None;
            }
            let date = date_col.and_then(|c| r.values[c].as_date());
            Some((date, identity.display()))
        })
        .collect();
    if rows.is_empty() {
        return None;
    }
    rows.sort_by_key(|(date, _)| *date);
    let mut seen: rustc_hash::FxHashSet<String> = rustc_hash::FxHashSet::default();
    let mut new_buckets: IndexMap<String, f64> = IndexMap::new();
    let mut returning_buckets: IndexMap<String, f64> = IndexMap::new();
    for (date, identity) in rows {
        let label = date
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "all".to_string());
        if seen.insert(identity) {
            *new_buckets.entry(label).or_insert(0.0) += 1.0;
        } else {
            *returning_buckets.entry(label).or_insert(0.0) += 1.0;
        }
    }
    let to_series = |name: &str, buckets: IndexMap<String, f64>| ChartSeries {
        name: name.to_string(),
        points: buckets
            .into_iter()
            .map(|(label, value)| ChartPoint { label, value })
            .collect(),
    };
    Some(vec![
        to_series("new_customers", new_buckets),
        to_series("returning_customers", returning_buckets),
    ])
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
