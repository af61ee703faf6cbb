use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::dataset::{Column, Dataset, DatasetKind, Record, Value, ValueKind};
use crate::ingest::RawTable;

/// Share of non-empty values that must parse as a type before the column is
/// typed that way.
const INFER_THRESHOLD: f64 = 0.8;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y", "%d %b %Y"];

/// Caller-supplied mapping from source headers to canonical field names,
/// e.g. "Email Address" -> "email". Headers without an entry fall back to
/// mechanical canonicalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColumnMapping(IndexMap<String, String>);

impl ColumnMapping {
    pub fn from_pairs<I, S, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into().to_lowercase(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, source_header: &str) -> Option<&str> {
        self.0
            .get(&source_header.trim().to_lowercase())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizeReport {
    pub deduped: u64,
}

/// Canonicalize a header: trim, lowercase, collapse whitespace and
/// punctuation runs into single underscores.
pub fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_sep = true;
    for ch in raw.trim().chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            prev_sep = false;
        } else if !prev_sep {
            out.push('_');
            prev_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Turn raw rows into a typed Dataset: canonical headers, one inferred type
/// per column, missing sentinels with a per-record flag, and keep-first
/// exact dedup. Deterministic: same table and mapping always produce the
/// same dataset.
pub fn normalize_table(
    table: RawTable,
    kind: DatasetKind,
    mapping: Option<&ColumnMapping>,
) -> (Dataset, NormalizeReport) {
    let names = canonical_names(&table.headers, mapping);
    let kinds: Vec<ValueKind> = (0..names.len())
        .map(|idx| infer_column_kind(&table.rows, idx))
        .collect();
    let columns: Vec<Column> = names
        .into_iter()
        .zip(kinds.iter().copied())
        .map(|(name, kind)| Column { name, kind })
        .collect();

    let mut seen: FxHashSet<Vec<u8>> = FxHashSet::default();
    let mut records = Vec::with_capacity(table.rows.len());
    let mut deduped = 0u64;
    for (row_idx, row) in table.rows.iter().enumerate() {
        let values: Vec<Value> = kinds
            .iter()
            .enumerate()
            .map(|(col, kind)| type_cell(row.get(col).map(String::as_str), *kind))
            .collect();
        if !seen.insert(record_key(&values)) {
            deduped += 1;
            continue;
        }
        let has_missing = values.iter().any(Value::is_missing);
        records.push(Record {
            row_id: row_idx as u32,
            has_missing,
            values,
        });
    }

    (
        Dataset {
            kind,
            columns,
            records,
        },
        NormalizeReport { deduped },
    )
}

fn canonical_names(headers: &[String], mapping: Option<&ColumnMapping>) -> Vec<String> {
    let mut used: FxHashSet<String> = FxHashSet::default();
    headers
        .iter()
        .enumerate()
        .map(|(idx, raw)| {
            let base = mapping
                .and_then(|m| m.get(raw))
                .map(str::to_string)
                .unwrap_or_else(|| normalize_header(raw));
            let base = if base.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                base
            };
            let mut name = base.clone();
            let mut suffix = 2usize;
            while !used.insert(name.clone()) {
                name = format!("{base}_{suffix}");
                suffix += 1;
            }
            name
        })
        .collect()
}

fn infer_column_kind(rows: &[Vec<String>], col: usize) -> ValueKind {
    let mut non_empty = 0usize;
    let mut numeric = 0usize;
    let mut dates = 0usize;
    for row in rows {
        let Some(cell) = row.get(col) else { continue };
        let cell = cell.trim();
        if cell.is_empty() {
            continue;
        }
        non_empty += 1;
        if parse_plain_number(cell).is_some() {
            numeric += 1;
        } else if parse_date(cell).is_some() {
            dates += 1;
        }
    }
    if non_empty == 0 {
        return ValueKind::Category;
    }
    let share = |count: usize| count as f64 / non_empty as f64;
    if share(numeric) >= INFER_THRESHOLD {
        ValueKind::Number
    } else if share(dates) >= INFER_THRESHOLD {
        ValueKind::Date
    } else {
        ValueKind::Category
    }
}

fn type_cell(raw: Option<&str>, kind: ValueKind) -> Value {
    let cell = raw.map(str::trim).unwrap_or("");
    if cell.is_empty() {
        return Value::Missing;
    }
    match kind {
        ValueKind::Number => parse_plain_number(cell)
            .map(Value::Number)
            .unwrap_or(Value::Missing),
        ValueKind::Date => parse_date(cell).map(Value::Date).unwrap_or(Value::Missing),
        ValueKind::Category => Value::Category(cell.to_string()),
    }
}

pub(crate) fn parse_plain_number(cell: &str) -> Option<f64> {
    let cleaned = cell.trim().trim_start_matches('$').replace(',', "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub(crate) fn parse_date(cell: &str) -> Option<NaiveDate> {
    let cell = cell.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(cell) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(cell, fmt) {
            return Some(dt.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(cell, fmt) {
            return Some(d);
        }
    }
    None
}

/// Exact-identity key over all canonical fields. Byte-level so numeric
/// equality is bit equality, not formatting equality.
fn record_key(values: &[Value]) -> Vec<u8> {
    let mut key = Vec::with_capacity(values.len() * 8);
    for value in values {
        match value {
            Value::Number(n) => {
                key.push(0);
                key.extend_from_slice(&n.to_bits().to_le_bytes());
            }
            Value::Date(d) => {
                key.push(1);
                key.extend_from_slice(d.format("%Y%m%d").to_string().as_bytes());
            }
            Value::Category(s) => {
                key.push(2);
                key.extend_from_slice(s.as_bytes());
            }
            Value::Missing => key.push(3),
        }
        key.push(0x1f);
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn headers_are_canonicalized() {
        assert_eq!(normalize_header("  Email Address "), "email_address");
        assert_eq!(normalize_header("Net-Worth ($)"), "net_worth");
        assert_eq!(normalize_header("UTM  Source"), "utm_source");
    }

    #[test]
    fn explicit_mapping_wins_over_canonicalization() {
        let mapping = ColumnMapping::from_pairs([("Email Address", "email")]);
        let t = table(&["Email Address", "Order Date"], &[&["a@b.c", "2024-01-01"]]);
        let (ds, _) = normalize_table(t, DatasetKind::Buyers, Some(&mapping));
        assert_eq!(ds.columns[0].name, "email");
        assert_eq!(ds.columns[1].name, "order_date");
    }

    #[test]
    fn numeric_and_date_columns_are_inferred() {
        let t = table(
            &["amount", "when", "label"],
            &[
                &["$1,200", "2024-01-02", "a"],
                &["15.5", "2024-02-03", "b"],
                &["900", "2024-03-04", "c"],
            ],
        );
        let (ds, _) = normalize_table(t, DatasetKind::Buyers, None);
        assert_eq!(ds.columns[0].kind, ValueKind::Number);
        assert_eq!(ds.columns[1].kind, ValueKind::Date);
        assert_eq!(ds.columns[2].kind, ValueKind::Category);
        assert_eq!(ds.records[0].values[0], Value::Number(1200.0));
    }

    #[test]
    fn missing_cells_become_sentinels_and_flag_the_record() {
        let t = table(&["a", "b"], &[&["x", ""], &["y", "z"]]);
        let (ds, _) = normalize_table(t, DatasetKind::Visitors, None);
        assert_eq!(ds.records[0].values[1], Value::Missing);
        assert!(ds.records[0].has_missing);
        assert!(!ds.records[1].has_missing);
    }

    #[test]
    fn exact_duplicates_keep_first_occurrence() {
        let t = table(
            &["email", "state"],
            &[&["a@b.c", "CA"], &["a@b.c", "CA"], &["a@b.c", "NY"]],
        );
        let (ds, report) = normalize_table(t, DatasetKind::Buyers, None);
        assert_eq!(ds.len(), 2);
        assert_eq!(report.deduped, 1);
        assert_eq!(ds.records[0].row_id, 0);
        assert_eq!(ds.records[1].row_id, 2);
    }

    #[test]
    fn dedup_is_idempotent() {
        let t = table(&["email"], &[&["a@b.c"], &["a@b.c"], &["x@y.z"]]);
        let (first, report) = normalize_table(t, DatasetKind::Buyers, None);
        assert_eq!(report.deduped, 1);
        let again = RawTable {
            headers: first.columns.iter().map(|c| c.name.clone()).collect(),
            rows: first
                .records
                .iter()
                .map(|r| r.values.iter().map(Value::display).collect())
                .collect(),
        };
        let (second, report2) = normalize_table(again, DatasetKind::Buyers, None);
        assert_eq!(report2.deduped, 0);
        assert_eq!(second.len(), first.len());
    }

    #[test]
    fn duplicate_headers_get_suffixes() {
        let t = table(&["email", "Email"], &[&["a", "b"]]);
        let (ds, _) = normalize_table(t, DatasetKind::Buyers, None);
        assert_eq!(ds.columns[0].name, "email");
        assert_eq!(ds.columns[1].name, "email_2");
    }
}
