use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::LeadNavError;

/// Which of the two upload flavors a dataset came from. Buyers may carry
/// revenue columns; visitors never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetKind {
    Buyers,
    Visitors,
}

impl DatasetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Buyers => "buyers",
            DatasetKind::Visitors => "visitors",
        }
    }
}

impl std::str::FromStr for DatasetKind {
    type Err = LeadNavError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "buyers" => Ok(DatasetKind::Buyers),
            "visitors" => Ok(DatasetKind::Visitors),
            other => Err(LeadNavError::UnknownKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Number,
    Date,
    Category,
}

/// A typed cell. The variant is decided once during normalization and is
/// never re-inferred downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Number(f64),
    Date(NaiveDate),
    Category(String),
    Missing,
}

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Category(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Display form used in snippets and chart labels.
    pub fn display(&self) -> String {
        match self {
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::Category(s) => s.clone(),
            Value::Missing => String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ValueKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Synthetic row id assigned from source order, stable across dedup.
    pub row_id: u32,
    pub has_missing: bool,
    pub values: Vec<Value>,
}

/// Normalized dataset. Column set is identical across all records and the
/// record count never exceeds the ingest row cap. Engines take it by shared
/// reference and never mutate it; a new upload replaces it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub kind: DatasetKind,
    pub columns: Vec<Column>,
    pub records: Vec<Record>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        let lower = name.to_lowercase();
        self.columns
            .iter()
            .position(|c| c.name.to_lowercase() == lower)
    }

    pub fn column(&self, idx: usize) -> &Column {
        &self.columns[idx]
    }

    /// Values of one column across all records, in record order.
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.records.iter().map(move |r| &r.values[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Buyers".parse::<DatasetKind>().unwrap(), DatasetKind::Buyers);
        assert!("orders".parse::<DatasetKind>().is_err());
    }

    #[test]
    fn display_keeps_integers_clean() {
        assert_eq!(Value::Number(42.0).display(), "42");
        assert_eq!(Value::Number(1.5).display(), "1.5");
        assert_eq!(Value::Missing.display(), "");
    }
}
