use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::columns::{find_column, ColumnRole};
use crate::dataset::{Dataset, Record, Value};

/// Active predicates, one per category. An empty category means "no
/// restriction", never "exclude all". Values within a category are OR'd;
/// categories are AND'd.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub channels: Vec<String>,
    pub campaigns: Vec<String>,
    pub gender: Vec<String>,
    pub age: Vec<String>,
    pub income: Vec<String>,
    pub net_worth: Vec<String>,
    pub credit: Vec<String>,
    pub homeowner: Vec<String>,
    pub married: Vec<String>,
    pub children: Vec<String>,
    pub state: Vec<String>,
    /// Equality against a caller-named column.
    pub custom: Option<CustomFilter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFilter {
    pub column: String,
    pub value: String,
}

impl FilterSpec {
    pub fn is_empty(&self) -> bool {
        self.date_range.is_none()
            && self.custom.is_none()
            && self.multi_selects().iter().all(|(_, v)| v.is_empty())
    }

    fn multi_selects(&self) -> [(ColumnRole, &[String]); 11] {
        [
            (ColumnRole::Channel, &self.channels),
            (ColumnRole::Campaign, &self.campaigns),
            (ColumnRole::Gender, &self.gender),
            (ColumnRole::Age, &self.age),
            (ColumnRole::Income, &self.income),
            (ColumnRole::NetWorth, &self.net_worth),
            (ColumnRole::Credit, &self.credit),
            (ColumnRole::Homeowner, &self.homeowner),
            (ColumnRole::Married, &self.married),
            (ColumnRole::Children, &self.children),
            (ColumnRole::State, &self.state),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterWarning {
    /// A custom filter referenced a column the dataset does not have.
    UnknownColumn(String),
}

/// Read-only view over the records satisfying a FilterSpec. Holds record
/// positions rather than copies; the dataset itself is never touched.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    pub dataset: &'a Dataset,
    pub indices: Vec<usize>,
    pub warnings: Vec<FilterWarning>,
}

impl<'a> FilteredView<'a> {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &'a Record> + '_ {
        self.indices.iter().map(|&i| &self.dataset.records[i])
    }

    pub fn row_ids(&self) -> Vec<u32> {
        self.records().map(|r| r.row_id).collect()
    }
}

/// One resolved predicate ready to test against a record.
enum Predicate {
    DateRange {
        col: usize,
        start: NaiveDate,
        end: NaiveDate,
    },
    OneOf {
        col: usize,
        values: Vec<String>,
    },
    Equals {
        col: usize,
        value: String,
    },
}

impl Predicate {
    fn matches(&self, record: &Record) -> bool {
        match self {
            Predicate::DateRange { col, start, end } => match record.values[*col].as_date() {
                // Inclusive bounds; a missing date never matches an active
                // date filter.
                Some(d) => d >= *start && d <= *end,
                None => false,
            },
            Predicate::OneOf { col, values } => {
                let cell = canonical(&record.values[*col]);
                !cell.is_empty() && values.iter().any(|v| *v == cell)
            }
            Predicate::Equals { col, value } => canonical(&record.values[*col]) == *value,
        }
    }
}

fn canonical(value: &Value) -> String {
    value.display().trim().to_uppercase()
}

/// Pure single pass over the dataset: resolve each active category to a
/// column once, then test records, short-circuiting on the first failing
/// category.
pub fn apply_filter<'a>(dataset: &'a Dataset, spec: &FilterSpec) -> FilteredView<'a> {
    let mut predicates = Vec::new();
    let mut warnings = Vec::new();
    let mut exclude_all = false;

    if let Some((start, end)) = spec.date_range {
        match find_column(dataset, ColumnRole::Date) {
            Some(col) => predicates.push(Predicate::DateRange { col, start, end }),
            // No date column at all: an active date filter matches nothing.
            None => exclude_all = true,
        }
    }
    for (role, values) in spec.multi_selects() {
        if values.is_empty() {
            continue;
        }
        match find_column(dataset, role) {
            Some(col) => predicates.push(Predicate::OneOf {
                col,
                values: values.iter().map(|v| v.trim().to_uppercase()).collect(),
            }),
            None => {
                tracing::debug!(?role, "filter category has no matching column, skipping");
            }
        }
    }
    if let Some(custom) = &spec.custom {
        match dataset.column_index(&custom.column) {
            Some(col) => predicates.push(Predicate::Equals {
                col,
                value: custom.value.trim().to_uppercase(),
            }),
            None => {
                warnings.push(FilterWarning::UnknownColumn(custom.column.clone()));
                exclude_all = true;
            }
        }
    }

    let indices = if exclude_all {
        Vec::new()
    } else {
        dataset
            .records
            .iter()
            .enumerate()
            .filter(|(_, record)| predicates.iter().all(|p| p.matches(record)))
            .map(|(i, _)| i)
            .collect()
    };

    FilteredView {
        dataset,
        indices,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetKind;
    use crate::ingest::RawTable;
    use crate::normalize::normalize_table;

    fn sample_dataset() -> Dataset {
        let headers = ["email", "gender", "state", "order_date", "source"];
        let rows: Vec<Vec<String>> = vec![
            vec!["a@x.com", "M", "CA", "2024-01-10", "organic"],
            vec!["b@x.com", "F", "NY", "2024-02-05", "paid"],
            vec!["c@x.com", "M", "CA", "2024-03-15", "paid"],
            vec!["d@x.com", "F", "TX", "", "referral"],
        ]
        .into_iter()
        .map(|r| r.into_iter().map(String::from).collect())
        .collect();
        let table = RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows,
        };
        normalize_table(table, DatasetKind::Buyers, None).0
    }

    #[test]
    fn empty_spec_is_identity() {
        let ds = sample_dataset();
        let view = apply_filter(&ds, &FilterSpec::default());
        assert_eq!(view.len(), ds.len());
        assert!(view.warnings.is_empty());
    }

    #[test]
    fn categories_and_together_values_or_together() {
        let ds = sample_dataset();
        let spec = FilterSpec {
            gender: vec!["m".to_string()],
            state: vec!["CA".to_string(), "TX".to_string()],
            ..FilterSpec::default()
        };
        let view = apply_filter(&ds, &spec);
        assert_eq!(view.row_ids(), vec![0, 2]);
    }

    #[test]
    fn complement_sets_do_not_overlap() {
        let ds = sample_dataset();
        let selected = apply_filter(
            &ds,
            &FilterSpec {
                gender: vec!["M".to_string()],
                ..FilterSpec::default()
            },
        );
        let complement = apply_filter(
            &ds,
            &FilterSpec {
                gender: vec!["F".to_string()],
                ..FilterSpec::default()
            },
        );
        for id in selected.row_ids() {
            assert!(!complement.row_ids().contains(&id));
        }
    }

    #[test]
    fn date_range_is_inclusive_and_excludes_missing_dates() {
        let ds = sample_dataset();
        let spec = FilterSpec {
            date_range: Some((
                NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                NaiveDate::from_ymd_opt(2024, 2, 5).unwrap(),
            )),
            ..FilterSpec::default()
        };
        let view = apply_filter(&ds, &spec);
        // Rows 0 and 1 fall on the bounds; row 3 has no date and never
        // matches an active date filter.
        assert_eq!(view.row_ids(), vec![0, 1]);
    }

    #[test]
    fn unknown_custom_column_yields_empty_view_with_warning() {
        let ds = sample_dataset();
        let spec = FilterSpec {
            custom: Some(CustomFilter {
                column: "no_such_column".to_string(),
                value: "x".to_string(),
            }),
            ..FilterSpec::default()
        };
        let view = apply_filter(&ds, &spec);
        assert!(view.is_empty());
        assert_eq!(
            view.warnings,
            vec![FilterWarning::UnknownColumn("no_such_column".to_string())]
        );
    }

    #[test]
    fn custom_equality_matches_case_insensitively() {
        let ds = sample_dataset();
        let spec = FilterSpec {
            custom: Some(CustomFilter {
                column: "source".to_string(),
                value: "PAID".to_string(),
            }),
            ..FilterSpec::default()
        };
        let view = apply_filter(&ds, &spec);
        assert_eq!(view.row_ids(), vec![1, 2]);
    }
}
