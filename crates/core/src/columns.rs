use rustc_hash::FxHashSet;

use crate::dataset::{Dataset, Value, ValueKind};

/// Logical fields the filter and metrics engines resolve against whatever
/// headers the upload actually carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Email,
    DeviceId,
    Revenue,
    Spend,
    OrderId,
    Date,
    Channel,
    Campaign,
    Gender,
    Age,
    Income,
    NetWorth,
    Credit,
    Homeowner,
    Married,
    Children,
    State,
}

impl ColumnRole {
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            ColumnRole::Email => &[
                "email",
                "personal_emails",
                "business_email",
                "user_email",
                "customer_email",
                "contact_email",
                "e_mail",
            ],
            ColumnRole::DeviceId => &[
                "hemsha256",
                "sha256_personal_email",
                "pixelid",
                "uuid",
                "device_id",
                "customer_id",
                "user_id",
            ],
            ColumnRole::Revenue => &[
                "revenue",
                "amount",
                "total",
                "price",
                "order_value",
                "purchase_amount",
                "transaction_amount",
                "sale_amount",
                "order_total",
                "cart_value",
            ],
            ColumnRole::Spend => &[
                "ad_spend",
                "marketing_cost",
                "campaign_cost",
                "advertising",
                "marketing_budget",
                "spend",
                "ad_cost",
            ],
            ColumnRole::OrderId => &["order_id", "order_number", "transaction_id", "invoice"],
            ColumnRole::Date => &[
                "date",
                "order_date",
                "visit_date",
                "timestamp",
                "created",
                "updated",
                "time",
            ],
            ColumnRole::Channel => &[
                "source",
                "utm_source",
                "traffic_source",
                "referrer",
                "channel",
                "medium",
                "utm_medium",
                "acquisition_channel",
            ],
            ColumnRole::Campaign => &["campaign", "utm_campaign", "campaign_name", "eventtype"],
            ColumnRole::Gender => &["gender", "sex", "customer_gender"],
            ColumnRole::Age => &["age", "age_range", "age_group", "agegroup", "age_bucket"],
            ColumnRole::Income => &[
                "income",
                "income_range",
                "annual_income",
                "household_income",
                "salary",
                "salary_range",
                "income_bracket",
            ],
            ColumnRole::NetWorth => &["net_worth", "networth", "wealth"],
            ColumnRole::Credit => &["credit", "credit_rating", "credit_score", "credit_range"],
            ColumnRole::Homeowner => &["homeowner", "home_owner", "owns_home", "housing"],
            ColumnRole::Married => &["married", "marital_status", "marital"],
            ColumnRole::Children => &["children", "has_children", "kids", "presence_of_children"],
            ColumnRole::State => &[
                "state",
                "personal_state",
                "company_state",
                "region",
                "province",
                "location_state",
                "address_state",
            ],
        }
    }

    /// Roles whose columns must be date-typed to count.
    fn requires_dates(self) -> bool {
        matches!(self, ColumnRole::Date)
    }
}

/// Resolve a role to a column index. Exact matches first, then partial
/// matches, both skipping URL-shaped and hash/id-shaped columns the way the
/// dashboard does; partial matches also skip high-cardinality columns,
/// which are almost always identifiers.
pub fn find_column(dataset: &Dataset, role: ColumnRole) -> Option<usize> {
    if dataset.is_empty() {
        return None;
    }
    for alias in role.aliases() {
        for (idx, column) in dataset.columns.iter().enumerate() {
            if column.name.to_lowercase() != *alias {
                continue;
            }
            if is_url_column(dataset, idx) || !role_accepts(dataset, role, idx) {
                continue;
            }
            return Some(idx);
        }
    }
    for alias in role.aliases() {
        for (idx, column) in dataset.columns.iter().enumerate() {
            if !column.name.to_lowercase().contains(alias) {
                continue;
            }
            if is_url_column(dataset, idx)
                || is_hash_or_id_column(dataset, idx)
                || !role_accepts(dataset, role, idx)
            {
                continue;
            }
            let cap = (dataset.len() / 2).min(100).max(1);
            if distinct_count(dataset, idx, cap + 1) > cap {
                continue;
            }
            return Some(idx);
        }
    }
    None
}

fn role_accepts(dataset: &Dataset, role: ColumnRole, idx: usize) -> bool {
    if role.requires_dates() {
        return dataset.column(idx).kind == ValueKind::Date;
    }
    true
}

/// A categorical column usable for channel-style grouping when no alias
/// matched: moderate cardinality, not an identifier, not a URL.
pub fn find_categorical_fallback(dataset: &Dataset) -> Option<usize> {
    for (idx, column) in dataset.columns.iter().enumerate() {
        if column.kind != ValueKind::Category {
            continue;
        }
        if is_url_column(dataset, idx) || is_hash_or_id_column(dataset, idx) {
            continue;
        }
        let unique = distinct_count(dataset, idx, 51);
        if unique > 2 && unique < 50 {
            return Some(idx);
        }
    }
    None
}

fn is_url_column(dataset: &Dataset, idx: usize) -> bool {
    let name = dataset.column(idx).name.to_lowercase();
    const NAME_HINTS: &[&str] = &["url", "link", "path", "domain", "website", "http", "www"];
    if NAME_HINTS.iter().any(|h| name.contains(h)) {
        return true;
    }
    first_sample(dataset, idx)
        .map(|sample| {
            let lower = sample.to_lowercase();
            ["http://", "https://", "www.", ".com/"]
                .iter()
                .any(|p| lower.contains(p))
        })
        .unwrap_or(false)
}

fn is_hash_or_id_column(dataset: &Dataset, idx: usize) -> bool {
    let name = dataset.column(idx).name.to_lowercase();
    const NAME_HINTS: &[&str] = &[
        "hash", "sha", "md5", "uuid", "guid", "_id", "hemsha", "pixelid", "sessionid", "token",
        "key",
    ];
    if NAME_HINTS.iter().any(|h| name.contains(h)) || name == "id" {
        return true;
    }
    let Some(sample) = first_sample(dataset, idx) else {
        return false;
    };
    let lower = sample.to_lowercase();
    if lower.len() > 20
        && lower
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == '-')
    {
        return true;
    }
    // UUID shape: 8-4-4-4-12 style dash groups.
    let parts: Vec<&str> = lower.split('-').collect();
    parts.len() >= 4 && parts.iter().all(|p| matches!(p.len(), 4 | 8 | 12))
}

fn first_sample(dataset: &Dataset, idx: usize) -> Option<String> {
    dataset
        .column_values(idx)
        .find(|v| !v.is_missing())
        .map(Value::display)
}

pub(crate) fn distinct_count(dataset: &Dataset, idx: usize, stop_at: usize) -> usize {
    let mut seen: FxHashSet<String> = FxHashSet::default();
    for value in dataset.column_values(idx) {
        if value.is_missing() {
            continue;
        }
        seen.insert(value.display());
        if seen.len() >= stop_at {
            break;
        }
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Column, DatasetKind, Record};

    fn dataset(cols: &[(&str, ValueKind)], rows: &[&[&str]]) -> Dataset {
        let columns = cols
            .iter()
            .map(|(name, kind)| Column {
                name: name.to_string(),
                kind: *kind,
            })
            .collect();
        let records = rows
            .iter()
            .enumerate()
            .map(|(i, row)| Record {
                row_id: i as u32,
                has_missing: false,
                values: row
                    .iter()
                    .map(|cell| {
                        if cell.is_empty() {
                            Value::Missing
                        } else {
                            Value::Category(cell.to_string())
                        }
                    })
                    .collect(),
            })
            .collect();
        Dataset {
            kind: DatasetKind::Buyers,
            columns,
            records,
        }
    }

    #[test]
    fn exact_alias_wins() {
        let ds = dataset(
            &[
                ("customer_gender", ValueKind::Category),
                ("gender", ValueKind::Category),
            ],
            &[&["M", "F"]],
        );
        assert_eq!(find_column(&ds, ColumnRole::Gender), Some(1));
    }

    #[test]
    fn partial_match_skips_hash_columns() {
        let ds = dataset(
            &[
                ("sha256_personal_email_hash", ValueKind::Category),
                ("contact_email_clean", ValueKind::Category),
            ],
            &[&["d988ab12373958b1aa2f", "a@b.c"]],
        );
        assert_eq!(find_column(&ds, ColumnRole::Email), Some(1));
    }

    #[test]
    fn url_columns_are_never_channels() {
        let ds = dataset(
            &[
                ("source_url", ValueKind::Category),
                ("traffic_source", ValueKind::Category),
            ],
            &[&["https://x.com/a", "organic"]],
        );
        assert_eq!(find_column(&ds, ColumnRole::Channel), Some(1));
    }

    #[test]
    fn missing_role_returns_none() {
        let ds = dataset(&[("name", ValueKind::Category)], &[&["Ann"]]);
        assert_eq!(find_column(&ds, ColumnRole::Revenue), None);
    }
}
