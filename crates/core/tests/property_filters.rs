use proptest::prelude::*;

use leadnav_core::{
    apply_filter, compute_metrics, normalize_table, parse_range_or_number, DatasetKind,
    FilterSpec, MetricValue, MetricsInput, RawTable,
};

proptest! {
    #[test]
    fn range_parsing_is_always_finite(raw in ".{0,40}") {
        let value = parse_range_or_number(&raw);
        prop_assert!(value.is_finite());
    }

    #[test]
    fn shorthand_ranges_take_the_midpoint(low in 1u32..500, high in 500u32..5000) {
        let raw = format!("${low}k to ${high}k");
        let value = parse_range_or_number(&raw);
        let expected = (f64::from(low) + f64::from(high)) / 2.0 * 1000.0;
        prop_assert!((value - expected).abs() < 1e-6);
    }

    #[test]
    fn gender_filter_and_complement_never_overlap(rows in row_vec()) {
        let dataset = build_dataset(&rows);
        let male = FilterSpec {
            gender: vec!["M".to_string()],
            ..FilterSpec::default()
        };
        let female = FilterSpec {
            gender: vec!["F".to_string()],
            ..FilterSpec::default()
        };
        let ids_a = apply_filter(&dataset, &male).row_ids();
        let ids_b = apply_filter(&dataset, &female).row_ids();
        for id in &ids_a {
            prop_assert!(!ids_b.contains(id));
        }
        prop_assert!(ids_a.len() + ids_b.len() <= dataset.len());
    }

    #[test]
    fn percentages_stay_in_bounds(rows in row_vec()) {
        let dataset = build_dataset(&rows);
        let view = apply_filter(&dataset, &FilterSpec::default());
        let result = compute_metrics(&view, &MetricsInput::default());
        for value in result.kpis.values() {
            if let MetricValue::Percent(p) = value {
                prop_assert!(*p >= 0.0 && *p <= 100.0, "percent out of range: {p}");
            }
        }
        for chart in &result.charts {
            if chart.name.ends_with("_breakdown") {
                let sum: f64 = chart.points.iter().map(|p| p.value).sum();
                prop_assert!(sum <= 100.05, "breakdown sums past 100: {sum}");
            }
        }
    }
}

#[derive(Clone, Debug)]
struct RowSpec {
    user: u32,
    gender: u8,
    revenue: u32,
}

fn row_vec() -> impl Strategy<Value = Vec<RowSpec>> {
    prop::collection::vec(
        (0u32..40, 0u8..3, 0u32..1000).prop_map(|(user, gender, revenue)| RowSpec {
            user,
            gender,
            revenue,
        }),
        1..60,
    )
}

fn build_dataset(rows: &[RowSpec]) -> leadnav_core::Dataset {
    let table = RawTable {
        headers: vec![
            "email".to_string(),
            "gender".to_string(),
            "revenue".to_string(),
        ],
        rows: rows
            .iter()
            .map(|spec| {
                let gender = match spec.gender {
                    0 => "M",
                    1 => "F",
                    _ => "",
                };
                vec![
                    format!("user{}@example.com", spec.user),
                    gender.to_string(),
                    spec.revenue.to_string(),
                ]
            })
            .collect(),
    };
    normalize_table(table, DatasetKind::Buyers, None).0
}
