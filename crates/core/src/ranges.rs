use once_cell::sync::Lazy;
use regex::Regex;

static NUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[-+]?\d+(?:\.\d+)?").expect("valid regex"));

/// Parse marketing-style numeric text: plain numbers, currency, suffix
/// multipliers ("1.5 Million", "50k"), and bracket shapes ("Under 50k",
/// "100k and Over", "50k to 100k" -> midpoint). Unparseable input yields
/// 0, matching how the dashboards treat junk cells.
pub fn parse_range_or_number(raw: &str) -> f64 {
    let cleaned = raw
        .trim()
        .to_lowercase()
        .replace('$', "")
        .replace(',', "");
    if cleaned.is_empty() || cleaned == "none" || cleaned == "nan" {
        return 0.0;
    }

    if let Some(rest) = cleaned.strip_prefix("under") {
        return scaled_number(rest).map(|n| n / 2.0).unwrap_or(0.0);
    }
    if cleaned.contains("and over") || cleaned.contains("andover") || cleaned.contains("over") {
        let rest = cleaned
            .replace("and over", "")
            .replace("andover", "")
            .replace("over", "");
        return scaled_number(&rest).map(|n| n * 1.5).unwrap_or(0.0);
    }
    if let Some((low, high)) = cleaned.split_once(" to ") {
        if let (Some(low), Some(high)) = (scaled_number(low), scaled_number(high)) {
            return (low + high) / 2.0;
        }
        return 0.0;
    }
    if let Some(n) = scaled_number(&cleaned) {
        return n;
    }
    // Last resort: keep digits and dots only.
    let digits: String = cleaned
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    digits.parse::<f64>().unwrap_or(0.0)
}

/// "1.5 million" -> 1_500_000; "50k" -> 50_000; "42" -> 42.
fn scaled_number(text: &str) -> Option<f64> {
    let text = text.trim();
    let m = NUM_RE.find(text)?;
    if m.start() != 0 {
        return None;
    }
    let number: f64 = m.as_str().parse().ok()?;
    let suffix = text[m.end()..].trim();
    Some(number * multiplier(suffix))
}

fn multiplier(suffix: &str) -> f64 {
    match suffix {
        "thousand" | "k" => 1e3,
        "million" | "m" | "mil" => 1e6,
        "billion" | "b" | "bil" => 1e9,
        "trillion" | "t" => 1e12,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_numbers_and_currency() {
        assert_eq!(parse_range_or_number("42"), 42.0);
        assert_eq!(parse_range_or_number("$1,250.50"), 1250.5);
    }

    #[test]
    fn suffix_multipliers() {
        assert_eq!(parse_range_or_number("50k"), 50_000.0);
        assert_eq!(parse_range_or_number("1.5 Million"), 1_500_000.0);
        assert_eq!(parse_range_or_number("2 b"), 2e9);
    }

    #[test]
    fn under_halves_the_bound() {
        assert_eq!(parse_range_or_number("Under 50k"), 25_000.0);
    }

    #[test]
    fn over_scales_up() {
        assert_eq!(parse_range_or_number("100k and Over"), 150_000.0);
    }

    #[test]
    fn range_takes_midpoint() {
        assert_eq!(parse_range_or_number("$50k to $100k"), 75_000.0);
        assert_eq!(parse_range_or_number("1 million to 3 million"), 2e6);
    }

    #[test]
    fn junk_yields_zero() {
        assert_eq!(parse_range_or_number(""), 0.0);
        assert_eq!(parse_range_or_number("none"), 0.0);
        assert_eq!(parse_range_or_number("n/a"), 0.0);
    }
}
