use once_cell::sync::Lazy;
use regex::Regex;

/// Placeholder for any field that could not be determined.
pub const NOT_AVAILABLE: &str = "N/A";

// Ordered: worded amounts before abbreviated ones before bare dollar figures,
// so "$2.3 billion" is not clipped to "$2.3 b" by a shorter pattern.
static CURRENCY_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\$\s?[\d,]+(?:\.\d+)?\s*(?:[Bb]illion|[Mm]illion|[Tt]rillion)",
        r"\$\s?[\d,]+(?:\.\d+)?\s*[BbMmTt]\b",
        r"\$\s?[\d,]+(?:\.\d+)?",
        r"(?i)\b[\d,]+(?:\.\d+)?\s*(?:billion|million|trillion)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("currency pattern"))
    .collect()
});

static PERCENTAGE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\d+(?:\.\d+)?\s?%",
        r"(?i)\b\d+(?:\.\d+)?\s*percent\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("percentage pattern"))
    .collect()
});

static REVENUE_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([\d,]+(?:\.\d+)?)\s*(billion|million|trillion|[bmt]\b)?").expect("revenue value pattern")
});

static SHARE_VALUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:%|percent)").expect("share value pattern")
});

/// Returns the first currency-looking substring verbatim, or "N/A".
///
/// Pattern order decides ties; this is a heuristic over free text, not a
/// parser, and it can pick up an unrelated figure in the same paragraph.
pub fn extract_currency(text: &str) -> String {
    for pattern in CURRENCY_PATTERNS.iter() {
        if let Some(m) = pattern.find(text) {
            return m.as_str().trim().to_string();
        }
    }
    NOT_AVAILABLE.to_string()
}

/// Returns the first percentage-looking substring verbatim, or "N/A".
pub fn extract_percentage(text: &str) -> String {
    for pattern in PERCENTAGE_PATTERNS.iter() {
        if let Some(m) = pattern.find(text) {
            return m.as_str().trim().to_string();
        }
    }
    NOT_AVAILABLE.to_string()
}

/// Derives a numeric revenue in billions of USD from a stored revenue string
/// like "$31.797B" or "$540 million". Computed on demand, never stored.
pub fn revenue_in_billions(revenue: &str) -> Option<f64> {
    if revenue.trim().is_empty() || revenue == NOT_AVAILABLE {
        return None;
    }

    let caps = REVENUE_VALUE.captures(revenue)?;
    let number: f64 = caps.get(1)?.as_str().replace(',', "").parse().ok()?;
    let unit = caps.get(2).map(|m| m.as_str().to_lowercase());

    match unit.as_deref() {
        Some("billion") | Some("b") => Some(number),
        Some("trillion") | Some("t") => Some(number * 1000.0),
        Some("million") | Some("m") => Some(number / 1000.0),
        // Bare figures above 1000 are almost always quoted in millions.
        _ if number > 1000.0 => Some(number / 1000.0),
        _ => Some(number),
    }
}

/// Derives a market-share fraction (0.0..=1.0) from a string like "18%".
pub fn share_fraction(share: &str) -> Option<f64> {
    if share.trim().is_empty() || share == NOT_AVAILABLE {
        return None;
    }

    let caps = SHARE_VALUE.captures(share)?;
    let number: f64 = caps.get(1)?.as_str().parse().ok()?;
    Some(number / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_worded_amount() {
        let text = "Acme Robotics reported revenue of $2.3 billion last year.";
        assert_eq!(extract_currency(text), "$2.3 billion");
    }

    #[test]
    fn test_currency_abbreviated_amount() {
        assert_eq!(extract_currency("FY2023 revenue: $31.797B (up 7%)"), "$31.797B");
        assert_eq!(extract_currency("raised $540M in funding"), "$540M");
    }

    #[test]
    fn test_currency_returns_substring_not_normalized() {
        // The verbatim match is kept, commas and all.
        assert_eq!(extract_currency("totaled $1,234.5 million"), "$1,234.5 million");
    }

    #[test]
    fn test_currency_without_dollar_sign() {
        assert_eq!(extract_currency("revenue of 2.3 billion in 2023"), "2.3 billion");
    }

    #[test]
    fn test_currency_pattern_order() {
        // Worded amount wins over the bare dollar figure later in the text.
        let text = "spent $12 on fees while earning $5.1 billion overall";
        assert_eq!(extract_currency(text), "$5.1 billion");
    }

    #[test]
    fn test_currency_no_match_is_sentinel() {
        assert_eq!(extract_currency("no financials were disclosed"), NOT_AVAILABLE);
        assert_eq!(extract_currency(""), NOT_AVAILABLE);
    }

    #[test]
    fn test_percentage_basic() {
        assert_eq!(extract_percentage("holds an 18% market share"), "18%");
        assert_eq!(extract_percentage("grew 4.5 % year over year"), "4.5 %");
    }

    #[test]
    fn test_percentage_worded() {
        assert_eq!(extract_percentage("roughly 12 percent of the market"), "12 percent");
    }

    #[test]
    fn test_percentage_no_match_is_sentinel() {
        assert_eq!(extract_percentage("a dominant player"), NOT_AVAILABLE);
    }

    #[test]
    fn test_revenue_in_billions() {
        assert_eq!(revenue_in_billions("$31.797B"), Some(31.797));
        assert_eq!(revenue_in_billions("$2.3 billion"), Some(2.3));
        assert_eq!(revenue_in_billions("$540 million"), Some(0.54));
        assert_eq!(revenue_in_billions("1.2 trillion"), Some(1200.0));
    }

    #[test]
    fn test_revenue_bare_number_assumed_millions_when_large() {
        assert_eq!(revenue_in_billions("$5,400"), Some(5.4));
        assert_eq!(revenue_in_billions("$3"), Some(3.0));
    }

    #[test]
    fn test_revenue_sentinel_and_garbage() {
        assert_eq!(revenue_in_billions(NOT_AVAILABLE), None);
        assert_eq!(revenue_in_billions(""), None);
        assert_eq!(revenue_in_billions("undisclosed"), None);
    }

    #[test]
    fn test_share_fraction() {
        assert_eq!(share_fraction("18%"), Some(0.18));
        assert_eq!(share_fraction("45.52%"), Some(0.4552));
        assert_eq!(share_fraction("7 percent"), Some(0.07));
        assert_eq!(share_fraction(NOT_AVAILABLE), None);
        assert_eq!(share_fraction("most of the market"), None);
    }
}
