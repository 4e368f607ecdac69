use crate::aggregate::Table;
use crate::extract;
use serde::Serialize;
use std::collections::BTreeMap;

/// Summary block returned to the client; field names match what the
/// dashboard expects.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSummary {
    pub key_findings: Vec<String>,
    pub opportunities: Vec<String>,
    pub threats: Vec<String>,
    pub market_position: String,
    pub recommendations: Vec<String>,
    pub charts: BTreeMap<String, String>,
}

impl AnalysisSummary {
    pub fn with_finding(finding: impl Into<String>) -> Self {
        AnalysisSummary {
            key_findings: vec![finding.into()],
            ..Default::default()
        }
    }
}

/// Degenerate competitor names left behind by failed research.
pub fn has_placeholder_names(table: &Table) -> bool {
    match table.column_values("name") {
        Some(names) => names.iter().any(|n| {
            let lower = n.to_lowercase();
            lower.contains("competitor 1") || lower.contains("placeholder")
        }),
        None => false,
    }
}

fn numeric_column<F>(table: &Table, column: &str, parse: F) -> Vec<(String, f64, String)>
where
    F: Fn(&str) -> Option<f64>,
{
    let name_col = match table.column("name") {
        Some(idx) => idx,
        None => return Vec::new(),
    };
    let value_col = match table.column(column) {
        Some(idx) => idx,
        None => return Vec::new(),
    };

    let mut values = Vec::new();
    for row in 0..table.len() {
        let raw = table.cell(row, value_col);
        if let Some(parsed) = parse(raw) {
            values.push((table.cell(row, name_col).to_string(), parsed, raw.to_string()));
        }
    }
    values
}

fn value_counts(table: &Table, column: &str) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    if let Some(values) = table.column_values(column) {
        for value in values {
            if value.is_empty() {
                continue;
            }
            *counts.entry(value.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// Revenue rows with a parseable figure, as (name, billions, verbatim).
pub fn revenue_data(table: &Table) -> Vec<(String, f64, String)> {
    numeric_column(table, "revenue", extract::revenue_in_billions)
}

/// Market-share rows with a parseable figure, as (name, fraction, verbatim).
pub fn market_share_data(table: &Table) -> Vec<(String, f64, String)> {
    numeric_column(table, "market_share", extract::share_fraction)
}

/// Derives the summary from the loaded aggregate. Missing columns or
/// unparseable figures drop the related findings instead of erroring.
pub fn summarize(table: &Table, company: &str, industry: &str) -> AnalysisSummary {
    let revenue = revenue_data(table);
    let shares = market_share_data(table);
    let pricing_models = value_counts(table, "pricing_model");
    let audiences = value_counts(table, "target_audience");

    let mut key_findings = vec![format!(
        "{} operates in a highly competitive {} market with {} major competitors.",
        company,
        industry,
        table.len()
    )];

    if let Some(top) = revenue.iter().max_by(|a, b| a.1.total_cmp(&b.1)) {
        let avg = revenue.iter().map(|r| r.1).sum::<f64>() / revenue.len() as f64;
        key_findings.push(format!(
            "Revenue analysis: Average competitor revenue is ${:.1}B, with {} leading at {}.",
            avg, top.0, top.2
        ));
    }

    if let Some(top) = shares.iter().max_by(|a, b| a.1.total_cmp(&b.1)) {
        key_findings.push(format!(
            "Market concentration: {} dominates with {} market share.",
            top.0, top.2
        ));
    }

    let mut opportunities = Vec::new();
    if pricing_models.len() > 1 {
        opportunities.push(format!(
            "Pricing diversification: Competitors use {} different pricing approaches.",
            pricing_models.len()
        ));
    }
    if audiences.len() > 1 {
        opportunities.push(format!(
            "Market segmentation: Competitors target {} distinct customer segments.",
            audiences.len()
        ));
    }
    opportunities.extend([
        format!("Technology differentiation: Leverage {}'s unique technical capabilities.", company),
        "Geographic expansion: Many competitors have limited global presence.".to_string(),
        "Feature innovation: Identify gaps in competitor offerings.".to_string(),
    ]);

    let mut threats = Vec::new();
    let high_share_count = shares.iter().filter(|s| s.1 > 0.20).count();
    if high_share_count > 0 {
        threats.push(format!(
            "Market concentration: {} competitors hold significant market share (>20%).",
            high_share_count
        ));
    }
    threats.extend([
        format!("Regulatory pressure: {} faces increasing compliance requirements.", industry),
        "Technology disruption: Rapid innovation creates constant competitive pressure.".to_string(),
        "Customer switching costs: Established competitors have strong customer lock-in.".to_string(),
    ]);

    let mut recommendations = Vec::new();
    if let Some(top) = revenue.iter().max_by(|a, b| a.1.total_cmp(&b.1)) {
        recommendations.push(format!(
            "Revenue optimization: Analyze pricing strategies of top revenue generators like {}.",
            top.0
        ));
    }
    if let Some(top) = shares.iter().max_by(|a, b| a.1.total_cmp(&b.1)) {
        recommendations.push(format!(
            "Market positioning: Focus on segments underserved by {}.",
            top.0
        ));
    }
    recommendations.extend([
        "Feature differentiation: Identify unique capabilities not offered by competitors.".to_string(),
        format!("Partnership strategy: Explore alliances with complementary {} players.", industry),
        "Technology investment: Maintain competitive advantage through innovation.".to_string(),
        "Customer experience: Focus on areas where competitors underperform.".to_string(),
    ]);

    let mut market_position = format!(
        "{} competes in the {} sector against {} major players. ",
        company,
        industry,
        table.len()
    );
    if !revenue.is_empty() {
        let min = revenue.iter().map(|r| r.1).fold(f64::INFINITY, f64::min);
        let max = revenue.iter().map(|r| r.1).fold(f64::NEG_INFINITY, f64::max);
        market_position.push_str(&format!(
            "The competitive landscape shows revenue ranging from ${:.1}B to ${:.1}B. ",
            min, max
        ));
    }
    if !shares.is_empty() {
        let leaders: Vec<&str> = shares.iter().take(2).map(|s| s.2.as_str()).collect();
        market_position.push_str(&format!(
            "Market concentration varies significantly, with top players holding {} market share. ",
            leaders.join(", ")
        ));
    }
    market_position.push_str(&format!(
        "Competitors use {} different pricing models and target {} distinct market segments, indicating opportunities for differentiation.",
        pricing_models.len(),
        audiences.len()
    ));

    AnalysisSummary {
        key_findings,
        opportunities,
        threats,
        market_position,
        recommendations,
        charts: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> Table {
        Table {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn test_placeholder_heuristic_does_not_trigger_on_real_names() {
        let t = table(
            &["name", "revenue"],
            &[&["Stripe", "$14B"], &["Adyen", "$1.6B"], &["Square", "$17.5B"]],
        );
        assert!(!has_placeholder_names(&t));
    }

    #[test]
    fn test_placeholder_heuristic_triggers_on_fallback_names() {
        let t = table(&["name"], &[&["Competitor 1"], &["Adyen"]]);
        assert!(has_placeholder_names(&t));

        let t = table(&["name"], &[&["placeholder company"]]);
        assert!(has_placeholder_names(&t));
    }

    #[test]
    fn test_placeholder_heuristic_without_name_column() {
        let t = table(&["revenue"], &[&["$1B"]]);
        assert!(!has_placeholder_names(&t));
    }

    #[test]
    fn test_summarize_without_revenue_column() {
        // No revenue column at all: derivation must not error and must not
        // invent a revenue range.
        let t = table(
            &["name", "market_share"],
            &[&["Stripe", "23%"], &["Adyen", "11%"]],
        );
        let summary = summarize(&t, "Acme", "Payments");

        assert!(summary.key_findings[0].contains("2 major competitors"));
        assert!(!summary.key_findings.iter().any(|f| f.contains("Revenue analysis")));
        assert!(!summary.market_position.contains("revenue ranging"));
        // Share-based findings still work.
        assert!(summary.key_findings.iter().any(|f| f.contains("Stripe dominates with 23%")));
    }

    #[test]
    fn test_summarize_with_unparseable_revenue_values() {
        let t = table(
            &["name", "revenue"],
            &[&["Alpha", "N/A"], &["Beta", "undisclosed"]],
        );
        let summary = summarize(&t, "Acme", "Robotics");
        assert!(!summary.key_findings.iter().any(|f| f.contains("Revenue analysis")));
    }

    #[test]
    fn test_summarize_full_table() {
        let t = table(
            &["name", "pricing_model", "target_audience", "revenue", "market_share"],
            &[
                &["Stripe", "Per-transaction", "Developers", "$14 billion", "23%"],
                &["Adyen", "Per-transaction", "Enterprises", "$1.6B", "11%"],
                &["Square", "Freemium", "SMBs", "$17.5B", "19%"],
            ],
        );
        let summary = summarize(&t, "Acme Pay", "Payments");

        assert!(summary.key_findings.iter().any(|f| f.contains("Square leading at $17.5B")));
        assert!(summary.threats.iter().any(|f| f.contains("1 competitors hold significant market share")));
        assert!(summary.opportunities.iter().any(|f| f.contains("2 different pricing approaches")));
        assert!(summary.market_position.contains("from $1.6B to $17.5B"));
    }
}
