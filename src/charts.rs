use crate::aggregate::Table;
use crate::progress;
use crate::report;
use anyhow::Result;
use plotters::element::Pie;
use plotters::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const REVENUE_CHART: &str = "revenue_comparison";
pub const MARKET_SHARE_CHART: &str = "market_share";
pub const PRICING_CHART: &str = "pricing_models";
pub const FEATURE_CHART: &str = "feature_matrix";

/// Every chart the pipeline can produce; also the GET /charts allowlist.
pub const CHART_NAMES: [&str; 4] = [REVENUE_CHART, MARKET_SHARE_CHART, PRICING_CHART, FEATURE_CHART];

// Feature keywords matched against the free-text key_features column.
const FEATURE_KEYWORDS: [&str; 12] = [
    "payment processing",
    "api",
    "mobile app",
    "web dashboard",
    "analytics",
    "fraud protection",
    "multi-currency",
    "instant payments",
    "recurring billing",
    "subscription",
    "marketplace",
    "e-commerce",
];

const BAR_BLUE: RGBColor = RGBColor(135, 206, 235);
const BAR_EDGE: RGBColor = RGBColor(25, 25, 112);
const HIGHLIGHT: RGBColor = RGBColor(255, 165, 0);
const BAR_GREEN: RGBColor = RGBColor(144, 238, 144);
const BAR_GREEN_EDGE: RGBColor = RGBColor(0, 100, 0);
const CELL_ON: RGBColor = RGBColor(60, 170, 90);
const CELL_OFF: RGBColor = RGBColor(225, 95, 85);

const PIE_PALETTE: [RGBColor; 8] = [
    RGBColor(102, 194, 165),
    RGBColor(252, 141, 98),
    RGBColor(141, 160, 203),
    RGBColor(231, 138, 195),
    RGBColor(166, 216, 84),
    RGBColor(255, 217, 47),
    RGBColor(229, 196, 148),
    RGBColor(179, 179, 179),
];

pub fn chart_path(work_dir: &Path, name: &str) -> PathBuf {
    work_dir.join(format!("{}.png", name))
}

/// Removes stale chart files; charts belong to exactly one run.
pub fn remove_all(work_dir: &Path) {
    for name in CHART_NAMES {
        let _ = std::fs::remove_file(chart_path(work_dir, name));
    }
}

/// Renders whatever charts the table supports and returns name -> file path.
/// A chart that cannot be drawn is logged and skipped, never fatal.
pub fn render_all(table: &Table, company: &str, industry: &str, work_dir: &Path) -> BTreeMap<String, String> {
    let mut charts = BTreeMap::new();

    let revenue = filter_revenue(&report::revenue_data(table));
    if !revenue.is_empty() {
        let path = chart_path(work_dir, REVENUE_CHART);
        match revenue_chart(&revenue, company, industry, &path) {
            Ok(()) => {
                charts.insert(REVENUE_CHART.to_string(), path.display().to_string());
            }
            Err(e) => progress::log_with(progress::Kind::Chart, format!("Error generating revenue chart: {}", e)),
        }
    }

    let shares: Vec<(String, f64)> = report::market_share_data(table)
        .into_iter()
        .map(|(name, fraction, _)| (name, fraction))
        .collect();
    if !shares.is_empty() {
        let path = chart_path(work_dir, MARKET_SHARE_CHART);
        match market_share_chart(&shares, industry, &path) {
            Ok(()) => {
                charts.insert(MARKET_SHARE_CHART.to_string(), path.display().to_string());
            }
            Err(e) => progress::log_with(progress::Kind::Chart, format!("Error generating market share chart: {}", e)),
        }
    }

    let pricing = pricing_counts(table);
    if !pricing.is_empty() {
        let path = chart_path(work_dir, PRICING_CHART);
        match pricing_chart(&pricing, industry, &path) {
            Ok(()) => {
                charts.insert(PRICING_CHART.to_string(), path.display().to_string());
            }
            Err(e) => progress::log_with(progress::Kind::Chart, format!("Error generating pricing chart: {}", e)),
        }
    }

    let (names, matrix) = feature_matrix(table);
    if !names.is_empty() {
        let path = chart_path(work_dir, FEATURE_CHART);
        match feature_chart(&names, &matrix, industry, &path) {
            Ok(()) => {
                charts.insert(FEATURE_CHART.to_string(), path.display().to_string());
            }
            Err(e) => progress::log_with(progress::Kind::Chart, format!("Error generating feature matrix: {}", e)),
        }
    }

    charts
}

/// Drops companies below 0.1% of the maximum so the log-scale bars stay
/// readable; fewer than two survivors means no chart at all.
fn filter_revenue(data: &[(String, f64, String)]) -> Vec<(String, f64)> {
    let max = data.iter().map(|d| d.1).fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() || max <= 0.0 {
        return Vec::new();
    }

    let threshold = max * 0.001;
    let filtered: Vec<(String, f64)> = data
        .iter()
        .filter(|d| d.1 >= threshold)
        .map(|d| (d.0.clone(), d.1))
        .collect();

    if filtered.len() < 2 {
        return Vec::new();
    }
    filtered
}

fn pricing_counts(table: &Table) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    if let Some(values) = table.column_values("pricing_model") {
        for value in values {
            if value.is_empty() {
                continue;
            }
            *counts.entry(value.to_string()).or_insert(0) += 1;
        }
    }
    counts.into_iter().collect()
}

/// Keyword presence per competitor, rows aligned with the returned names.
fn feature_matrix(table: &Table) -> (Vec<String>, Vec<Vec<bool>>) {
    let names = match table.column_values("name") {
        Some(names) => names,
        None => return (Vec::new(), Vec::new()),
    };
    let features = match table.column_values("key_features") {
        Some(features) => features,
        None => return (Vec::new(), Vec::new()),
    };

    let mut matrix = Vec::new();
    for feature_text in &features {
        let lower = feature_text.to_lowercase();
        matrix.push(FEATURE_KEYWORDS.iter().map(|k| lower.contains(k)).collect());
    }

    (names.into_iter().map(|n| n.to_string()).collect(), matrix)
}

fn revenue_label(billions: f64) -> String {
    if billions >= 1.0 {
        format!("${:.1}B", billions)
    } else if billions >= 0.001 {
        format!("${:.1}M", billions * 1000.0)
    } else {
        format!("${:.1}K", billions * 1_000_000.0)
    }
}

fn revenue_chart(data: &[(String, f64)], company: &str, industry: &str, path: &Path) -> Result<()> {
    let root = BitMapBackend::new(path, (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let y_max = data.iter().map(|d| d.1).fold(f64::NEG_INFINITY, f64::max);
    let y_min = data.iter().map(|d| d.1).fold(f64::INFINITY, f64::min).max(1e-4);
    let floor = y_min / 2.0;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Revenue Comparison - {} Market (Log Scale)", industry),
            ("sans-serif", 28),
        )
        .margin(20)
        .x_label_area_size(110)
        .y_label_area_size(70)
        .build_cartesian_2d(0f64..data.len() as f64, (floor..y_max * 2.0).log_scale())?;

    chart
        .configure_mesh()
        .y_desc("Revenue (Billions USD, Log Scale)")
        .x_desc("Companies")
        .x_labels(data.len())
        .x_label_formatter(&|x| {
            data.get(x.floor() as usize)
                .map(|d| d.0.clone())
                .unwrap_or_default()
        })
        .draw()?;

    let company_lower = company.to_lowercase();
    chart.draw_series(data.iter().enumerate().map(|(i, (name, value))| {
        let color = if name.to_lowercase().contains(&company_lower) {
            HIGHLIGHT
        } else {
            BAR_BLUE
        };
        Rectangle::new(
            [(i as f64 + 0.15, floor), (i as f64 + 0.85, *value)],
            color.filled().stroke_width(1),
        )
    }))?;
    chart.draw_series(data.iter().enumerate().map(|(i, (_, value))| {
        Rectangle::new(
            [(i as f64 + 0.15, floor), (i as f64 + 0.85, *value)],
            BAR_EDGE.stroke_width(1),
        )
    }))?;

    // Value labels above each bar.
    chart.draw_series(data.iter().enumerate().map(|(i, (_, value))| {
        Text::new(
            revenue_label(*value),
            (i as f64 + 0.5, value * 1.15),
            ("sans-serif", 15),
        )
    }))?;

    root.present()?;
    Ok(())
}

fn market_share_chart(data: &[(String, f64)], industry: &str, path: &Path) -> Result<()> {
    let root = BitMapBackend::new(path, (800, 800)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = root.titled(
        &format!("Market Share Distribution - {}", industry),
        ("sans-serif", 28),
    )?;

    let sizes: Vec<f64> = data.iter().map(|d| d.1 * 100.0).collect();
    let labels: Vec<String> = data.iter().map(|d| d.0.clone()).collect();
    let colors: Vec<RGBColor> = (0..data.len())
        .map(|i| PIE_PALETTE[i % PIE_PALETTE.len()])
        .collect();

    let center = (400, 400);
    let radius = 260.0;
    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.label_style(("sans-serif", 18).into_font().color(&BLACK));
    pie.percentages(("sans-serif", 14).into_font().color(&BLACK));
    root.draw(&pie)?;

    root.present()?;
    Ok(())
}

fn pricing_chart(counts: &[(String, usize)], industry: &str, path: &Path) -> Result<()> {
    let root = BitMapBackend::new(path, (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let y_max = counts.iter().map(|c| c.1).max().unwrap_or(1) as f64;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Pricing Model Distribution - {}", industry), ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(110)
        .y_label_area_size(60)
        .build_cartesian_2d(0f64..counts.len() as f64, 0f64..y_max * 1.25)?;

    chart
        .configure_mesh()
        .y_desc("Number of Companies")
        .x_desc("Pricing Models")
        .x_labels(counts.len())
        .x_label_formatter(&|x| {
            counts
                .get(x.floor() as usize)
                .map(|c| c.0.clone())
                .unwrap_or_default()
        })
        .draw()?;

    chart.draw_series(counts.iter().enumerate().map(|(i, (_, count))| {
        Rectangle::new(
            [(i as f64 + 0.15, 0.0), (i as f64 + 0.85, *count as f64)],
            BAR_GREEN.filled(),
        )
    }))?;
    chart.draw_series(counts.iter().enumerate().map(|(i, (_, count))| {
        Rectangle::new(
            [(i as f64 + 0.15, 0.0), (i as f64 + 0.85, *count as f64)],
            BAR_GREEN_EDGE.stroke_width(1),
        )
    }))?;
    chart.draw_series(counts.iter().enumerate().map(|(i, (_, count))| {
        Text::new(
            count.to_string(),
            (i as f64 + 0.5, *count as f64 + y_max * 0.05),
            ("sans-serif", 16),
        )
    }))?;

    root.present()?;
    Ok(())
}

fn feature_chart(names: &[String], matrix: &[Vec<bool>], industry: &str, path: &Path) -> Result<()> {
    let root = BitMapBackend::new(path, (1400, 800)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("Feature Availability Matrix - {}", industry), ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(140)
        .y_label_area_size(160)
        .build_cartesian_2d(0..FEATURE_KEYWORDS.len() as i32, 0..names.len() as i32)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .disable_y_mesh()
        .x_labels(FEATURE_KEYWORDS.len())
        .y_labels(names.len())
        .x_label_formatter(&|x| {
            FEATURE_KEYWORDS
                .get(*x as usize)
                .map(|k| k.to_string())
                .unwrap_or_default()
        })
        .y_label_formatter(&|y| names.get(*y as usize).cloned().unwrap_or_default())
        .draw()?;

    let mut cells = Vec::new();
    for (row, flags) in matrix.iter().enumerate() {
        for (col, present) in flags.iter().enumerate() {
            let color = if *present { CELL_ON } else { CELL_OFF };
            cells.push(Rectangle::new(
                [(col as i32, row as i32), (col as i32 + 1, row as i32 + 1)],
                color.filled(),
            ));
        }
    }
    chart.draw_series(cells)?;

    root.present()?;
    Ok(())
}
