use crate::agent::AnalystAgent;
use crate::aggregate;
use crate::charts;
use crate::config::Config;
use crate::llm::ChatModel;
use crate::lookup::WebLookup;
use crate::progress;
use crate::record::Synthesizer;
use crate::report::{self, AnalysisSummary};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Aggregate file name inside the working directory.
pub const DATA_FILE: &str = "competitor_data.csv";

const PLACEHOLDER_WARNING: &str = "The analysis resulted in placeholder data. This can happen for very generic ideas \
    where specific competitors could not be found via automated search. Please try a more specific query or a \
    well-known company.";

fn default_analysis_type() -> String {
    "Full CI Report".to_string()
}

/// Analysis input, as posted by the dashboard form. Both the camelCase and
/// snake_case spellings are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    #[serde(alias = "companyName", alias = "company_name")]
    pub company: String,
    pub industry: String,
    #[serde(default, alias = "targetAudience")]
    pub target_audience: String,
    #[serde(default, alias = "keyFeatures")]
    pub key_features: String,
    #[serde(default = "default_analysis_type", alias = "analysisType")]
    pub analysis_type: String,
}

pub fn data_path(work_dir: &Path) -> PathBuf {
    work_dir.join(DATA_FILE)
}

/// Runs one full analysis to completion and returns the captured run log
/// plus the summary. The caller owns serialization: two concurrent runs
/// corrupt the read-modify-write CSV append.
pub async fn run_analysis(
    config: &Config,
    model: Arc<dyn ChatModel>,
    lookup: Arc<dyn WebLookup>,
    request: &AnalysisRequest,
) -> (String, AnalysisSummary) {
    progress::clear();
    progress::log(format!("Starting analysis for: {} in {}", request.company, request.industry));

    let work_dir = &config.analysis.work_dir;
    if let Err(e) = std::fs::create_dir_all(work_dir) {
        let summary = AnalysisSummary::with_finding(format!("Could not prepare working directory: {}", e));
        return (progress::snapshot(), summary);
    }

    // One run, one dataset: stale data and charts from the previous run go
    // first, so a failed run cannot report yesterday's numbers.
    let csv_path = data_path(work_dir);
    if csv_path.exists() {
        progress::log(format!("Removing old data file: {}", csv_path.display()));
        let _ = std::fs::remove_file(&csv_path);
    }
    charts::remove_all(work_dir);

    let synthesizer = Synthesizer::new(lookup.clone(), model.clone(), config.search.max_results);
    let agent = AnalystAgent::new(
        model,
        lookup,
        synthesizer,
        csv_path.clone(),
        config.llm.max_turns,
        config.analysis.max_competitors,
    );
    agent.run(request).await;

    progress::log(format!("Checking for data file: {}", csv_path.display()));

    if !csv_path.exists() {
        return (
            progress::snapshot(),
            AnalysisSummary::with_finding("Data file not found. Analysis may still be in progress."),
        );
    }

    let table = match aggregate::load(&csv_path) {
        Ok(table) => table,
        Err(e) => {
            return (
                progress::snapshot(),
                AnalysisSummary::with_finding(format!("Error reading data file: {}", e)),
            );
        }
    };

    progress::log_with(
        progress::Kind::Data,
        format!("Data loaded. Rows: {} Columns: {:?}", table.len(), table.headers),
    );

    if table.is_empty() || table.column("name").is_none() {
        progress::log_with(progress::Kind::Data, "Data file is empty or missing the name column");
        return (
            progress::snapshot(),
            AnalysisSummary::with_finding("Analysis complete, but no competitor data could be identified."),
        );
    }

    if report::has_placeholder_names(&table) {
        progress::log_with(progress::Kind::Data, "Placeholder data detected");
        return (progress::snapshot(), AnalysisSummary::with_finding(PLACEHOLDER_WARNING));
    }

    let mut summary = report::summarize(&table, &request.company, &request.industry);
    summary.charts = charts::render_all(&table, &request.company, &request.industry, work_dir);

    (progress::snapshot(), summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::NoopLookup;
    use anyhow::Result;
    use async_trait::async_trait;

    #[test]
    fn test_request_accepts_camel_case_fields() {
        let body = r#"{
            "companyName": "Acme Robotics",
            "industry": "Robotics",
            "targetAudience": "Manufacturers",
            "keyFeatures": "Autonomous arms",
            "analysisType": "Market Positioning"
        }"#;
        let request: AnalysisRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.company, "Acme Robotics");
        assert_eq!(request.target_audience, "Manufacturers");
        assert_eq!(request.analysis_type, "Market Positioning");
    }

    #[test]
    fn test_request_accepts_snake_case_and_defaults() {
        let body = r#"{"company_name": "Acme", "industry": "Robotics"}"#;
        let request: AnalysisRequest = serde_json::from_str(body).unwrap();
        assert_eq!(request.company, "Acme");
        assert_eq!(request.target_audience, "");
        assert_eq!(request.analysis_type, "Full CI Report");
    }

    struct DeadModel;

    #[async_trait]
    impl ChatModel for DeadModel {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(anyhow::anyhow!("model offline"))
        }

        fn model_name(&self) -> &str {
            "dead-stub"
        }
    }

    #[tokio::test]
    async fn test_run_without_lookup_or_model_reports_no_data() {
        let mut config = Config::default();
        config.analysis.work_dir =
            std::env::temp_dir().join(format!("marketscout-pipeline-{}", std::process::id()));

        let request = AnalysisRequest {
            company: "Acme".to_string(),
            industry: "Robotics".to_string(),
            target_audience: String::new(),
            key_features: String::new(),
            analysis_type: default_analysis_type(),
        };

        let (log, summary) =
            run_analysis(&config, Arc::new(DeadModel), Arc::new(NoopLookup), &request).await;

        assert!(summary.key_findings[0].contains("Data file not found"));
        assert!(!log.is_empty());
        assert!(summary.charts.is_empty());

        let _ = std::fs::remove_dir_all(&config.analysis.work_dir);
    }
}
