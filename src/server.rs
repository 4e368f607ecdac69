use crate::aggregate;
use crate::charts;
use crate::config::Config;
use crate::extract::NOT_AVAILABLE;
use crate::llm::ChatModel;
use crate::lookup::WebLookup;
use crate::pipeline::{self, AnalysisRequest};
use crate::report::AnalysisSummary;
use axum::{
    extract::{Extension, Path},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub model: Arc<dyn ChatModel>,
    pub lookup: Arc<dyn WebLookup>,
    // Analyses run one at a time; parallel runs would race on the
    // read-modify-write aggregate file.
    run_guard: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: Arc<Config>, model: Arc<dyn ChatModel>, lookup: Arc<dyn WebLookup>) -> Self {
        AppState {
            config,
            model,
            lookup,
            run_guard: Arc::new(Mutex::new(())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/analyze", post(analyze_handler))
        .route("/charts/:chart_type", get(chart_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}

#[derive(Serialize)]
struct AnalyzeResponse {
    summary: AnalysisSummary,
    competitors: Vec<Value>,
    features: Vec<FeatureEntry>,
    pricing: Vec<PricingEntry>,
    log: String,
}

#[derive(Serialize)]
struct FeatureEntry {
    name: String,
    features: String,
}

#[derive(Serialize)]
struct PricingEntry {
    name: String,
    model: String,
    tiers: String,
    revenue: String,
}

/// Runs one blocking analysis and returns the summary, the row-level data,
/// and the captured run log.
async fn analyze_handler(
    Extension(state): Extension<AppState>,
    Json(request): Json<AnalysisRequest>,
) -> Json<AnalyzeResponse> {
    let _guard = state.run_guard.lock().await;

    let (log, summary) =
        pipeline::run_analysis(&state.config, state.model.clone(), state.lookup.clone(), &request).await;

    let mut competitors = Vec::new();
    let mut features = Vec::new();
    let mut pricing = Vec::new();

    let csv_path = pipeline::data_path(&state.config.analysis.work_dir);
    if csv_path.exists() {
        if let Ok(table) = aggregate::load(&csv_path) {
            if !table.is_empty() && table.column("name").is_some() {
                for row in 0..table.len() {
                    let cell = |name: &str| -> String {
                        table
                            .column(name)
                            .map(|col| table.cell(row, col))
                            .filter(|value| !value.is_empty())
                            .unwrap_or(NOT_AVAILABLE)
                            .to_string()
                    };

                    competitors.push(json!({
                        "name": cell("name"),
                        "pricing_model": cell("pricing_model"),
                        "key_features": cell("key_features"),
                        "market_position": cell("market_position"),
                        "target_audience": cell("target_audience"),
                        "revenue": cell("revenue"),
                        "market_share": cell("market_share"),
                        "pricing_tiers": cell("pricing_tiers"),
                        "data_sources": cell("data_sources").parse::<u32>().unwrap_or(0),
                    }));

                    if cell("key_features") != NOT_AVAILABLE {
                        features.push(FeatureEntry {
                            name: cell("name"),
                            features: cell("key_features"),
                        });
                    }
                    if cell("pricing_model") != NOT_AVAILABLE {
                        pricing.push(PricingEntry {
                            name: cell("name"),
                            model: cell("pricing_model"),
                            tiers: cell("pricing_tiers"),
                            revenue: cell("revenue"),
                        });
                    }
                }
            }
        }
    }

    Json(AnalyzeResponse {
        summary,
        competitors,
        features,
        pricing,
        log,
    })
}

/// Serves a named chart PNG. Only the four known chart names resolve; this
/// is deliberately not a generic file lookup.
async fn chart_handler(
    Extension(state): Extension<AppState>,
    Path(chart_type): Path<String>,
) -> Response {
    if !charts::CHART_NAMES.contains(&chart_type.as_str()) {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "Chart not found"}))).into_response();
    }

    let path = charts::chart_path(&state.config.analysis.work_dir, &chart_type);
    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/png")], bytes).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Json(json!({"error": "Chart not found"}))).into_response(),
    }
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::NoopLookup;
    use anyhow::Result;
    use async_trait::async_trait;

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

    fn test_state() -> AppState {
        let mut config = Config::default();
        config.analysis.work_dir =
            std::env::temp_dir().join(format!("marketscout-server-{}", std::process::id()));
        AppState::new(Arc::new(config), Arc::new(DeadModel), Arc::new(NoopLookup))
    }

    #[tokio::test]
    async fn test_chart_handler_rejects_unknown_names() {
        let state = test_state();

        let response = chart_handler(Extension(state.clone()), Path("not_a_chart".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Path traversal attempts are just unknown names.
        let response = chart_handler(Extension(state), Path("../etc/passwd".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_chart_handler_known_name_missing_file_is_404() {
        let state = test_state();
        let response =
            chart_handler(Extension(state), Path(charts::REVENUE_CHART.to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
