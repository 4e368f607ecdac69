mod agent;
mod aggregate;
mod charts;
mod config;
mod extract;
mod llm;
mod lookup;
mod pipeline;
mod progress;
mod record;
mod report;
mod server;

use crate::llm::{ChatModel, LlmClient};
use crate::lookup::{NoopLookup, SearchApiClient, WebLookup};
use anyhow::Result;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(config::Config::load());

    // Provider keys live next to config.toml.
    let api_keys_path = config::Config::get_config_dir().join("api_keys.toml");
    let api_keys = config::load_api_keys(&api_keys_path).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load api_keys.toml: {}", e);
        Default::default()
    });

    let search_key = if !config.search.api_key.is_empty() {
        Some(config.search.api_key.clone())
    } else {
        api_keys
            .get("SEARCH_API_KEY")
            .cloned()
            .or_else(|| std::env::var("SEARCH_API_KEY").ok())
    };

    let lookup: Arc<dyn WebLookup> = match search_key {
        Some(key) if !key.is_empty() => Arc::new(SearchApiClient::new(
            config.search.endpoint.clone(),
            key,
            config.search.timeout_secs,
            config.search.request_delay_ms,
        )?),
        _ => {
            eprintln!("Warning: no search API key configured; lookups will return no results");
            Arc::new(NoopLookup)
        }
    };

    let model: Arc<dyn ChatModel> = Arc::new(LlmClient::with_config(
        config.llm.host.clone(),
        config.llm.model.clone(),
    ));
    println!("Analyst model: {}", model.model_name());

    let state = server::AppState::new(config.clone(), model, lookup);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!("Listening on {}", addr);

    axum::serve(listener, server::router(state)).await?;
    Ok(())
}
