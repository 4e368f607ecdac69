use crate::extract::{self, NOT_AVAILABLE};
use crate::llm::{self, ChatModel};
use crate::lookup::WebLookup;
use crate::progress;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn na() -> String {
    NOT_AVAILABLE.to_string()
}

/// One row of the aggregate table. Records are created once per competitor
/// per analysis run, appended, and never updated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorRecord {
    pub name: String,
    #[serde(default = "na")]
    pub pricing_model: String,
    #[serde(default = "na")]
    pub key_features: String,
    #[serde(default = "na")]
    pub market_position: String,
    #[serde(default = "na")]
    pub target_audience: String,
    #[serde(default = "na")]
    pub revenue: String,
    #[serde(default = "na")]
    pub market_share: String,
    #[serde(default = "na")]
    pub pricing_tiers: String,
    #[serde(default)]
    pub data_sources: u32,
}

impl CompetitorRecord {
    /// All-sentinel record for when research turned up nothing usable.
    pub fn fallback(name: &str) -> Self {
        CompetitorRecord {
            name: name.to_string(),
            pricing_model: na(),
            key_features: na(),
            market_position: na(),
            target_audience: na(),
            revenue: na(),
            market_share: na(),
            pricing_tiers: na(),
            data_sources: 0,
        }
    }
}

/// Qualitative fields the model fills in; everything quantitative comes from
/// the extractor, not the model.
#[derive(Debug, Deserialize)]
struct QualitativeFields {
    #[serde(default = "na")]
    pricing_model: String,
    #[serde(default = "na")]
    key_features: String,
    #[serde(default = "na")]
    market_position: String,
    #[serde(default = "na")]
    target_audience: String,
    #[serde(default = "na")]
    pricing_tiers: String,
}

/// Builds one CompetitorRecord per company from targeted searches, regex
/// extraction, and a single LLM completion for the qualitative fields.
pub struct Synthesizer {
    lookup: Arc<dyn WebLookup>,
    model: Arc<dyn ChatModel>,
    max_results: usize,
}

impl Synthesizer {
    pub fn new(lookup: Arc<dyn WebLookup>, model: Arc<dyn ChatModel>, max_results: usize) -> Self {
        Synthesizer { lookup, model, max_results }
    }

    /// Research one competitor. Never fails: every error along the way
    /// degrades to sentinel values in the returned record.
    pub async fn synthesize(&self, company: &str, industry: &str) -> CompetitorRecord {
        progress::log(format!("Collecting data for: {}", company));

        let mut data_sources: u32 = 0;
        let mut context_snippets: Vec<String> = Vec::new();

        // Revenue: a few targeted phrasings, first extractable figure wins.
        let mut revenue = na();
        let revenue_queries = [
            format!("{} annual revenue", company),
            format!("{} revenue {}", company, industry),
            format!("{} yearly revenue billions", company),
        ];
        'revenue: for query in &revenue_queries {
            let hits = match self.lookup.search(query, self.max_results).await {
                Ok(hits) => hits,
                Err(e) => {
                    progress::log_with(progress::Kind::Search, format!("Search failed for '{}': {}", query, e));
                    continue;
                }
            };
            data_sources += 1;
            for hit in &hits {
                let text = format!("{} {}", hit.title, hit.snippet);
                let candidate = extract::extract_currency(&text);
                if candidate != NOT_AVAILABLE {
                    revenue = candidate;
                    context_snippets.push(text);
                    break 'revenue;
                }
            }
        }

        // Market share: one phrasing is enough, the figure is rare anyway.
        let mut market_share = na();
        let share_query = format!("{} market share percentage", company);
        match self.lookup.search(&share_query, self.max_results).await {
            Ok(hits) => {
                data_sources += 1;
                for hit in &hits {
                    let text = format!("{} {}", hit.title, hit.snippet);
                    let candidate = extract::extract_percentage(&text);
                    if candidate != NOT_AVAILABLE {
                        market_share = candidate;
                        context_snippets.push(text);
                        break;
                    }
                }
            }
            Err(e) => {
                progress::log_with(progress::Kind::Search, format!("Search failed for '{}': {}", share_query, e));
            }
        }

        // General background for the qualitative fields.
        match self.lookup.search(&format!("{} company overview {}", company, industry), self.max_results).await {
            Ok(hits) => {
                data_sources += 1;
                for hit in hits.iter().take(3) {
                    context_snippets.push(format!("{}: {}", hit.title, hit.snippet));
                }

                // Try the first hit's page for richer text.
                if let Some(hit) = hits.first() {
                    let page = self.lookup.fetch(&hit.url).await;
                    match page.error {
                        None if !page.content.is_empty() => {
                            data_sources += 1;
                            context_snippets.push(page.content);
                        }
                        Some(e) => {
                            progress::log_with(progress::Kind::Http, format!("Fetch failed for {}: {}", page.url, e));
                        }
                        _ => {}
                    }
                }
            }
            Err(e) => {
                progress::log_with(progress::Kind::Search, format!("Overview search failed: {}", e));
            }
        }

        let mut record = match self.ask_model(company, industry, &context_snippets).await {
            Ok(fields) => CompetitorRecord {
                name: company.to_string(),
                pricing_model: fields.pricing_model,
                key_features: fields.key_features,
                market_position: fields.market_position,
                target_audience: fields.target_audience,
                revenue: na(),
                market_share: na(),
                pricing_tiers: fields.pricing_tiers,
                data_sources: 0,
            },
            Err(e) => {
                progress::log_with(progress::Kind::Llm, format!("Synthesis fell back to sentinels for {}: {}", company, e));
                CompetitorRecord::fallback(company)
            }
        };

        // Extracted figures survive regardless of how the model call went.
        record.revenue = revenue;
        record.market_share = market_share;
        record.data_sources = data_sources;
        record
    }

    async fn ask_model(&self, company: &str, industry: &str, snippets: &[String]) -> Result<QualitativeFields> {
        let prompt = format!(
            "Based on the following research snippets, describe the company {} in the {} industry.\n\n\
            Research snippets:\n{}\n\n\
            Respond with ONLY a JSON object in this exact shape (no markdown, no other text):\n\
            {{\"pricing_model\": \"brief pricing description\", \"key_features\": \"main features/offerings\", \
            \"market_position\": \"market position description\", \"target_audience\": \"primary target audience\", \
            \"pricing_tiers\": \"known pricing tiers\"}}\n\n\
            Use \"N/A\" for anything the snippets do not support. Never invent figures.",
            company,
            industry,
            snippets.join("\n---\n")
        );

        let response = self.model.complete(&prompt).await?;
        let object = llm::extract_json_object(&response)
            .ok_or_else(|| anyhow::anyhow!("no JSON object in model response"))?;
        let fields: QualitativeFields = serde_json::from_str(&object)?;
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{PageFetch, SearchHit};
    use async_trait::async_trait;

    struct StubLookup;

    #[async_trait]
    impl WebLookup for StubLookup {
        async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
            if query.contains("revenue") {
                Ok(vec![SearchHit {
                    title: "Acme Robotics financials".to_string(),
                    url: "https://example.com/financials".to_string(),
                    snippet: "Acme Robotics reported revenue of $2.3 billion for the fiscal year.".to_string(),
                }])
            } else if query.contains("market share") {
                Ok(vec![SearchHit {
                    title: "Robotics market report".to_string(),
                    url: "https://example.com/report".to_string(),
                    snippet: "Acme Robotics holds an 18% market share in industrial robotics.".to_string(),
                }])
            } else {
                Ok(vec![])
            }
        }

        async fn fetch(&self, url: &str) -> PageFetch {
            PageFetch {
                url: url.to_string(),
                title: None,
                content: String::new(),
                status: 200,
                error: None,
            }
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ChatModel for FailingModel {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(anyhow::anyhow!("connection refused"))
        }

        fn model_name(&self) -> &str {
            "failing-stub"
        }
    }

    struct CannedModel(&'static str);

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn model_name(&self) -> &str {
            "canned-stub"
        }
    }

    #[tokio::test]
    async fn test_synthesize_extracts_figures_from_stubbed_lookup() {
        let synthesizer = Synthesizer::new(Arc::new(StubLookup), Arc::new(FailingModel), 5);
        let record = synthesizer.synthesize("Acme Robotics", "Robotics").await;

        assert_eq!(record.name, "Acme Robotics");
        assert_eq!(record.revenue, "$2.3 billion");
        assert!(record.market_share.contains("18%"));
        // LLM was down, so the qualitative fields degrade to sentinels.
        assert_eq!(record.pricing_model, NOT_AVAILABLE);
        assert_eq!(record.market_position, NOT_AVAILABLE);
        assert!(record.data_sources > 0);
    }

    #[tokio::test]
    async fn test_synthesize_uses_model_for_qualitative_fields() {
        let canned = CannedModel(
            r#"```json
{"pricing_model": "Subscription", "key_features": "API, analytics", "market_position": "Leader", "target_audience": "Enterprises", "pricing_tiers": "Free, Pro"}
```"#,
        );
        let synthesizer = Synthesizer::new(Arc::new(StubLookup), Arc::new(canned), 5);
        let record = synthesizer.synthesize("Acme Robotics", "Robotics").await;

        assert_eq!(record.pricing_model, "Subscription");
        assert_eq!(record.key_features, "API, analytics");
        assert_eq!(record.pricing_tiers, "Free, Pro");
        // Figures still come from extraction, not the model.
        assert_eq!(record.revenue, "$2.3 billion");
    }

    #[tokio::test]
    async fn test_synthesize_degrades_on_malformed_model_output() {
        let synthesizer = Synthesizer::new(
            Arc::new(StubLookup),
            Arc::new(CannedModel("I could not find structured data, sorry.")),
            5,
        );
        let record = synthesizer.synthesize("Acme Robotics", "Robotics").await;

        assert_eq!(record.pricing_model, NOT_AVAILABLE);
        assert_eq!(record.revenue, "$2.3 billion");
    }
}
