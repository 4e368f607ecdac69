use crate::aggregate;
use crate::llm::{self, ChatModel};
use crate::lookup::WebLookup;
use crate::pipeline::AnalysisRequest;
use crate::progress;
use crate::record::Synthesizer;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

macro_rules! debug_println {
    ($($arg:tt)*) => {
        if std::env::var("MARKETSCOUT_DEBUG").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Everything the analyst model is allowed to do. A request for anything
/// else fails to parse instead of falling through a string lookup.
#[derive(Debug, Deserialize)]
#[serde(tag = "capability", rename_all = "snake_case")]
pub enum Capability {
    FindCompetitors {
        industry: String,
        company_description: String,
    },
    CollectCompetitorData {
        company_name: String,
    },
    WebSearch {
        query: String,
    },
    FetchPage {
        url: String,
    },
}

struct CapabilitySpec {
    name: &'static str,
    description: &'static str,
    parameters: &'static [(&'static str, &'static str)],
}

const REGISTRY: [CapabilitySpec; 4] = [
    CapabilitySpec {
        name: "find_competitors",
        description: "Find competitors for a company or industry. Use this first to identify competitors.",
        parameters: &[
            ("industry", "The industry to search in"),
            ("company_description", "Company name or description"),
        ],
    },
    CapabilitySpec {
        name: "collect_competitor_data",
        description: "Research one competitor (features, pricing, market position, revenue) and save the record.",
        parameters: &[("company_name", "The name of the company to analyze")],
    },
    CapabilitySpec {
        name: "web_search",
        description: "Search the web for information.",
        parameters: &[("query", "The search query")],
    },
    CapabilitySpec {
        name: "fetch_page",
        description: "Fetch readable text from a web page URL.",
        parameters: &[("url", "The URL to fetch")],
    },
];

fn render_registry() -> String {
    let mut out = String::new();
    for spec in &REGISTRY {
        out.push_str(&format!("- {}: {}\n", spec.name, spec.description));
        for (name, description) in spec.parameters {
            out.push_str(&format!("    {}: {}\n", name, description));
        }
    }
    out
}

/// Parses capability calls out of a model reply, trying the salvaged JSON
/// array, then a salvaged object, then the raw text.
pub fn parse_capability_calls(text: &str) -> Vec<Capability> {
    let mut attempts: Vec<String> = Vec::new();
    if let Some(array) = llm::extract_json_array(text) {
        attempts.push(array);
    }
    if let Some(object) = llm::extract_json_object(text) {
        attempts.push(object);
    }
    attempts.push(text.trim().to_string());

    for attempt in &attempts {
        if let Ok(calls) = serde_json::from_str::<Vec<Capability>>(attempt) {
            return calls;
        }
        if let Ok(call) = serde_json::from_str::<Capability>(attempt) {
            return vec![call];
        }
    }

    Vec::new()
}

static NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Z][A-Za-z0-9&.\- ]{2,}").expect("name pattern"));

/// Discovers competitor names from one web search; no model involved.
/// Capitalized runs in titles/snippets are candidates, minus the subject
/// company, the industry, and list-article prefixes.
pub async fn find_competitors(
    lookup: &dyn WebLookup,
    industry: &str,
    description: &str,
    limit: usize,
) -> Vec<String> {
    progress::log(format!("Finding competitors for: '{}' in '{}'", description, industry));
    let query = format!("top competitors of {} in {} industry", description, industry);

    let hits = match lookup.search(&query, 10).await {
        Ok(hits) => hits,
        Err(e) => {
            progress::log_with(progress::Kind::Search, format!("Competitor search failed: {}", e));
            return Vec::new();
        }
    };

    let description_lower = description.to_lowercase();
    let industry_lower = industry.to_lowercase();
    let mut competitors: Vec<String> = Vec::new();

    for hit in &hits {
        let text = format!("{} {}", hit.title, hit.snippet);
        for m in NAME_PATTERN.find_iter(&text) {
            let name = m.as_str().trim().trim_end_matches(['.', '-']).trim().to_string();
            if name.len() <= 2 {
                continue;
            }
            let lower = name.to_lowercase();
            if description_lower.contains(&lower) || industry_lower.contains(&lower) {
                continue;
            }
            if lower.starts_with("top ") || lower.starts_with("best ") || lower.starts_with("competitors") {
                continue;
            }
            if !competitors.iter().any(|c| c == &name) {
                competitors.push(name);
            }
        }
    }

    competitors.truncate(limit);
    progress::log(format!("Found competitors: {:?}", competitors));
    competitors
}

/// Drives the research conversation: prompt the model with the capability
/// registry, execute whatever it asks for, fold results into the next turn.
pub struct AnalystAgent {
    model: Arc<dyn ChatModel>,
    lookup: Arc<dyn WebLookup>,
    synthesizer: Synthesizer,
    csv_path: PathBuf,
    max_turns: usize,
    max_competitors: usize,
}

impl AnalystAgent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        lookup: Arc<dyn WebLookup>,
        synthesizer: Synthesizer,
        csv_path: PathBuf,
        max_turns: usize,
        max_competitors: usize,
    ) -> Self {
        AnalystAgent {
            model,
            lookup,
            synthesizer,
            csv_path,
            max_turns,
            max_competitors,
        }
    }

    /// Runs the research loop to completion and returns the number of
    /// records written. Never fails: a dead model drops to the scripted
    /// workflow so the run still produces data when search works.
    pub async fn run(&self, request: &AnalysisRequest) -> usize {
        progress::log_with(progress::Kind::Agent, "Initiating analyst workflow...");

        let mut records_written = 0usize;
        let mut context = String::new();

        for turn in 1..=self.max_turns {
            let prompt = self.build_prompt(request, &context);
            let response = match self.model.complete(&prompt).await {
                Ok(response) => response,
                Err(e) => {
                    progress::log_with(progress::Kind::Llm, format!("Analyst model unavailable: {}", e));
                    break;
                }
            };

            let finished = response.trim_end().ends_with("TERMINATE");
            let calls = parse_capability_calls(&response);

            if calls.is_empty() {
                if !finished {
                    debug_println!("[Agent] Turn {}: no capability calls in reply", turn);
                    progress::log_with(progress::Kind::Agent, "Analyst reply contained no capability calls");
                }
                break;
            }

            let mut results = Vec::new();
            for call in calls {
                results.push(self.execute(call, &request.industry, &mut records_written).await);
            }

            let combined = results.join("\n\n---\n\n");
            if context.is_empty() {
                context = format!("Capability results from turn {}:\n{}", turn, combined);
            } else {
                context.push_str(&format!("\n\nCapability results from turn {}:\n{}", turn, combined));
            }

            if finished {
                break;
            }
        }

        if records_written == 0 {
            records_written = self.run_scripted(request).await;
        }

        progress::log_with(
            progress::Kind::Agent,
            format!("Analyst workflow complete ({} records)", records_written),
        );
        records_written
    }

    fn build_prompt(&self, request: &AnalysisRequest, context: &str) -> String {
        let task = format!(
            "Perform a {} for:\nCompany Name: {}\nIndustry: {}\nTarget Audience: {}\nKey Features: {}",
            request.analysis_type, request.company, request.industry, request.target_audience, request.key_features
        );

        let progress_block = if context.is_empty() {
            "No capabilities have been used yet.".to_string()
        } else {
            context.to_string()
        };

        format!(
            "You are an expert Competitive Intelligence Analyst.\n\n\
            Your workflow:\n\
            1. Use find_competitors once to identify competitors of the target company\n\
            2. Use collect_competitor_data for each competitor found\n\
            3. Use web_search and fetch_page only when extra context is needed\n\n\
            Available capabilities:\n{}\n\
            {}\n\n\
            {}\n\n\
            Respond with ONLY valid JSON (no markdown, no other text): a single\n\
            {{\"capability\": \"<name>\", <parameters>}} object, or an array of such objects.\n\
            When data for every competitor has been collected, reply with the single word TERMINATE.",
            render_registry(),
            task,
            progress_block
        )
    }

    async fn execute(&self, call: Capability, industry: &str, records_written: &mut usize) -> String {
        match call {
            Capability::FindCompetitors { industry, company_description } => {
                let competitors =
                    find_competitors(self.lookup.as_ref(), &industry, &company_description, self.max_competitors)
                        .await;
                serde_json::to_string(&competitors).unwrap_or_else(|_| "[]".to_string())
            }
            Capability::CollectCompetitorData { company_name } => {
                if *records_written >= self.max_competitors {
                    return format!(
                        "Competitor limit ({}) reached; skipped {}.",
                        self.max_competitors, company_name
                    );
                }
                let record = self.synthesizer.synthesize(&company_name, industry).await;
                match aggregate::append(&self.csv_path, &record) {
                    Ok(()) => {
                        *records_written += 1;
                        format!("Successfully collected and saved data for {}.", company_name)
                    }
                    Err(e) => {
                        progress::log_with(progress::Kind::Data, format!("Failed to save {}: {}", company_name, e));
                        format!("Failed to save data for {}: {}", company_name, e)
                    }
                }
            }
            Capability::WebSearch { query } => {
                match self.lookup.search(&query, 5).await {
                    Ok(hits) => serde_json::to_string(&hits).unwrap_or_else(|_| "[]".to_string()),
                    Err(e) => format!("Search failed: {}", e),
                }
            }
            Capability::FetchPage { url } => {
                let page = self.lookup.fetch(&url).await;
                serde_json::to_string(&page).unwrap_or_else(|_| "{}".to_string())
            }
        }
    }

    /// The canonical workflow, model-free. Used when the model never asked
    /// for anything useful; search alone still yields records.
    async fn run_scripted(&self, request: &AnalysisRequest) -> usize {
        progress::log_with(progress::Kind::Agent, "Falling back to scripted research workflow");

        let competitors = find_competitors(
            self.lookup.as_ref(),
            &request.industry,
            &request.company,
            self.max_competitors,
        )
        .await;

        if competitors.is_empty() {
            progress::log("No competitors could be identified via search");
            return 0;
        }

        let mut written = 0usize;
        for name in competitors {
            let record = self.synthesizer.synthesize(&name, &request.industry).await;
            match aggregate::append(&self.csv_path, &record) {
                Ok(()) => written += 1,
                Err(e) => progress::log_with(progress::Kind::Data, format!("Failed to save {}: {}", name, e)),
            }
        }
        written
    }
}
