use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;

macro_rules! debug_println {
    ($($arg:tt)*) => {
        if std::env::var("MARKETSCOUT_DEBUG").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Fetched page text is capped at this many characters.
pub const MAX_PAGE_CHARS: usize = 4000;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Result of a single-page fetch. Failures are tagged in `error` rather than
/// raised, so callers must check it (and `status`) before trusting `content`.
#[derive(Debug, Clone, Serialize)]
pub struct PageFetch {
    pub url: String,
    pub title: Option<String>,
    pub content: String,
    pub status: u16,
    pub error: Option<String>,
}

impl PageFetch {
    fn failed(url: &str, status: u16, error: String) -> Self {
        PageFetch {
            url: url.to_string(),
            title: None,
            content: String::new(),
            status,
            error: Some(error),
        }
    }
}

/// Search + page fetch behind one seam so the pipeline can be exercised with
/// a stub provider in tests.
#[async_trait]
pub trait WebLookup: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>>;

    async fn fetch(&self, url: &str) -> PageFetch;
}

#[derive(Debug, Serialize)]
struct SearchApiRequest {
    api_key: String,
    query: String,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchApiResponse {
    results: Vec<SearchApiResult>,
}

#[derive(Debug, Deserialize)]
struct SearchApiResult {
    title: String,
    url: String,
    content: String,
}

/// Client for a Tavily-style JSON search API plus direct page fetches.
///
/// One outbound request per call, no caching, no dedup; the only rate-limit
/// coordination is a fixed sleep before each request.
pub struct SearchApiClient {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
    request_delay: Duration,
}

impl SearchApiClient {
    pub fn new(endpoint: String, api_key: String, timeout_secs: u64, request_delay_ms: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(SearchApiClient {
            endpoint,
            api_key,
            client,
            request_delay: Duration::from_millis(request_delay_ms),
        })
    }
}

#[async_trait]
impl WebLookup for SearchApiClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>> {
        tokio::time::sleep(self.request_delay).await;
        crate::progress::log_with(crate::progress::Kind::Search, format!("Searching for: '{}'", query));

        let request = SearchApiRequest {
            api_key: self.api_key.clone(),
            query: query.to_string(),
            max_results,
        };

        let response = self.client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .context("Failed to send search request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Search API error {}: {}", status, body);
        }

        let parsed: SearchApiResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;

        debug_println!("[Lookup] {} results for '{}'", parsed.results.len(), query);

        Ok(parsed.results
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: r.content,
            })
            .collect())
    }

    async fn fetch(&self, url: &str) -> PageFetch {
        tokio::time::sleep(self.request_delay).await;
        crate::progress::log_with(crate::progress::Kind::Http, format!("Fetching: {}", url));

        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return PageFetch::failed(url, 0, e.to_string()),
        };

        let status = response.status().as_u16();
        if !response.status().is_success() {
            return PageFetch::failed(url, status, format!("HTTP {}", status));
        }

        let html = match response.text().await {
            Ok(t) => t,
            Err(e) => return PageFetch::failed(url, status, e.to_string()),
        };

        let (title, content) = reduce_html(&html);
        debug_println!("[Lookup] Fetched {} chars from {}", content.len(), url);

        PageFetch {
            url: url.to_string(),
            title,
            content,
            status,
            error: None,
        }
    }
}

/// Used when no search API key is configured; analyses still run but every
/// lookup comes back empty.
pub struct NoopLookup;

#[async_trait]
impl WebLookup for NoopLookup {
    async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<SearchHit>> {
        eprintln!("Warning: search for '{}' skipped, no search API key configured", query);
        Ok(vec![])
    }

    async fn fetch(&self, url: &str) -> PageFetch {
        PageFetch::failed(url, 0, "no search API key configured".to_string())
    }
}

/// Reduces an HTML document to its title and readable text, skipping
/// script/style/nav chrome, capped at MAX_PAGE_CHARS.
fn reduce_html(html: &str) -> (Option<String>, String) {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| {
            document.select(&sel).next().map(|el| el.text().collect::<String>().trim().to_string())
        })
        .filter(|t| !t.is_empty());

    let mut text = String::new();
    collect_text(document.root_element(), &mut text);

    if text.chars().count() > MAX_PAGE_CHARS {
        text = text.chars().take(MAX_PAGE_CHARS).collect();
    }

    (title, text.trim().to_string())
}

const SKIPPED_ELEMENTS: [&str; 7] = ["script", "style", "nav", "footer", "header", "noscript", "head"];

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(el) = ElementRef::wrap(child) {
            if SKIPPED_ELEMENTS.contains(&el.value().name()) {
                continue;
            }
            collect_text(el, out);
        } else if let Some(text) = child.value().as_text() {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(trimmed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_html_strips_chrome() {
        let html = "<html><head><title>Acme Corp</title><script>var x = 1;</script></head>\
                    <body><nav>Home About</nav><p>Revenue of $2.3 billion.</p>\
                    <footer>Copyright</footer></body></html>";
        let (title, content) = reduce_html(html);
        assert_eq!(title.as_deref(), Some("Acme Corp"));
        assert!(content.contains("Revenue of $2.3 billion."));
        assert!(!content.contains("var x"));
        assert!(!content.contains("Home About"));
        assert!(!content.contains("Copyright"));
    }

    #[test]
    fn test_reduce_html_caps_length() {
        let body = "word ".repeat(5000);
        let html = format!("<html><body><p>{}</p></body></html>", body);
        let (_, content) = reduce_html(&html);
        assert!(content.chars().count() <= MAX_PAGE_CHARS);
    }

    #[tokio::test]
    async fn test_noop_lookup_degrades() {
        let noop = NoopLookup;
        let hits = noop.search("anything", 5).await.unwrap();
        assert!(hits.is_empty());

        let page = noop.fetch("https://example.com").await;
        assert!(page.error.is_some());
        assert!(page.content.is_empty());
    }
}
