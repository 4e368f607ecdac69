use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

macro_rules! debug_println {
    ($($arg:tt)*) => {
        if std::env::var("MARKETSCOUT_DEBUG").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Completion seam so pipeline code and tests never depend on a concrete
/// provider client.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
    #[allow(dead_code)]
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[allow(dead_code)]
    role: String,
    content: String,
}

/// Chat client for an Ollama-compatible /api/chat endpoint.
pub struct LlmClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl LlmClient {
    pub fn with_config(base_url: String, model: String) -> Self {
        LlmClient {
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: true,
        };

        debug_println!("[LLM] Sending {} chars to model {}", prompt.len(), self.model);

        let response = self.client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("LLM API error: {}", response.status()));
        }

        // Responses stream as one JSON object per line; accumulate the content.
        let mut response_text = String::new();
        let mut stream = response.bytes_stream();

        while let Some(item) = stream.next().await {
            let chunk = item?;
            let chunk_str = String::from_utf8_lossy(&chunk);

            for line in chunk_str.lines() {
                if line.trim().is_empty() {
                    continue;
                }

                if let Ok(chunk_response) = serde_json::from_str::<ChatResponse>(line) {
                    response_text.push_str(&chunk_response.message.content);
                }
            }
        }

        debug_println!("[LLM] Received {} chars", response_text.len());
        Ok(response_text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Extracts the first balanced JSON object from free text. Models wrap
/// structured answers in prose or code fences more often than not.
pub fn extract_json_object(text: &str) -> Option<String> {
    if let Some(start) = text.find('{') {
        let mut brace_count = 0;
        let mut in_string = false;
        let mut escape = false;

        for (i, ch) in text[start..].char_indices() {
            if escape {
                escape = false;
                continue;
            }

            if ch == '\\' {
                escape = true;
                continue;
            }

            if ch == '"' {
                in_string = !in_string;
            }

            if !in_string {
                match ch {
                    '{' => brace_count += 1,
                    '}' => {
                        brace_count -= 1;
                        if brace_count == 0 {
                            return Some(text[start..start + i + ch.len_utf8()].to_string());
                        }
                    },
                    _ => {}
                }
            }
        }
    }
    None
}

/// Extracts the outermost JSON array from free text.
pub fn extract_json_array(text: &str) -> Option<String> {
    if let Some(start) = text.find('[') {
        if let Some(end) = text.rfind(']') {
            if end > start {
                return Some(text[start..=end].to_string());
            }
        }
    }

    if text.trim().starts_with('[') {
        return Some(text.trim().to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_object_plain() {
        let text = r#"{"name": "Acme", "revenue": "$2B"}"#;
        assert_eq!(extract_json_object(text), Some(text.to_string()));
    }

    #[test]
    fn test_extract_json_object_fenced() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nAnything else?";
        assert_eq!(extract_json_object(text), Some("{\"a\": 1}".to_string()));
    }

    #[test]
    fn test_extract_json_object_nested_and_braces_in_strings() {
        let text = r#"prefix {"outer": {"inner": "va}lue"}} suffix"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"outer": {"inner": "va}lue"}}"#.to_string())
        );
    }

    #[test]
    fn test_extract_json_object_none() {
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_extract_json_array() {
        let text = "Sure:\n[{\"capability\": \"web_search\"}]\ndone";
        assert_eq!(
            extract_json_array(text),
            Some("[{\"capability\": \"web_search\"}]".to_string())
        );
        assert_eq!(extract_json_array("nothing"), None);
    }
}
