use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

fn default_max_turns() -> usize {
    6
}

fn default_max_results() -> usize {
    5
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_request_delay_ms() -> u64 {
    500
}

fn default_max_competitors() -> usize {
    8
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LlmConfig {
    pub host: String,
    pub model: String,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SearchConfig {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AnalysisConfig {
    pub work_dir: PathBuf,
    #[serde(default = "default_max_competitors")]
    pub max_competitors: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            llm: LlmConfig {
                host: "http://localhost:11434".to_string(),
                model: "llama2".to_string(),
                max_turns: 6,
            },
            search: SearchConfig {
                endpoint: "https://api.tavily.com/search".to_string(),
                api_key: String::new(),
                max_results: 5,
                timeout_secs: 15,
                request_delay_ms: 500,
            },
            analysis: AnalysisConfig {
                work_dir: PathBuf::from("data"),
                max_competitors: 8,
            },
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = Self::get_config_path();

        if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => {
                    match toml::from_str(&contents) {
                        Ok(config) => return config,
                        Err(e) => eprintln!("Error parsing config.toml: {}. Using defaults.", e),
                    }
                }
                Err(e) => eprintln!("Error reading config.toml: {}. Using defaults.", e),
            }
        } else {
            // Create config directory if it doesn't exist
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
        }

        Config::default()
    }

    pub fn get_config_path() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/marketscout/config.toml")
        } else {
            PathBuf::from("config.toml")
        }
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/marketscout")
        } else {
            PathBuf::from(".")
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiKeysConfig {
    keys: HashMap<String, String>,
}

/// Loads provider API keys from api_keys.toml in the config directory.
pub fn load_api_keys(path: &Path) -> Result<HashMap<String, String>, anyhow::Error> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let contents = fs::read_to_string(path)?;
    let config: ApiKeysConfig = toml::from_str(&contents)?;
    Ok(config.keys)
}
