//! Runtime settings loaded from the environment
//!
//! `.env` is honoured through `dotenv`; every value has a default except the
//! API keys, which stay empty and disable the backend that needs them.

use crate::error::OrchestrationError;
use crate::Result;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Settings {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub financial_api_base_url: Option<String>,
    pub fred_api_key: Option<String>,
    pub min_faithfulness_score: f64,
    pub min_confidence_score: f64,
    pub retrieval_top_k: usize,
    pub request_timeout_secs: u64,
    pub api_port: u16,
    /// JSON array of filing chunks ingested at startup
    pub corpus_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: "gemini-2.0-flash".to_string(),
            financial_api_base_url: None,
            fred_api_key: None,
            min_faithfulness_score: 0.8,
            min_confidence_score: 0.7,
            retrieval_top_k: 5,
            request_timeout_secs: 120,
            api_port: 8080,
            corpus_path: None,
        }
    }
}

impl Settings {
    /// Load `.env` (if any) and read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(env::vars().collect())
    }

    /// Build settings from an explicit variable map.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        let defaults = Settings::default();
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let settings = Settings {
            gemini_api_key: get("GEMINI_API_KEY").unwrap_or_default(),
            gemini_model: get("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            financial_api_base_url: get("FINANCIAL_API_BASE_URL")
                .or_else(|| get("TOOLS_API_BASE_URL"))
                .map(|url| url.trim_end_matches('/').to_string()),
            fred_api_key: get("FRED_API_KEY"),
            min_faithfulness_score: parse_or(
                "MIN_FAITHFULNESS_SCORE",
                get("MIN_FAITHFULNESS_SCORE"),
                defaults.min_faithfulness_score,
            )?,
            min_confidence_score: parse_or(
                "MIN_CONFIDENCE_SCORE",
                get("MIN_CONFIDENCE_SCORE"),
                defaults.min_confidence_score,
            )?,
            retrieval_top_k: parse_or(
                "RETRIEVAL_TOP_K",
                get("RETRIEVAL_TOP_K"),
                defaults.retrieval_top_k,
            )?,
            request_timeout_secs: parse_or(
                "REQUEST_TIMEOUT_SECS",
                get("REQUEST_TIMEOUT_SECS"),
                defaults.request_timeout_secs,
            )?,
            api_port: parse_or(
                "PORT",
                get("PORT").or_else(|| get("API_PORT")),
                defaults.api_port,
            )?,
            corpus_path: get("CORPUS_PATH"),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("MIN_FAITHFULNESS_SCORE", self.min_faithfulness_score),
            ("MIN_CONFIDENCE_SCORE", self.min_confidence_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(OrchestrationError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.retrieval_top_k == 0 {
            return Err(OrchestrationError::Config(
                "RETRIEVAL_TOP_K must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_or<T: FromStr>(name: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|_| {
            OrchestrationError::Config(format!("{} has invalid value '{}'", name, raw))
        }),
    }
}
