//! Application context
//!
//! Built once at process start and handed to the orchestrator. Holds the
//! shared backends so nothing in the crate reaches for a global.

use crate::config::Settings;
use crate::corpus::{Corpus, InMemoryCorpus};
use crate::llm::{GeminiGenerator, TextGenerator};
use crate::providers::{
    FredClient, HttpMarketData, MacroDataProvider, MarketDataProvider, StaticMarketData,
};
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppContext {
    pub settings: Settings,
    pub model: Arc<dyn TextGenerator>,
    pub corpus: Arc<dyn Corpus>,
    pub market: Arc<dyn MarketDataProvider>,
    pub macro_data: Arc<dyn MacroDataProvider>,
}

impl AppContext {
    pub fn new(
        settings: Settings,
        model: Arc<dyn TextGenerator>,
        corpus: Arc<dyn Corpus>,
        market: Arc<dyn MarketDataProvider>,
        macro_data: Arc<dyn MacroDataProvider>,
    ) -> Self {
        Self {
            settings,
            model,
            corpus,
            market,
            macro_data,
        }
    }

    /// Production wiring: Gemini for generation, HTTP market data when a base
    /// URL is configured, FRED for macro series. The corpus starts empty and
    /// is filled through [`InMemoryCorpus::ingest`].
    pub fn from_settings(settings: Settings, corpus: Arc<InMemoryCorpus>) -> Result<Self> {
        settings.validate()?;

        if settings.gemini_api_key.is_empty() {
            warn!("GEMINI_API_KEY not set, generation calls will fail");
        }

        let model: Arc<dyn TextGenerator> = Arc::new(GeminiGenerator::new(
            settings.gemini_api_key.clone(),
            settings.gemini_model.clone(),
        )?);

        let market: Arc<dyn MarketDataProvider> = match settings.financial_api_base_url.as_deref() {
            Some(base_url) => Arc::new(HttpMarketData::new(base_url)?),
            None => {
                warn!("FINANCIAL_API_BASE_URL not set, market data disabled");
                Arc::new(StaticMarketData::new())
            }
        };

        if settings.fred_api_key.is_none() {
            warn!("FRED_API_KEY not set, macro data disabled");
        }
        let macro_data: Arc<dyn MacroDataProvider> =
            Arc::new(FredClient::new(settings.fred_api_key.clone())?);

        info!(model = %settings.gemini_model, "Application context ready");

        Ok(Self::new(settings, model, corpus, market, macro_data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings_without_keys() {
        let context = AppContext::from_settings(Settings::default(), Arc::new(InMemoryCorpus::new()))
            .unwrap();
        assert_eq!(context.settings.retrieval_top_k, 5);
    }

    #[test]
    fn test_from_settings_rejects_invalid_thresholds() {
        let settings = Settings {
            min_confidence_score: 1.5,
            ..Settings::default()
        };
        assert!(AppContext::from_settings(settings, Arc::new(InMemoryCorpus::new())).is_err());
    }
}
