//! Market and macro data providers
//!
//! Opaque call-and-parse integrations behind two small traits. A failing
//! facet or series is reported as an error by the provider and swallowed by
//! the agent that asked for it.

use crate::error::OrchestrationError;
use crate::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::OnceLock;

pub mod fred;
pub mod market;

pub use fred::FredClient;
pub use market::HttpMarketData;

//
// ================= Market facets =================
//

/// One slice of market/fundamentals data for a ticker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketFacet {
    Quote,
    Historical,
    Metrics,
    Income,
    Balance,
    Cashflow,
    Estimates,
    Ownership,
    Dividends,
    News,
    Options,
}

/// Facets fetched when a query names none explicitly.
pub const DEFAULT_FACETS: [MarketFacet; 3] =
    [MarketFacet::Quote, MarketFacet::Metrics, MarketFacet::Income];

impl MarketFacet {
    pub const ALL: [MarketFacet; 11] = [
        MarketFacet::Quote,
        MarketFacet::Historical,
        MarketFacet::Metrics,
        MarketFacet::Income,
        MarketFacet::Balance,
        MarketFacet::Cashflow,
        MarketFacet::Estimates,
        MarketFacet::Ownership,
        MarketFacet::Dividends,
        MarketFacet::News,
        MarketFacet::Options,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketFacet::Quote => "quote",
            MarketFacet::Historical => "historical",
            MarketFacet::Metrics => "metrics",
            MarketFacet::Income => "income",
            MarketFacet::Balance => "balance",
            MarketFacet::Cashflow => "cashflow",
            MarketFacet::Estimates => "estimates",
            MarketFacet::Ownership => "ownership",
            MarketFacet::Dividends => "dividends",
            MarketFacet::News => "news",
            MarketFacet::Options => "options",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            MarketFacet::Quote => "Stock Quote",
            MarketFacet::Historical => "Historical Performance",
            MarketFacet::Metrics => "Valuation Metrics",
            MarketFacet::Income => "Income Statement",
            MarketFacet::Balance => "Balance Sheet",
            MarketFacet::Cashflow => "Cash Flow Statement",
            MarketFacet::Estimates => "Analyst Estimates",
            MarketFacet::Ownership => "Ownership",
            MarketFacet::Dividends => "Dividend History",
            MarketFacet::News => "Recent News",
            MarketFacet::Options => "Options Overview",
        }
    }

    /// Fixed relevance assigned to contexts built from this facet.
    pub fn relevance(&self) -> f64 {
        match self {
            MarketFacet::Quote => 0.95,
            MarketFacet::Historical => 0.85,
            MarketFacet::Metrics => 0.9,
            MarketFacet::Income => 0.88,
            MarketFacet::Balance => 0.85,
            MarketFacet::Cashflow => 0.85,
            MarketFacet::Estimates => 0.8,
            MarketFacet::Ownership => 0.75,
            MarketFacet::Dividends => 0.78,
            MarketFacet::News => 0.7,
            MarketFacet::Options => 0.72,
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            MarketFacet::Quote => &["price", "stock", "trading", "quote", "current"],
            MarketFacet::Historical => &[
                "historical", "history", "chart", "trend", "performance", "52 week", "ytd",
            ],
            MarketFacet::Metrics => &[
                "p/e", "pe ratio", "valuation", "multiple", "ev/ebitda", "p/s", "price to",
            ],
            MarketFacet::Income => &[
                "revenue", "income", "profit", "margin", "earnings", "ebitda", "net income",
            ],
            MarketFacet::Balance => &[
                "balance sheet", "debt", "assets", "liabilities", "equity", "cash position",
                "cash on hand", "cash and equivalents",
            ],
            MarketFacet::Cashflow => &[
                "cash flow", "free cash flow", "fcf", "capex", "operating cash",
            ],
            MarketFacet::Estimates => &[
                "analyst", "estimate", "forecast", "target", "rating", "consensus", "eps estimate",
            ],
            MarketFacet::Ownership => &[
                "insider", "institutional", "ownership", "holders", "bought", "sold",
            ],
            MarketFacet::Dividends => &["dividend", "yield", "payout"],
            MarketFacet::News => &["news", "headlines", "announcement", "press release"],
            MarketFacet::Options => &[
                "option", "call", "put", "strike", "expiry", "implied volatility",
            ],
        }
    }

    /// Whole-word match on any keyword, allowing a plural `s`.
    fn pattern(&self) -> &'static Regex {
        static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
        let patterns = PATTERNS.get_or_init(|| {
            MarketFacet::ALL
                .iter()
                .map(|facet| {
                    let alternatives: Vec<String> =
                        facet.keywords().iter().map(|kw| regex::escape(kw)).collect();
                    Regex::new(&format!(r"\b(?:{})s?\b", alternatives.join("|")))
                        .expect("valid facet keyword pattern")
                })
                .collect()
        });
        &patterns[*self as usize]
    }

    /// Facets a query asks for, in declaration order; defaults when none match.
    pub fn detect(query: &str) -> Vec<MarketFacet> {
        let lowered = query.to_lowercase();
        let facets: Vec<MarketFacet> = MarketFacet::ALL
            .into_iter()
            .filter(|facet| facet.pattern().is_match(&lowered))
            .collect();

        if facets.is_empty() {
            DEFAULT_FACETS.to_vec()
        } else {
            facets
        }
    }
}

impl fmt::Display for MarketFacet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//
// ================= Macro series =================
//

/// Query keyword → FRED series id.
pub const MACRO_SERIES: &[(&str, &str)] = &[
    ("gdp", "GDP"),
    ("unemployment", "UNRATE"),
    ("inflation", "CPIAUCSL"),
    ("interest rate", "FEDFUNDS"),
];

/// Series ids whose keyword occurs in the query.
pub fn detect_series(query: &str) -> Vec<&'static str> {
    let lowered = query.to_lowercase();
    MACRO_SERIES
        .iter()
        .filter(|(keyword, _)| lowered.contains(keyword))
        .map(|(_, series)| *series)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSnapshot {
    pub series_id: String,
    pub latest: f64,
    pub previous: f64,
    pub date: String,
}

impl SeriesSnapshot {
    pub fn render(&self) -> String {
        format!(
            "Indicator: {}\nLatest Value: {:.2}\nPrevious: {:.2}\nDate: {}",
            self.series_id, self.latest, self.previous, self.date
        )
    }
}

//
// ================= Provider traits =================
//

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Rendered text for one facet, `None` when the provider has no data.
    async fn fetch(&self, ticker: &str, facet: MarketFacet) -> Result<Option<String>>;
}

#[async_trait]
pub trait MacroDataProvider: Send + Sync {
    async fn latest(&self, series_id: &str) -> Result<Option<SeriesSnapshot>>;
}

//
// ================= Static providers =================
//

/// Fixed market data keyed by (ticker, facet).
#[derive(Default)]
pub struct StaticMarketData {
    data: HashMap<(String, MarketFacet), String>,
    failing: HashSet<MarketFacet>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ticker: &str, facet: MarketFacet, text: &str) -> Self {
        self.data
            .insert((ticker.to_uppercase(), facet), text.to_string());
        self
    }

    /// Make every fetch of `facet` fail.
    pub fn failing(mut self, facet: MarketFacet) -> Self {
        self.failing.insert(facet);
        self
    }
}

#[async_trait]
impl MarketDataProvider for StaticMarketData {
    async fn fetch(&self, ticker: &str, facet: MarketFacet) -> Result<Option<String>> {
        if self.failing.contains(&facet) {
            return Err(OrchestrationError::Provider(format!(
                "{} unavailable for {}",
                facet, ticker
            )));
        }
        Ok(self.data.get(&(ticker.to_uppercase(), facet)).cloned())
    }
}

/// Fixed macro series snapshots keyed by series id.
#[derive(Default)]
pub struct StaticMacroData {
    series: HashMap<String, SeriesSnapshot>,
}

impl StaticMacroData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, snapshot: SeriesSnapshot) -> Self {
        self.series.insert(snapshot.series_id.clone(), snapshot);
        self
    }
}

#[async_trait]
impl MacroDataProvider for StaticMacroData {
    async fn latest(&self, series_id: &str) -> Result<Option<SeriesSnapshot>> {
        Ok(self.series.get(series_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facet_detection() {
        assert_eq!(
            MarketFacet::detect("What is Apple's P/E ratio?"),
            vec![MarketFacet::Metrics]
        );
        assert_eq!(MarketFacet::detect("Tell me about AAPL"), DEFAULT_FACETS.to_vec());

        let facets = MarketFacet::detect("MSFT dividend yield and free cash flow");
        assert!(facets.contains(&MarketFacet::Dividends));
        assert!(facets.contains(&MarketFacet::Cashflow));
    }

    #[test]
    fn test_facet_keywords_match_whole_words() {
        assert_eq!(
            MarketFacet::detect("input and output data for AAPL"),
            DEFAULT_FACETS.to_vec()
        );
        assert_eq!(
            MarketFacet::detect("Why did Toyota recall its cars"),
            DEFAULT_FACETS.to_vec()
        );
        assert_eq!(
            MarketFacet::detect("What is MSFT free cash flow"),
            vec![MarketFacet::Cashflow]
        );

        assert_eq!(MarketFacet::detect("AAPL puts and calls"), vec![MarketFacet::Options]);
        assert_eq!(
            MarketFacet::detect("How much cash on hand does AAPL hold"),
            vec![MarketFacet::Balance]
        );
        assert_eq!(
            MarketFacet::detect("Tesla total assets"),
            vec![MarketFacet::Balance]
        );
    }

    #[test]
    fn test_series_detection() {
        assert_eq!(
            detect_series("How do inflation and the interest rate interact?"),
            vec!["CPIAUCSL", "FEDFUNDS"]
        );
        assert!(detect_series("Apple earnings").is_empty());
    }

    #[test]
    fn test_snapshot_render() {
        let snapshot = SeriesSnapshot {
            series_id: "UNRATE".into(),
            latest: 3.9,
            previous: 3.8,
            date: "2024-05-01".into(),
        };
        assert_eq!(
            snapshot.render(),
            "Indicator: UNRATE\nLatest Value: 3.90\nPrevious: 3.80\nDate: 2024-05-01"
        );
    }

    #[tokio::test]
    async fn test_static_market_data_failure_injection() {
        let provider = StaticMarketData::new()
            .with("aapl", MarketFacet::Quote, "Current Price: $190.00")
            .failing(MarketFacet::News);

        assert!(provider.fetch("AAPL", MarketFacet::Quote).await.unwrap().is_some());
        assert!(provider.fetch("AAPL", MarketFacet::Metrics).await.unwrap().is_none());
        assert!(provider.fetch("AAPL", MarketFacet::News).await.is_err());
    }
}
