//! Financial Research Orchestrator
//!
//! A multi-agent research pipeline that:
//! - Classifies a query by data domain and detects multi-part questions
//! - Answers simple queries with one specialist agent
//! - Decomposes complex queries into a dependency-ordered task plan
//! - Grounds every answer in retrieved filings, market data or macro series
//! - Validates responses and flags weak ones for human review
//! - Checkpoints each answer under its conversation id
//!
//! PIPELINE:
//! CLASSIFY → ROUTE → (AGENT | DECOMPOSE → EXECUTE → AGGREGATE) → VALIDATE → CHECKPOINT

pub mod agent;
pub mod aggregation;
pub mod api;
pub mod classifier;
pub mod complexity;
pub mod config;
pub mod context;
pub mod corpus;
pub mod error;
pub mod execution;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod planner;
pub mod providers;
pub mod state;
pub mod verification;

pub use error::{OrchestrationError, Result};

// Re-export common types
pub use models::*;
pub use context::AppContext;
pub use orchestrator::{OrchestrationOutcome, Orchestrator};
