use clap::Parser;
use financial_research_orchestrator::{
    config::Settings, context::AppContext, corpus::InMemoryCorpus, models::Query,
    orchestrator::Orchestrator,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "orchestrator")]
#[command(about = "Run one financial research query through the agent pipeline", long_about = None)]
#[command(version)]
struct Cli {
    /// Ticker symbol to scope filing retrieval to
    #[arg(long)]
    ticker: Option<String>,

    /// Query text; words are joined with spaces
    #[arg(required = true)]
    query: Vec<String>,
}

impl Cli {
    fn into_query(self) -> Query {
        let query = Query::new(self.query.join(" "));
        match self.ticker {
            Some(ticker) => query.with_ticker(ticker),
            None => query,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;

    let corpus = Arc::new(InMemoryCorpus::new());
    if let Some(path) = settings.corpus_path.as_deref() {
        corpus.ingest_file(path).await?;
    }

    let context = AppContext::from_settings(settings, corpus)?;
    let orchestrator = Orchestrator::new(&context);

    let query = cli.into_query();
    info!(query = %query.text, "Running orchestrator");

    match orchestrator.run(query).await {
        Ok(outcome) => {
            println!("\n=== ORCHESTRATION RESULT ===");
            println!("Conversation: {}", outcome.conversation_id);
            println!("Intent: {}", outcome.intent);
            println!("Confidence: {:.3}", outcome.response.confidence_score);
            println!("Faithfulness: {:.3}", outcome.response.faithfulness_score);
            println!("Needs Human Review: {}", outcome.response.needs_human_review);
            println!("Agents: {}", outcome.response.agents_used.join(", "));
            println!("\n{}", outcome.response.response);

            if !outcome.response.citations.is_empty() {
                println!("\nCitations:");
                for citation in &outcome.response.citations {
                    println!("  [{}] {}", citation.source_type, citation.source_id);
                }
            }

            println!("\nReasoning Trace:");
            for (i, trace) in outcome.reasoning_trace.iter().enumerate() {
                println!("  {}: {}", i + 1, trace);
            }
            println!("\nProcessing time: {} ms", outcome.processing_time_ms);
            Ok(())
        }
        Err(e) => {
            eprintln!("Orchestration failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
