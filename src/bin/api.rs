use financial_research_orchestrator::{
    api::start_server, config::Settings, context::AppContext, corpus::InMemoryCorpus,
    orchestrator::Orchestrator,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;

    info!("Financial Research Orchestrator - API Server");
    info!("Port: {}", settings.api_port);

    let corpus = Arc::new(InMemoryCorpus::new());
    match settings.corpus_path.as_deref() {
        Some(path) => {
            corpus.ingest_file(path).await?;
        }
        None => info!("CORPUS_PATH not set, filing corpus starts empty"),
    }

    let port = settings.api_port;
    let request_timeout = settings.request_timeout();
    let context = AppContext::from_settings(settings, corpus)?;
    let orchestrator = Arc::new(Orchestrator::new(&context));

    info!("Orchestrator initialized");

    start_server(orchestrator, request_timeout, port).await?;

    Ok(())
}
