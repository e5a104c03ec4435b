//! REST API server for the research orchestrator
//!
//! Thin HTTP layer over [`Orchestrator::run`]: request validation, the
//! overall request timeout and query counters live here, nothing else.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::models::{Citation, Filters, Query};
use crate::orchestrator::Orchestrator;

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryRequest {
    pub query: String,
    pub ticker: Option<String>,
    pub filters: Option<Filters>,
    pub conversation_id: Option<String>,
}

impl From<QueryRequest> for Query {
    fn from(req: QueryRequest) -> Self {
        Query {
            text: req.query,
            ticker: req.ticker,
            conversation_id: req.conversation_id,
            filters: req.filters.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct QueryResponse {
    pub response: String,
    pub citations: Vec<Citation>,
    pub confidence: f64,
    pub intent: String,
    pub processing_time_ms: u64,
    pub needs_human_review: bool,
    pub conversation_id: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// Query Metrics
/// =============================

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryMetrics {
    pub total_queries: u64,
    pub successful_queries: u64,
    pub failed_queries: u64,
    /// Exponential moving average over successful queries
    pub avg_response_time_ms: f64,
}

impl QueryMetrics {
    fn record_success(&mut self, elapsed_ms: f64) {
        self.total_queries += 1;
        self.successful_queries += 1;
        self.avg_response_time_ms = self.avg_response_time_ms * 0.9 + elapsed_ms * 0.1;
    }

    fn record_failure(&mut self) {
        self.total_queries += 1;
        self.failed_queries += 1;
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub metrics: Arc<RwLock<QueryMetrics>>,
    pub request_timeout: Duration,
}

impl ApiState {
    pub fn new(orchestrator: Arc<Orchestrator>, request_timeout: Duration) -> Self {
        Self {
            orchestrator,
            metrics: Arc::new(RwLock::new(QueryMetrics::default())),
            request_timeout,
        }
    }
}

/// =============================
/// Health + Metrics Endpoints
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<ApiState>) -> Json<QueryMetrics> {
    Json(state.metrics.read().await.clone())
}

/// =============================
/// Query Endpoint
/// =============================

async fn run_query(State(state): State<ApiState>, Json(req): Json<QueryRequest>) -> Response {
    let start_time = Instant::now();

    if req.query.trim().is_empty() {
        state.metrics.write().await.record_failure();
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("query must not be empty".into())),
        )
            .into_response();
    }

    info!(
        query = %req.query,
        ticker = req.ticker.as_deref().unwrap_or("none"),
        conversation_id = req.conversation_id.as_deref().unwrap_or("new"),
        "Received query request"
    );

    let result = tokio::time::timeout(state.request_timeout, state.orchestrator.run(req.into())).await;

    match result {
        Ok(Ok(outcome)) => {
            let elapsed_ms = start_time.elapsed().as_secs_f64() * 1000.0;
            state.metrics.write().await.record_success(elapsed_ms);

            info!(
                conversation_id = %outcome.conversation_id,
                intent = %outcome.intent,
                citations = outcome.response.citations.len(),
                processing_time_ms = outcome.processing_time_ms,
                "Query answered"
            );

            (
                StatusCode::OK,
                Json(QueryResponse {
                    response: outcome.response.response,
                    citations: outcome.response.citations,
                    confidence: outcome.response.confidence_score,
                    intent: outcome.intent.to_string(),
                    processing_time_ms: elapsed_ms as u64,
                    needs_human_review: outcome.response.needs_human_review,
                    conversation_id: outcome.conversation_id,
                }),
            )
                .into_response()
        }
        Ok(Err(e)) => {
            state.metrics.write().await.record_failure();
            error!(error = %e, "Query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(e.to_string())),
            )
                .into_response()
        }
        Err(_) => {
            state.metrics.write().await.record_failure();
            warn!(timeout_secs = state.request_timeout.as_secs(), "Query timed out");
            (
                StatusCode::GATEWAY_TIMEOUT,
                Json(ApiResponse::error("request timed out".into())),
            )
                .into_response()
        }
    }
}

/// =============================
/// Conversation History Endpoint
/// =============================

async fn conversation_history(
    State(state): State<ApiState>,
    Path(conversation_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.state_store().history(&conversation_id).await {
        Ok(checkpoints) => (StatusCode::OK, Json(ApiResponse::success(checkpoints))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(e.to_string())),
        ),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/query", post(run_query))
        .route("/conversations/:conversation_id/history", get(conversation_history))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    request_timeout: Duration,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(ApiState::new(orchestrator, request_timeout));

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("API server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
