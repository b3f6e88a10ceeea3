// Finance Insight - Web Server
// REST API over the analysis pipeline

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use finance_insight::{
    train_categorizer, AnalysisReport, AnalysisRequest, AnalysisSession, AnalyticsConfig,
    AnalyticsError, DatasetCache, ModelStore, TableFilter, TrainingOutcome, TrainingSummary,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Shared application state
#[derive(Clone)]
struct AppState {
    config: Arc<AnalyticsConfig>,
    store: Arc<ModelStore>,
    cache: DatasetCache,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Query parameters for POST /api/analyze
#[derive(Debug, Default, Deserialize)]
struct AnalyzeParams {
    horizon: Option<u32>,
    interval_width: Option<f64>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    /// Comma-separated category names
    categories: Option<String>,
    #[serde(default)]
    train: bool,
    #[serde(default)]
    artifacts: bool,
}

impl AnalyzeParams {
    fn to_request(&self, config: &AnalyticsConfig) -> AnalysisRequest {
        let categories = self
            .categories
            .as_deref()
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        AnalysisRequest::from_config(config)
            .with_filter(TableFilter {
                start: self.from,
                end: self.to,
                categories,
            })
            .with_horizon(self.horizon.unwrap_or(config.forecast.horizon))
            .with_interval_width(self.interval_width.unwrap_or(config.forecast.interval_width))
            .with_training(self.train)
            .with_artifacts(self.artifacts)
    }
}

#[derive(Serialize)]
struct TrainResponse {
    trained: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<TrainingSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct CategorizeRequest {
    description: String,
}

#[derive(Serialize)]
struct CategorizeResponse {
    description: String,
    category: String,
    probabilities: Vec<(String, f64)>,
}

// ============================================================================
// Error mapping
// ============================================================================

fn status_for(error: &AnalyticsError) -> StatusCode {
    match error {
        e if e.is_schema_error() => StatusCode::UNPROCESSABLE_ENTITY,
        AnalyticsError::ModelNotTrained => StatusCode::CONFLICT,
        e if e.is_malformed_input() => StatusCode::BAD_REQUEST,
        e if e.is_recoverable() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: AnalyticsError) -> Response {
    let status = status_for(&error);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %error, "request failed");
    }
    (status, Json(ApiResponse::<()>::err(error.to_string()))).into_response()
}

fn join_error_response(error: tokio::task::JoinError) -> Response {
    error!(error = %error, "worker task failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<()>::err("internal error")),
    )
        .into_response()
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/analyze - Run every component on an uploaded CSV
async fn analyze(
    State(state): State<AppState>,
    Query(params): Query<AnalyzeParams>,
    body: Bytes,
) -> Response {
    let request = params.to_request(&state.config);

    let result = tokio::task::spawn_blocking(move || -> Result<AnalysisReport, AnalyticsError> {
        let dataset = state.cache.load_bytes(&body)?;
        let session = AnalysisSession::new((*state.config).clone(), dataset);
        Ok(session.run(&request, &state.store))
    })
    .await;

    match result {
        Ok(Ok(report)) => (StatusCode::OK, Json(ApiResponse::ok(report))).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => join_error_response(e),
    }
}

/// POST /api/train - Train the categorizer on an uploaded CSV
async fn train(State(state): State<AppState>, body: Bytes) -> Response {
    let result = tokio::task::spawn_blocking(move || -> Result<TrainingOutcome, AnalyticsError> {
        let dataset = state.cache.load_bytes(&body)?;
        train_categorizer(&dataset.table, &state.config, &state.store)
    })
    .await;

    match result {
        Ok(Ok(TrainingOutcome::Trained { summary, .. })) => {
            let response = TrainResponse {
                trained: true,
                summary: Some(summary),
                reason: None,
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Ok(Ok(TrainingOutcome::Skipped { reason })) => {
            let response = TrainResponse {
                trained: false,
                summary: None,
                reason: Some(reason),
            };
            (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
        }
        Ok(Err(e)) => error_response(e),
        Err(e) => join_error_response(e),
    }
}

/// POST /api/categorize - Predict a category with the persisted model
async fn categorize(
    State(state): State<AppState>,
    Json(payload): Json<CategorizeRequest>,
) -> Response {
    let result = tokio::task::spawn_blocking(move || -> Result<CategorizeResponse, AnalyticsError> {
        let model = state.store.load()?;
        Ok(CategorizeResponse {
            category: model.predict(&payload.description),
            probabilities: model.predict_proba(&payload.description),
            description: payload.description,
        })
    })
    .await;

    match result {
        Ok(Ok(response)) => (StatusCode::OK, Json(ApiResponse::ok(response))).into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => join_error_response(e),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("🌐 Finance Insight - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = match std::env::var("INSIGHT_CONFIG") {
        Ok(path) => AnalyticsConfig::from_file(&path)
            .with_context(|| format!("Failed to load config: {}", path))?,
        Err(_) => AnalyticsConfig::default(),
    };
    let layout = config.layout();
    layout.ensure_dirs()?;
    println!("✓ Output directory: {}", layout.root().display());

    // Create shared state
    let state = AppState {
        store: Arc::new(ModelStore::new(layout.model_path())),
        cache: DatasetCache::with_config(&config.cache),
        config: Arc::new(config),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/analyze", post(analyze))
        .route("/train", post(train))
        .route("/categorize", post(categorize))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    // Start server
    let addr = std::env::var("INSIGHT_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, "server listening");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/analyze", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server stopped unexpectedly")?;
    Ok(())
}
