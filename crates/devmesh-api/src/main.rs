use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use clap::{Args, Parser};
use log::info;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use devmesh_core::db::{EventFilter, SearchFilter};
use devmesh_core::models::{IngestReport, LogEvent, LogLevel, NewLogEvent};
use devmesh_core::search::{
    EventSearchResult, TemplateSearchResult, DEFAULT_EVENT_LIMIT, DEFAULT_EXAMPLES,
    DEFAULT_TEMPLATE_LIMIT,
};
use devmesh_core::{
    Config, EmbeddingClient, Error, IngestPipeline, SearchLayer, Store, TemplateCache,
};

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn try_main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config_path = cli
        .common
        .config
        .unwrap_or_else(Config::default_config_path);
    let config = Config::ensure_at(&config_path)?;

    let store = Arc::new(
        Store::connect(
            &config.database_url,
            config.embedding.dim,
            config.max_db_connections,
        )
        .await?,
    );

    let cache = Arc::new(TemplateCache::new(config.cache.capacity));
    if config.cache.warm_on_start > 0 {
        let rows = store.recent_templates(config.cache.warm_on_start).await?;
        cache.warm(&rows);
    }

    let embedder = Arc::new(EmbeddingClient::new(config.embedding.clone())?);
    let pipeline = Arc::new(IngestPipeline::new(
        store.clone(),
        cache.clone(),
        embedder.clone(),
        config.ingest.clone(),
        config.canon_version.clone(),
        config.chunk_version.clone(),
    ));
    let search = Arc::new(SearchLayer::new(store.clone(), embedder.clone()));

    let state = AppState {
        store,
        pipeline,
        search,
        api_key: config.api.api_key.clone(),
        node: config.api.node.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/ingest/logs", post(ingest_logs))
        .route("/query/logs", get(query_logs))
        .route("/search/templates", get(search_templates))
        .route("/search/logs", get(search_logs))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/info", get(server_info))
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let bind = cli.common.bind.unwrap_or(config.api.bind);
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid bind address {bind:?}: {e}"))?;
    info!("Starting API server on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Debug, Parser)]
#[command(author, version, about = "HTTP API server for devmesh")]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Override the config file path
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Override the bind address (host:port)
    #[arg(long)]
    bind: Option<String>,
}

#[derive(Clone)]
struct AppState {
    store: Arc<Store>,
    pipeline: Arc<IngestPipeline>,
    search: Arc<SearchLayer>,
    api_key: Option<String>,
    node: String,
}

// =============================================================================
// Error translation
// =============================================================================

struct ApiError(Error);

#[derive(Serialize)]
struct ErrorBody {
    error_code: &'static str,
    message: String,
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self.0 {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Error::Busy => (StatusCode::TOO_MANY_REQUESTS, "BUSY"),
            Error::Database(_) => (StatusCode::SERVICE_UNAVAILABLE, "DATABASE_ERROR"),
            Error::EmbeddingUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "EMBEDDING_UNAVAILABLE")
            }
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        if status.is_server_error() {
            log::error!("request failed: {}", self.0);
        }
        let body = ErrorBody {
            error_code,
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Auth
// =============================================================================

// Shared-secret check, active only when a key is configured. Health and
// info stay public either way.
async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ref expected) = state.api_key else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok());
    if provided != Some(expected.as_str()) {
        let body = ErrorBody {
            error_code: "UNAUTHORIZED",
            message: "Invalid or missing API key".to_string(),
        };
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    }
    next.run(request).await
}

// =============================================================================
// Handlers
// =============================================================================

#[derive(Serialize)]
struct RootResponse {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct InfoResponse {
    name: &'static str,
    version: &'static str,
    description: &'static str,
    node: String,
    events: i64,
    templates: i64,
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
    })
}

async fn server_info(State(state): State<AppState>) -> Result<Json<InfoResponse>, ApiError> {
    let events = state.store.count_events().await?;
    let templates = state.store.count_templates().await?;
    Ok(Json(InfoResponse {
        name: "DevMesh",
        version: env!("CARGO_PKG_VERSION"),
        description: "AI-native observability for self-hosted fleets",
        node: state.node.clone(),
        events,
        templates,
    }))
}

#[derive(Debug, Deserialize)]
struct IngestRequest {
    logs: Vec<NewLogEvent>,
}

async fn ingest_logs(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<(StatusCode, Json<IngestReport>), ApiError> {
    let report = state.pipeline.ingest(request.logs).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

#[derive(Debug, Deserialize)]
struct LogQueryParams {
    service: Option<String>,
    host: Option<String>,
    level: Option<LogLevel>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    limit: Option<i64>,
    offset: Option<i64>,
}

async fn query_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<Json<Vec<LogEvent>>, ApiError> {
    let filter = EventFilter {
        service: params.service,
        host: params.host,
        level: params.level,
        start: params.start,
        end: params.end,
        limit: params.limit.unwrap_or(100),
        offset: params.offset.unwrap_or(0),
    };
    let events = state.search.query_logs(&filter).await?;
    Ok(Json(events))
}

#[derive(Debug, Deserialize)]
struct TemplateSearchParams {
    q: String,
    limit: Option<i64>,
    examples: Option<i64>,
    service: Option<String>,
    level: Option<LogLevel>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

async fn search_templates(
    State(state): State<AppState>,
    Query(params): Query<TemplateSearchParams>,
) -> Result<Json<TemplateSearchResult>, ApiError> {
    let filter = SearchFilter {
        service: params.service,
        level: params.level,
        start: params.start,
        end: params.end,
    };
    let result = state
        .search
        .search_templates(
            &params.q,
            params.limit.unwrap_or(DEFAULT_TEMPLATE_LIMIT),
            params.examples.unwrap_or(DEFAULT_EXAMPLES),
            &filter,
        )
        .await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct EventSearchParams {
    q: String,
    limit: Option<i64>,
    service: Option<String>,
    level: Option<LogLevel>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
}

async fn search_logs(
    State(state): State<AppState>,
    Query(params): Query<EventSearchParams>,
) -> Result<Json<EventSearchResult>, ApiError> {
    let filter = SearchFilter {
        service: params.service,
        level: params.level,
        start: params.start,
        end: params.end,
    };
    let result = state
        .search
        .search_events(
            &params.q,
            params.limit.unwrap_or(DEFAULT_EVENT_LIMIT),
            &filter,
        )
        .await?;
    Ok(Json(result))
}
