//! nutra-api - HTTP API server for nutra-search

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use governor::{Quota, RateLimiter};
use serde::Deserialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use nutra_core::{
    defaults, CacheStore, CacheTier, DiscoveryEvent, DiscoveryItem, DiscoveryQueue,
    DiscoveryStatus, EmbeddingBackend, EntityMetadata, EntitySummary, Error, EvidenceGrade,
    LiteratureAuthority, LookupResponse, PriorityLevel, QueueStats, SupplementEntity,
    SupplementStore,
};
use nutra_db::Database;
use nutra_evidence::PubMedClient;
use nutra_inference::OllamaBackend;
use nutra_jobs::{BackoffPolicy, DiscoveryResolver, DiscoveryWorker, WorkerConfig};
use nutra_search::{
    CacheTierManager, LocalCache, ManagerConfig, QueryRouter, RedisCache, RouteOutcome,
};

// =============================================================================
// REQUEST ID (UUIDv7)
// =============================================================================

/// Generates time-ordered UUIDv7 request correlation IDs.
///
/// UUIDv7 embeds a Unix timestamp, so IDs sort chronologically — useful for
/// log correlation and debugging production incidents.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

// =============================================================================
// APP STATE
// =============================================================================

type GlobalRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Application state shared across handlers.
///
/// Handlers depend on the store and queue traits rather than the
/// Postgres types, so the whole surface is testable against in-memory
/// fakes.
#[derive(Clone)]
struct AppState {
    store: Arc<dyn SupplementStore>,
    queue: Arc<dyn DiscoveryQueue>,
    router: Arc<QueryRouter>,
    /// Tier 2 handle, kept for the health report.
    tier2: RedisCache,
    /// Global rate limiter (None if rate limiting is disabled).
    rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

/// OpenAPI documentation served to Swagger UI at `/docs`.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Nutra Search API",
        version = "2026.8.1",
        description = "Semantic supplement lookup with tiered caching and literature-validated auto-discovery"
    ),
    paths(
        search_supplements,
        get_supplement,
        list_discovery_queue,
        get_discovery_item,
        get_discovery_stats,
        health_check
    ),
    components(schemas(
        LookupResponse,
        EntitySummary,
        SupplementEntity,
        EntityMetadata,
        EvidenceGrade,
        CacheTier,
        DiscoveryEvent,
        DiscoveryItem,
        DiscoveryStatus,
        PriorityLevel,
        QueueStats
    )),
    tags(
        (name = "Search", description = "Semantic supplement lookup"),
        (name = "Supplements", description = "Supplement entity reads"),
        (name = "Discovery", description = "Auto-discovery queue inspection"),
        (name = "System", description = "Health checks and system info")
    )
)]
struct ApiDoc;

// =============================================================================
// CORS
// =============================================================================

fn parse_allowed_origins() -> Vec<HeaderValue> {
    let origins_str = std::env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string());

    origins_str
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect()
}

/// CORS layer from `CORS_ORIGINS`: a comma-separated origin allowlist,
/// or `*` for a public API without credentials.
fn build_cors() -> CorsLayer {
    let permissive = std::env::var("CORS_ORIGINS")
        .map(|v| v.trim() == "*")
        .unwrap_or(false);

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(std::time::Duration::from_secs(defaults::CORS_MAX_AGE_SECS));

    if permissive {
        cors.allow_origin(tower_http::cors::Any)
    } else {
        cors.allow_origin(AllowOrigin::list(parse_allowed_origins()))
            .allow_credentials(true)
    }
}

// =============================================================================
// STARTUP
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: "nutra_api=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "nutra_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("nutra-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer().with_writer(non_blocking);
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            } else {
                layer = layer.with_ansi(false); // no ANSI in files
            }
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Get configuration from environment
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/nutra".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults::SERVER_PORT);

    // Rate limiting configuration
    // RATE_LIMIT_REQUESTS: requests per period (default: 100)
    // RATE_LIMIT_PERIOD_SECS: period in seconds (default: 60 = 1 minute)
    let rate_limit_requests: u64 = std::env::var("RATE_LIMIT_REQUESTS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults::RATE_LIMIT_REQUESTS);
    let rate_limit_period_secs: u64 = std::env::var("RATE_LIMIT_PERIOD_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(defaults::RATE_LIMIT_PERIOD_SECS);
    let rate_limit_enabled: bool = std::env::var("RATE_LIMIT_ENABLED")
        .map(|v| v != "false" && v != "0")
        .unwrap_or(true);

    info!(
        "Rate limiting: {} ({} requests per {} seconds)",
        if rate_limit_enabled {
            "enabled"
        } else {
            "disabled"
        },
        rate_limit_requests,
        rate_limit_period_secs
    );

    // Connect to database, scoped to the active embedding model
    let backend = Arc::new(OllamaBackend::from_env());
    info!("Connecting to database...");
    let pool = nutra_db::create_pool(&database_url).await?;
    let db = Database::with_embedding_model(pool, backend.model_name());
    info!("Database connected");

    // Run pending database migrations on startup
    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    // Verify the inference backend is reachable. Lookups degrade to
    // cache-only service while it is down, so this is not fatal.
    match backend.health_check().await {
        Ok(true) => info!(model = backend.model_name(), "Embedding backend reachable"),
        _ => warn!(
            model = backend.model_name(),
            "Embedding backend unreachable; lookups serve from cache until it returns"
        ),
    }

    let store: Arc<dyn SupplementStore> = Arc::new(db.supplements.clone());
    let queue: Arc<dyn DiscoveryQueue> = Arc::new(db.discovery.clone());

    // Cache tiers: in-process LRU first, then Redis
    let tier2 = RedisCache::from_env().await;
    let manager = Arc::new(
        CacheTierManager::with_config(
            store.clone(),
            backend.clone() as Arc<dyn EmbeddingBackend>,
            ManagerConfig::from_env(),
        )
        .with_tier(Arc::new(LocalCache::new()) as Arc<dyn CacheStore>)
        .with_tier(Arc::new(tier2.clone()) as Arc<dyn CacheStore>),
    );
    let router = Arc::new(QueryRouter::new(
        manager.clone(),
        store.clone(),
        queue.clone(),
    ));

    // Create and start the discovery worker
    let authority: Arc<dyn LiteratureAuthority> = Arc::new(PubMedClient::from_env());
    let resolver = Arc::new(DiscoveryResolver::new(
        store.clone(),
        backend.clone() as Arc<dyn EmbeddingBackend>,
        authority,
        manager.clone(),
    ));
    let _worker_handle = DiscoveryWorker::new(queue.clone(), resolver)
        .with_config(WorkerConfig::from_env())
        .with_backoff(BackoffPolicy::from_env())
        .with_wake(db.discovery.discovery_notify())
        .start();

    // Create rate limiter if enabled
    let rate_limiter = if rate_limit_enabled {
        let quota = Quota::with_period(std::time::Duration::from_secs(rate_limit_period_secs))
            .expect("Rate limit period must be non-zero")
            .allow_burst(
                NonZeroU32::new(rate_limit_requests as u32).expect("Rate limit must be non-zero"),
            );
        Some(Arc::new(RateLimiter::direct(quota)))
    } else {
        None
    };

    let state = AppState {
        store,
        queue,
        router,
        tier2,
        rate_limiter,
    };

    let app = build_app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the full application router with middleware.
fn build_app(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // OpenAPI / Swagger UI
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Search
        .route("/api/v1/search", get(search_supplements))
        // Supplements
        .route("/api/v1/supplements/:id", get(get_supplement))
        // Discovery queue
        .route("/api/v1/discovery/queue", get(list_discovery_queue))
        .route("/api/v1/discovery/queue/:id", get(get_discovery_item))
        .route("/api/v1/discovery/stats", get(get_discovery_stats))
        // Middleware
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(build_cors())
        .layer(RequestBodyLimitLayer::new(64 * 1024))
        .with_state(state)
}

// =============================================================================
// RATE LIMITING MIDDLEWARE
// =============================================================================

async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, (StatusCode, Json<serde_json::Value>)> {
    // If rate limiting is disabled, pass through
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            tracing::warn!("Rate limit exceeded");
            return Err((
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({
                    "error": "rate_limit_exceeded",
                    "error_description": "Too many requests. Please wait before retrying."
                })),
            ));
        }
    }
    Ok(next.run(request).await)
}

// =============================================================================
// HEALTH CHECK
// =============================================================================

/// Service health, including database reachability and cache tier mode.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    responses((status = 200, description = "Service health report"))
)]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.queue.pending_count().await {
        Ok(_) => "connected",
        Err(_) => "unreachable",
    };
    let cache_tier2 = if state.tier2.is_connected().await {
        "connected"
    } else {
        "disabled"
    };

    Json(serde_json::json!({
        "status": if database == "connected" { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "cacheTier2": cache_tier2,
    }))
}

// =============================================================================
// SEARCH
// =============================================================================

#[derive(Debug, Deserialize, utoipa::IntoParams)]
struct SearchParams {
    /// Free-text supplement query.
    q: String,
    /// Maximum number of results (default 5, capped at 20).
    limit: Option<i64>,
}

/// Semantic supplement lookup.
///
/// Resolves the query through the cache tiers and the vector store. A
/// definitive miss returns 404 and queues the term for background
/// discovery, so repeatedly asked-for supplements appear on their own.
#[utoipa::path(
    get,
    path = "/api/v1/search",
    tag = "Search",
    params(SearchParams),
    responses(
        (status = 200, description = "Best match above the similarity floor", body = LookupResponse),
        (status = 404, description = "No match; discovery may have been queued", body = LookupResponse),
        (status = 400, description = "Empty or overlong query"),
        (status = 429, description = "Rate limit exceeded")
    )
)]
async fn search_supplements(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let started = Instant::now();
    let limit = params.limit.unwrap_or(defaults::SEARCH_LIMIT);

    let outcome = state.router.handle(&params.q, limit).await?;
    let latency_ms = started.elapsed().as_millis() as u64;

    let response = match outcome {
        RouteOutcome::Found {
            best,
            alternatives,
            tier,
        } => {
            // Alternatives exist only when the store answered; cache
            // hits carry just the best match.
            let alternatives = (tier == CacheTier::Tier3)
                .then(|| alternatives.iter().map(EntitySummary::from).collect());
            let body = LookupResponse {
                success: true,
                entity: Some(EntitySummary::from(&best)),
                alternatives,
                latency_ms,
                cache_tier: tier,
                discovery_queued: None,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        RouteOutcome::NotFound { discovery_queued } => {
            let body = LookupResponse {
                success: false,
                entity: None,
                alternatives: None,
                latency_ms,
                cache_tier: CacheTier::Miss,
                discovery_queued: Some(discovery_queued),
            };
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
    };

    Ok(response)
}

// =============================================================================
// SUPPLEMENTS
// =============================================================================

/// Fetch one supplement entity by id.
#[utoipa::path(
    get,
    path = "/api/v1/supplements/{id}",
    tag = "Supplements",
    params(("id" = Uuid, Path, description = "Entity id")),
    responses(
        (status = 200, description = "The entity", body = SupplementEntity),
        (status = 404, description = "Unknown or soft-deleted entity")
    )
)]
async fn get_supplement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SupplementEntity>, ApiError> {
    let entity = state.store.get(id).await?;
    Ok(Json(entity))
}

// =============================================================================
// DISCOVERY QUEUE
// =============================================================================

#[derive(Debug, Deserialize, utoipa::IntoParams)]
struct DiscoveryListParams {
    /// Filter by status: pending, processing, validated, rejected, failed.
    status: Option<String>,
    /// Maximum rows to return (default 50, capped at 200).
    limit: Option<i64>,
}

/// List recent discovery queue items as compact events.
#[utoipa::path(
    get,
    path = "/api/v1/discovery/queue",
    tag = "Discovery",
    params(DiscoveryListParams),
    responses(
        (status = 200, description = "Recent queue items, newest first", body = [DiscoveryEvent]),
        (status = 400, description = "Unknown status filter")
    )
)]
async fn list_discovery_queue(
    State(state): State<AppState>,
    Query(params): Query<DiscoveryListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let status = params
        .status
        .as_deref()
        .map(DiscoveryStatus::from_str)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let limit = params.limit.unwrap_or(50).clamp(1, 200);

    let items = state.queue.list(status, limit).await?;
    let events: Vec<DiscoveryEvent> = items.iter().map(DiscoveryEvent::from).collect();
    Ok(Json(serde_json::json!({
        "count": events.len(),
        "items": events,
    })))
}

/// Full detail for one discovery queue item, attempt history included.
#[utoipa::path(
    get,
    path = "/api/v1/discovery/queue/{id}",
    tag = "Discovery",
    params(("id" = Uuid, Path, description = "Queue item id")),
    responses(
        (status = 200, description = "The queue item", body = DiscoveryItem),
        (status = 404, description = "Unknown item")
    )
)]
async fn get_discovery_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DiscoveryItem>, ApiError> {
    match state.queue.get(id).await? {
        Some(item) => Ok(Json(item)),
        None => Err(ApiError::NotFound(format!(
            "discovery item {id} not found"
        ))),
    }
}

/// Per-status discovery queue counts.
#[utoipa::path(
    get,
    path = "/api/v1/discovery/stats",
    tag = "Discovery",
    responses((status = 200, description = "Queue counts by status", body = QueueStats))
)]
async fn get_discovery_stats(
    State(state): State<AppState>,
) -> Result<Json<QueueStats>, ApiError> {
    let stats = state.queue.stats().await?;
    Ok(Json(stats))
}

// =============================================================================
// ERROR HANDLING
// =============================================================================

#[derive(Debug)]
enum ApiError {
    Internal(Error),
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    Unavailable(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match &err {
            Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            Error::SupplementNotFound(id) => {
                ApiError::NotFound(format!("supplement {id} not found"))
            }
            Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            Error::DuplicateEntity { id } => {
                ApiError::Conflict(format!("entity already exists: {id}"))
            }
            Error::EmbeddingUnavailable(msg) => ApiError::Unavailable(msg.clone()),
            _ => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Internal(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

// =============================================================================
// TESTS
// =============================================================================
