//! HTTP surface of the aggregation service.
//!
//! Thin handlers over the core components: every cache interaction goes
//! through the injected `CacheStore`, every failure path renders the same
//! structured JSON error envelope, and no handler crashes the process.

use crate::cache::{CacheError, CacheStore, seconds_until_midnight};
use crate::catalog;
use crate::config::{CorsConfig, Listener, WarmConfig};
use crate::fetch::FetchError;
use crate::metrics_defs::{CACHE_HIT, CACHE_MISS};
use crate::query::FullScan;
use crate::upstream::RankingSite;
use crate::warm::{CANONICAL_KEY, WarmError, WarmScheduler};
use axum::extract::{Query, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use shared::counter;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("missing required parameter: {0}")]
    MissingParam(&'static str),

    #[error("parameter {0} is not valid")]
    InvalidParam(&'static str),

    #[error(transparent)]
    Warm(#[from] WarmError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("upstream fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("ranking not warmed yet; trigger warm-start first")]
    NotWarmed,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingParam(_) | ApiError::InvalidParam(_) => StatusCode::BAD_REQUEST,
            ApiError::Warm(WarmError::InvalidBatch(_)) => StatusCode::BAD_REQUEST,
            ApiError::Warm(WarmError::Cache(_)) | ApiError::Cache(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Fetch(_) => StatusCode::BAD_GATEWAY,
            ApiError::NotWarmed => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ApiError::MissingParam(_) | ApiError::InvalidParam(_) => "Invalid request",
            ApiError::Warm(WarmError::InvalidBatch(_)) => "Invalid request",
            ApiError::Warm(_) | ApiError::Cache(_) => "Cache failure",
            ApiError::Fetch(_) => "Failed to fetch data",
            ApiError::NotWarmed => "Ranking not warmed",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.label(),
            "details": { "message": self.to_string() },
            "timestamp": Utc::now().to_rfc3339(),
        }));
        (self.status(), body).into_response()
    }
}

pub struct AppState {
    pub cache: Arc<dyn CacheStore>,
    pub site: Arc<RankingSite>,
    pub warm: WarmScheduler,
    pub scan: FullScan,
    cors_origin: HeaderValue,
}

impl AppState {
    pub fn new(
        site: Arc<RankingSite>,
        cache: Arc<dyn CacheStore>,
        warm_config: WarmConfig,
        cors: &CorsConfig,
    ) -> Self {
        let warm = WarmScheduler::new(site.clone(), cache.clone(), warm_config.clone());
        let scan = FullScan::new(site.clone(), cache.clone(), warm_config);
        let cors_origin = HeaderValue::from_str(&cors.allowed_origin)
            .unwrap_or_else(|_| HeaderValue::from_static("*"));
        AppState {
            cache,
            site,
            warm,
            scan,
            cors_origin,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/metadata", get(metadata))
        .route("/api/growth", get(growth_lookup))
        .route("/api/growth-page", get(growth_page))
        .route("/api/growth-top-1000", get(growth_top_1000))
        .route("/api/growth-warm-start", post(warm_start))
        .route("/api/growth-warm-batch", get(warm_batch))
        .route("/api/growth-all", get(growth_all))
        .route("/api/top-players", get(top_players))
        .route("/api/cache-stats", get(cache_stats))
        .route("/api/cache-clear", delete(cache_clear))
        .layer(middleware::from_fn_with_state(state.clone(), apply_cors))
        .with_state(state)
}

#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn serve(listener: &Listener, state: Arc<AppState>) -> Result<(), ServeError> {
    let addr = format!("{}:{}", listener.host, listener.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "serving ranking API");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn apply_cors(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, state.cors_origin.clone());
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

/// Query parameters arrive as raw strings so malformed values render the
/// structured error envelope instead of the framework's plain-text reject.
#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Params {
    ign: Option<String>,
    region_code: Option<String>,
    page: Option<String>,
    batch: Option<String>,
}

fn parse_number<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
) -> Result<Option<T>, ApiError> {
    match raw {
        None => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ApiError::InvalidParam(name)),
    }
}

async fn metadata() -> Json<Value> {
    Json(catalog::metadata())
}

async fn growth_lookup(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<Value>, ApiError> {
    let ign = params
        .ign
        .filter(|ign| !ign.is_empty())
        .ok_or(ApiError::MissingParam("ign"))?;
    let region_code = parse_number(params.region_code, "regionCode")?.unwrap_or(0);

    let key = format!("growth-{}-{}", ign.to_lowercase(), region_code);
    if let Some(hit) = state.cache.get(&key).await? {
        counter!(CACHE_HIT).increment(1);
        return Ok(Json(hit));
    }
    counter!(CACHE_MISS).increment(1);

    let payload = state.site.lookup(&ign, region_code).await?;
    state
        .cache
        .set(&key, payload.clone(), seconds_until_midnight())
        .await?;
    Ok(Json(payload))
}

async fn growth_page(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<Value>, ApiError> {
    let page = parse_number(params.page, "page")?.unwrap_or(1u32);
    let region_code = parse_number(params.region_code, "regionCode")?.unwrap_or(0);

    let key = format!("growth-page-{page}-{region_code}");
    if let Some(hit) = state.cache.get(&key).await? {
        counter!(CACHE_HIT).increment(1);
        return Ok(Json(hit));
    }
    counter!(CACHE_MISS).increment(1);

    let payload = state.site.raw_page(page, region_code).await?;
    state
        .cache
        .set(&key, payload.clone(), seconds_until_midnight())
        .await?;
    Ok(Json(payload))
}

async fn growth_top_1000(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<Value>, ApiError> {
    let region_code = parse_number(params.region_code, "regionCode")?.unwrap_or(0);

    let key = format!("growth-top-1000-{region_code}");
    if let Some(hit) = state.cache.get(&key).await? {
        counter!(CACHE_HIT).increment(1);
        return Ok(Json(hit));
    }
    counter!(CACHE_MISS).increment(1);

    let records = state.site.fetch_top_1000(region_code).await;
    let payload = serde_json::to_value(records).map_err(CacheError::Encode)?;
    state
        .cache
        .set(&key, payload.clone(), seconds_until_midnight())
        .await?;
    Ok(Json(payload))
}

async fn warm_start(State(state): State<Arc<AppState>>) -> Json<Value> {
    let scheduler = state.warm.clone();
    tokio::spawn(async move {
        if let Err(error) = scheduler.run_batch(1).await {
            tracing::error!(error = %error, "warm-up failed");
        }
    });
    Json(json!({ "status": "warming started" }))
}

async fn warm_batch(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<Value>, ApiError> {
    let batch: u32 = parse_number(params.batch, "batch")?.ok_or(ApiError::MissingParam("batch"))?;
    let report = state.warm.run_batch(batch).await?;
    let payload = serde_json::to_value(report).map_err(CacheError::Encode)?;
    Ok(Json(payload))
}

async fn growth_all(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<Value>, ApiError> {
    let region_code = parse_number(params.region_code, "regionCode")?;
    let ranking = state.scan.aggregate(region_code).await?;
    let payload = serde_json::to_value(ranking).map_err(CacheError::Encode)?;
    Ok(Json(payload))
}

async fn top_players(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<Value>, ApiError> {
    let region_code: Option<i64> = parse_number(params.region_code, "regionCode")?;
    let key = match region_code {
        Some(code) => format!("top-players-{code}"),
        None => CANONICAL_KEY.to_string(),
    };
    match state.cache.get(&key).await? {
        Some(ranking) => {
            counter!(CACHE_HIT).increment(1);
            Ok(Json(ranking))
        }
        None => {
            counter!(CACHE_MISS).increment(1);
            Err(ApiError::NotWarmed)
        }
    }
}

async fn cache_stats(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let size = state.cache.size().await?;
    Ok(Json(json!({ "size": size })))
}

async fn cache_clear(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state.cache.clear().await?;
    Ok(Json(json!({ "status": "cache cleared" })))
}
