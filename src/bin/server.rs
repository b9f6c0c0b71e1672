use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use deployzone::config::{FilterOverrides, FilterParams, ServerConfig, Sliders, SyntheticParams};
use deployzone::export::{self, EXPORT_FILE_NAME};
use deployzone::suitability::{self, SuitabilityStats};
use deployzone::Terrain;

const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Header carrying the client's session id. Each session sees the base
/// terrain until it uploads its own DEM.
const SESSION_HEADER: &str = "x-session-id";
const MAX_SESSION_ID_LEN: usize = 64;
/// Uploaded terrains kept at once; the oldest upload is evicted first.
const MAX_SESSIONS: usize = 64;

struct SessionTerrain {
    terrain: Arc<Terrain>,
    /// Upload order, used to pick the eviction victim.
    seq: u64,
}

#[derive(Default)]
struct Sessions {
    next_seq: u64,
    terrains: HashMap<String, SessionTerrain>,
}

/// Base terrain plus per-session uploads. Uploads swap a whole `Arc`;
/// requests in flight keep the snapshot they started with.
#[derive(Clone)]
struct AppState {
    base: Arc<Terrain>,
    sessions: Arc<RwLock<Sessions>>,
}

impl AppState {
    fn new(base: Terrain) -> Self {
        Self {
            base: Arc::new(base),
            sessions: Arc::new(RwLock::new(Sessions::default())),
        }
    }

    async fn snapshot(&self, session: Option<&str>) -> Arc<Terrain> {
        if let Some(id) = session {
            if let Some(entry) = self.sessions.read().await.terrains.get(id) {
                return entry.terrain.clone();
            }
        }
        self.base.clone()
    }

    async fn replace(&self, session: &str, terrain: Terrain) -> Arc<Terrain> {
        let terrain = Arc::new(terrain);
        let mut sessions = self.sessions.write().await;
        if sessions.terrains.len() >= MAX_SESSIONS && !sessions.terrains.contains_key(session) {
            let oldest = sessions
                .terrains
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                tracing::info!("Evicting terrain of session {}", id);
                sessions.terrains.remove(&id);
            }
        }
        let seq = sessions.next_seq;
        sessions.next_seq += 1;
        sessions.terrains.insert(
            session.to_string(),
            SessionTerrain {
                terrain: terrain.clone(),
                seq,
            },
        );
        terrain
    }

    async fn reset(&self, session: &str) -> Arc<Terrain> {
        self.sessions.write().await.terrains.remove(session);
        self.base.clone()
    }
}

/// Session id from the request headers, if present and well formed.
fn session_id(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(raw) = headers.get(SESSION_HEADER) else {
        return Ok(None);
    };
    let id = raw
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("invalid {} header", SESSION_HEADER)))?;
    let valid = !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ApiError::BadRequest(format!("invalid {} header", SESSION_HEADER)));
    }
    Ok(Some(id.to_string()))
}

fn require_session_id(headers: &HeaderMap) -> Result<String, ApiError> {
    session_id(headers)?
        .ok_or_else(|| ApiError::BadRequest(format!("missing {} header", SESSION_HEADER)))
}

enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, msg).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
            }
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("worker task failed: {}", e))
    }
}

#[derive(Serialize)]
struct TerrainInfo {
    width: usize,
    height: usize,
    source: String,
    sliders: Sliders,
}

impl TerrainInfo {
    fn of(terrain: &Terrain) -> Self {
        Self {
            width: terrain.width(),
            height: terrain.height(),
            source: terrain.source.to_string(),
            sliders: terrain.sliders(),
        }
    }
}

#[derive(Serialize)]
struct SuitabilityResponse {
    width: usize,
    height: usize,
    heatmap: String,
    params: FilterParams,
    stats: SuitabilityStats,
    summary: Vec<String>,
    timings: Vec<TimingEntry>,
}

#[derive(Serialize)]
struct TimingEntry {
    name: String,
    ms: f64,
}

async fn terrain_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TerrainInfo>, ApiError> {
    let session = session_id(&headers)?;
    Ok(Json(TerrainInfo::of(&*state.snapshot(session.as_deref()).await)))
}

async fn suitability_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FilterOverrides>,
) -> Result<Json<SuitabilityResponse>, ApiError> {
    let session = session_id(&headers)?;
    let terrain = state.snapshot(session.as_deref()).await;

    let response = tokio::task::spawn_blocking(move || {
        let params = req.apply(terrain.default_params());
        let (evaluation, timings) = deployzone::evaluate(&terrain, &params);
        let heatmap = export::png_data_url(&evaluation.heatmap_rgba, terrain.width(), terrain.height())
            .map_err(|e| ApiError::Internal(format!("heatmap encode failed: {}", e)))?;

        let timing_entries = timings
            .iter()
            .map(|t| TimingEntry {
                name: t.name.to_string(),
                ms: t.ms,
            })
            .collect();

        Ok::<_, ApiError>(SuitabilityResponse {
            width: terrain.width(),
            height: terrain.height(),
            heatmap,
            params,
            summary: evaluation.stats.summary_lines(),
            stats: evaluation.stats,
            timings: timing_entries,
        })
    })
    .await??;

    Ok(Json(response))
}

async fn export_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<FilterOverrides>,
) -> Result<Response, ApiError> {
    let session = session_id(&headers)?;
    let terrain = state.snapshot(session.as_deref()).await;

    let png = tokio::task::spawn_blocking(move || {
        let params = req.apply(terrain.default_params());
        let (final_score, _) = suitability::compute_suitability(&terrain, &params);
        export::export_png(&final_score)
            .map_err(|e| ApiError::Internal(format!("export failed: {}", e)))
    })
    .await??;

    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
            ),
        ],
        png,
    )
        .into_response())
}

async fn upload_dem_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<TerrainInfo>, ApiError> {
    let session = require_session_id(&headers)?;
    if body.is_empty() {
        return Err(ApiError::BadRequest("empty DEM upload".into()));
    }

    let terrain = tokio::task::spawn_blocking(move || Terrain::from_tiff_bytes(&body))
        .await?
        .map_err(|e| ApiError::BadRequest(format!("failed to load DEM: {}", e)))?;

    let terrain = state.replace(&session, terrain).await;
    tracing::info!("Session {} uploaded a {}x{} DEM", session, terrain.width(), terrain.height());
    Ok(Json(TerrainInfo::of(&terrain)))
}

async fn reset_dem_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TerrainInfo>, ApiError> {
    let terrain = match session_id(&headers)? {
        Some(session) => state.reset(&session).await,
        None => state.base.clone(),
    };
    Ok(Json(TerrainInfo::of(&terrain)))
}

fn app(state: AppState, frontend_dir: &Path) -> Router {
    Router::new()
        .route("/api/terrain", get(terrain_handler))
        .route("/api/suitability", post(suitability_handler))
        .route("/api/export", post(export_handler))
        .route("/api/dem", post(upload_dem_handler))
        .route("/api/dem/reset", post(reset_dem_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .fallback_service(ServeDir::new(frontend_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deployzone=info,server=info,tower_http=debug,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    let terrain = match &config.dem_path {
        Some(path) => {
            let path = path.clone();
            tokio::task::spawn_blocking(move || Terrain::load(&path))
                .await?
                .context("failed to load initial DEM")?
        }
        None => Terrain::synthetic(&SyntheticParams::default()),
    };

    let app = app(AppState::new(terrain), &config.frontend_dir);

    tracing::info!("deployzone server at http://{}", config.addr);
    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
