/**
 * API REST COLLECTOR - Ingestion et requêtes de la série temporelle
 *
 * RÔLE :
 * Traducteurs fins entre HTTP et le MetricsRepository. Aucun état propre :
 * chaque requête est indépendante.
 *
 * ROUTES (/api/v1) :
 * - POST /metrics               → ingestion (201 / 400 / 500)
 * - GET  /metrics/{server_ip}   → dernier enregistrement (200 data|null / 500)
 * - POST /metrics/{server_ip}   → intervalle, form start_time/end_time (200 / 400 / 500)
 * - GET  /metrics/{disk,cpu,memory} → diagnostics de la machine locale
 *
 * ERREURS :
 * - 400 = payload ou borne invalide, jamais réessayé
 * - 500 = store indisponible ou timeout ; le service continue de répondre
 * - "pas de données" n'est pas une erreur : {"data": null}
 */

use crate::diagnostics;
use crate::models::MetricIn;
use crate::state::AppState;
use crate::store::{QueryError, StoreError};
use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error, warn};

const CPU_WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("failed to access metrics store: {0}")]
    Store(#[from] StoreError),
    #[error("local reading unavailable: {0}")]
    Diagnostics(String),
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::InvalidTimeBound { .. } => ApiError::BadRequest(e.to_string()),
            QueryError::Store(store) => ApiError::Store(store),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(msg) => {
                warn!(error = %msg, "request rejected");
                StatusCode::BAD_REQUEST
            }
            ApiError::Store(e) => {
                error!(error = %e, "store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Diagnostics(msg) => {
                error!(error = %msg, "diagnostics failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct RangeForm {
    start_time: String,
    end_time: String,
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/api/v1/metrics", post(save_metrics))
        .route("/api/v1/metrics/disk", get(get_disk_info))
        .route("/api/v1/metrics/cpu", get(get_cpu_info))
        .route("/api/v1/metrics/memory", get(get_memory_info))
        .route(
            "/api/v1/metrics/{server_ip}",
            get(get_recent_metric).post(get_metrics_in_range),
        )
        .with_state(app_state)
}

// POST /api/v1/metrics (ingestion)
async fn save_metrics(
    State(app): State<AppState>,
    payload: Result<Json<MetricIn>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(input) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    input.validate().map_err(ApiError::BadRequest)?;

    let record = app.repo.insert(input).await?;
    debug!(host_ip = %record.host_ip, "metrics saved");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Metrics saved successfully" })),
    ))
}

// GET /api/v1/metrics/{server_ip} (dernier enregistrement)
async fn get_recent_metric(
    State(app): State<AppState>,
    Path(server_ip): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let latest = app.repo.get_latest(&server_ip).await?;
    Ok(Json(json!({ "data": latest })))
}

// POST /api/v1/metrics/{server_ip} (intervalle [start_time, end_time])
async fn get_metrics_in_range(
    State(app): State<AppState>,
    Path(server_ip): Path<String>,
    form: Result<Form<RangeForm>, FormRejection>,
) -> Result<Json<Value>, ApiError> {
    let Form(range) = form.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let rows = app
        .repo
        .get_range_text(&server_ip, &range.start_time, &range.end_time)
        .await?;
    Ok(Json(json!({ "data": rows })))
}

// GET /api/v1/metrics/disk
async fn get_disk_info() -> Result<Json<diagnostics::DiskReport>, ApiError> {
    diagnostics::disk_report()
        .map(Json)
        .ok_or_else(|| ApiError::Diagnostics("no disk found".into()))
}

// GET /api/v1/metrics/cpu
async fn get_cpu_info() -> Json<diagnostics::CpuReport> {
    Json(diagnostics::cpu_report(CPU_WINDOW).await)
}

// GET /api/v1/metrics/memory
async fn get_memory_info() -> Json<diagnostics::MemoryReport> {
    Json(diagnostics::memory_report())
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<crate::health::CollectorHealth> {
    Json(app.health.get_health(&app.repo).await)
}
