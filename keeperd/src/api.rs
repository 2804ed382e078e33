//! HTTP API for the keeper daemon.
//!
//! Provides REST endpoints for:
//! - Health check
//! - Engine status (monitored positions)
//! - Position registration (intake contract)
//! - Position lookup and history
//! - Manual exit and emergency exit-all

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use keeper_domain::{ExitData, MonitoredPosition, PositionStatus};
use keeper_store::{HistoryFilter, PositionStore};

use crate::error::DaemonError;
use crate::monitor::{EngineStatus, MonitorEngine, RegisterRequest};

// =============================================================================
// API State
// =============================================================================

/// Shared state for API handlers.
pub struct ApiState<S: PositionStore + 'static> {
    /// The monitor engine backing every endpoint
    pub engine: Arc<MonitorEngine<S>>,
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response after registering a position.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub position_id: Uuid,
    pub trade_id: String,
}

/// Summary of a position record.
#[derive(Debug, Serialize)]
pub struct PositionSummary {
    pub id: Uuid,
    pub trade_id: String,
    pub token_symbol: String,
    pub side: String,
    pub status: String,
    pub entry_price: Decimal,
    pub entry_amount: Decimal,
    pub tp1: Decimal,
    pub tp2: Decimal,
    pub sl: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_price: Option<Decimal>,
    pub trailing_stop_price: Decimal,
    pub price_check_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_loss: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request body for a manual exit.
#[derive(Debug, Deserialize)]
pub struct ManualExitRequest {
    #[serde(default = "default_exit_reason")]
    pub reason: String,
}

fn default_exit_reason() -> String {
    "manual".to_string()
}

/// Response for a manual exit.
#[derive(Debug, Serialize)]
pub struct ManualExitResponse {
    pub executed: bool,
}

/// Query parameters for history lookups.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub user_id: Option<String>,
    pub token_symbol: Option<String>,
    pub status: Option<String>,
    pub limit: Option<usize>,
}

/// Response for emergency exit-all.
#[derive(Debug, Serialize)]
pub struct ExitAllResponse {
    pub exited_trade_ids: Vec<String>,
    pub count: usize,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// =============================================================================
// Router
// =============================================================================

/// Create the API router.
pub fn create_router<S>(state: Arc<ApiState<S>>) -> Router
where
    S: PositionStore + 'static,
{
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/positions", get(active_handler).post(register_handler))
        .route("/positions/:trade_id", get(get_position_handler))
        .route("/positions/:trade_id/exit", post(manual_exit_handler))
        .route("/history", get(history_handler))
        .route("/panic", post(panic_handler))
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Engine status with per-position monitoring fields.
async fn status_handler<S>(State(state): State<Arc<ApiState<S>>>) -> Json<EngineStatus>
where
    S: PositionStore + 'static,
{
    Json(state.engine.status().await)
}

/// All active position records.
async fn active_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
) -> Result<Json<Vec<PositionSummary>>, (StatusCode, Json<ErrorResponse>)>
where
    S: PositionStore + 'static,
{
    let positions = state.engine.get_active().await.map_err(to_error_response)?;
    Ok(Json(positions.iter().map(position_to_summary).collect()))
}

/// Register a position for monitoring (intake contract).
async fn register_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), (StatusCode, Json<ErrorResponse>)>
where
    S: PositionStore + 'static,
{
    let trade_id = request.trade_id.clone();
    let position_id = state
        .engine
        .register_position(request)
        .await
        .map_err(to_error_response)?;

    Ok((StatusCode::CREATED, Json(RegisterResponse { position_id, trade_id })))
}

/// Look up one position by trade id.
async fn get_position_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Path(trade_id): Path<String>,
) -> Result<Json<PositionSummary>, (StatusCode, Json<ErrorResponse>)>
where
    S: PositionStore + 'static,
{
    let position = state
        .engine
        .get_position_status(&trade_id)
        .await
        .map_err(to_error_response)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse { error: format!("Position not found: {}", trade_id) }),
            )
        })?;

    Ok(Json(position_to_summary(&position)))
}

/// Operator-initiated exit for one position.
async fn manual_exit_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Path(trade_id): Path<String>,
    Json(request): Json<ManualExitRequest>,
) -> Result<Json<ManualExitResponse>, (StatusCode, Json<ErrorResponse>)>
where
    S: PositionStore + 'static,
{
    let executed = state
        .engine
        .manual_exit(&trade_id, &request.reason)
        .await
        .map_err(to_error_response)?;

    Ok(Json(ManualExitResponse { executed }))
}

/// Terminal records, filterable by user, token, and status.
async fn history_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<PositionSummary>>, (StatusCode, Json<ErrorResponse>)>
where
    S: PositionStore + 'static,
{
    let status = match query.status.as_deref() {
        None => None,
        Some("exited") => Some(PositionStatus::Exited),
        Some("failed") => Some(PositionStatus::Failed),
        Some(other) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("Invalid status filter: {}. Expected: exited, failed", other),
                }),
            ))
        },
    };

    let filter = HistoryFilter {
        user_id: query.user_id,
        token_symbol: query.token_symbol,
        status,
        limit: query.limit,
    };

    let records = state.engine.get_history(filter).await.map_err(to_error_response)?;
    Ok(Json(records.iter().map(position_to_summary).collect()))
}

/// Emergency close of every monitored position.
async fn panic_handler<S>(
    State(state): State<Arc<ApiState<S>>>,
) -> Result<Json<ExitAllResponse>, (StatusCode, Json<ErrorResponse>)>
where
    S: PositionStore + 'static,
{
    let exited = state
        .engine
        .exit_all("operator panic")
        .await
        .map_err(to_error_response)?;

    Ok(Json(ExitAllResponse { count: exited.len(), exited_trade_ids: exited }))
}

// =============================================================================
// Helpers
// =============================================================================

fn to_error_response(error: DaemonError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &error {
        DaemonError::PositionNotFound(_) => StatusCode::NOT_FOUND,
        DaemonError::DuplicateTradeId(_) => StatusCode::CONFLICT,
        DaemonError::InvalidRequest(_) | DaemonError::Domain(_) => StatusCode::BAD_REQUEST,
        DaemonError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (status, Json(ErrorResponse { error: error.to_string() }))
}

fn position_to_summary(position: &MonitoredPosition) -> PositionSummary {
    let (exit_kind, profit_loss, error) = match &position.exit_data {
        Some(ExitData::Completed { kind, profit_loss, .. }) => {
            (Some(kind.as_str().to_string()), Some(*profit_loss), None)
        },
        Some(ExitData::Failed { error, .. }) => (None, None, Some(error.clone())),
        None => (None, None, None),
    };

    PositionSummary {
        id: position.id,
        trade_id: position.trade_id.clone(),
        token_symbol: position.token_symbol.as_str().to_string(),
        side: position.side.to_string(),
        status: position.status.as_str().to_string(),
        entry_price: position.entry_price.as_decimal(),
        entry_amount: position.entry_amount.as_decimal(),
        tp1: position.tp1.as_decimal(),
        tp2: position.tp2.as_decimal(),
        sl: position.sl.as_decimal(),
        current_price: position.current_price.map(|p| p.as_decimal()),
        trailing_stop_price: position.trailing_stop_price.as_decimal(),
        price_check_count: position.price_check_count,
        exit_kind,
        profit_loss,
        error,
    }
}
