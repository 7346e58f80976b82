//! Request handlers.
//!
//! Thin layer over the engine: parse, delegate, map errors. All game and
//! money invariants live below the `SettlementEngine` boundary, never here.

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

use super::errors::ApiError;
use super::middleware::RequestId;
use super::models::{
    BalanceResponse, CreateGameRequest, DepositRequest, GameResponse, HealthResponse,
    RevealRequest, RotateSeedRequest,
};
use crate::engine::SettlementEngine;
use crate::errors::EngineError;
use crate::ledger::{BalanceLedger, LedgerEntry};
use crate::seeds::{RotationOutcome, SeedPairView};
use crate::verify::{AuditBundle, Auditor};

pub struct AppState {
    pub engine: Arc<SettlementEngine>,
    pub auditor: Auditor,
    pub ledger: Arc<dyn BalanceLedger>,
    pub version: String,
}

type HandlerResult<T> = Result<Json<T>, ApiError>;

fn map_err(request_id: &RequestId, err: EngineError) -> ApiError {
    ApiError::new(request_id.0.clone(), err)
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: state.version.clone(),
    })
}

pub async fn create_game_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<CreateGameRequest>,
) -> HandlerResult<GameResponse> {
    let game = state
        .engine
        .create_game(&req.user_id, req.bet_amount, req.grid_size, req.mine_count)
        .await
        .map_err(|e| map_err(&request_id, e))?;
    Ok(Json(GameResponse::from(&game)))
}

pub async fn get_game_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(game_id): Path<Uuid>,
) -> HandlerResult<GameResponse> {
    let game = state
        .engine
        .game(&game_id)
        .await
        .map_err(|e| map_err(&request_id, e))?;
    Ok(Json(GameResponse::from(&game)))
}

pub async fn reveal_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(game_id): Path<Uuid>,
    Json(req): Json<RevealRequest>,
) -> HandlerResult<GameResponse> {
    let game = state
        .engine
        .reveal_tile(&game_id, req.tile)
        .await
        .map_err(|e| map_err(&request_id, e))?;
    Ok(Json(GameResponse::from(&game)))
}

pub async fn cashout_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(game_id): Path<Uuid>,
) -> HandlerResult<GameResponse> {
    let game = state
        .engine
        .cash_out(&game_id)
        .await
        .map_err(|e| map_err(&request_id, e))?;
    Ok(Json(GameResponse::from(&game)))
}

pub async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(game_id): Path<Uuid>,
) -> HandlerResult<AuditBundle> {
    let bundle = state
        .auditor
        .audit_bundle(&game_id)
        .await
        .map_err(|e| map_err(&request_id, e))?;
    Ok(Json(bundle))
}

pub async fn get_seeds_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Path(user_id): Path<String>,
) -> HandlerResult<SeedPairView> {
    let view = state
        .engine
        .active_seed_view(&user_id)
        .await
        .map_err(|e| map_err(&request_id, e))?;
    Ok(Json(view))
}

pub async fn rotate_seeds_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<RotateSeedRequest>,
) -> HandlerResult<RotationOutcome> {
    let outcome = state
        .engine
        .rotate_client_seed(&req.user_id, &req.client_seed)
        .await
        .map_err(|e| map_err(&request_id, e))?;
    Ok(Json(outcome))
}

pub async fn get_balance_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<BalanceResponse> {
    let balance = state.ledger.balance(&user_id).await;
    Json(BalanceResponse { user_id, balance })
}

pub async fn get_ledger_entries_handler(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> Json<Vec<LedgerEntry>> {
    Json(state.ledger.entries(&user_id).await)
}

pub async fn deposit_handler(
    State(state): State<Arc<AppState>>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<DepositRequest>,
) -> HandlerResult<BalanceResponse> {
    let balance = state
        .ledger
        .deposit(&req.user_id, req.amount)
        .await
        .map_err(|e| map_err(&request_id, e))?;
    Ok(Json(BalanceResponse {
        user_id: req.user_id,
        balance,
    }))
}
