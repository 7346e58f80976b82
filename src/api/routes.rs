//! Route definitions.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers::*;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        // Game lifecycle
        .route("/api/games", post(create_game_handler))
        .route("/api/games/:game_id", get(get_game_handler))
        .route("/api/games/:game_id/reveal", post(reveal_handler))
        .route("/api/games/:game_id/cashout", post(cashout_handler))
        .route("/api/games/:game_id/verify", get(verify_handler))
        // Provable fairness
        .route("/api/seeds/:user_id", get(get_seeds_handler))
        .route("/api/seeds/rotate", post(rotate_seeds_handler))
        // Balances
        .route("/api/balance/:user_id", get(get_balance_handler))
        .route(
            "/api/balance/:user_id/entries",
            get(get_ledger_entries_handler),
        )
        .route("/api/balance/deposit", post(deposit_handler))
        .with_state(state)
}
