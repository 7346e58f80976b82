//! Request and response bodies.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::game::{GameInstance, GameStatus};

#[derive(Debug, Deserialize)]
pub struct CreateGameRequest {
    pub user_id: String,
    pub bet_amount: Decimal,
    pub grid_size: u8,
    pub mine_count: u8,
}

#[derive(Debug, Deserialize)]
pub struct RevealRequest {
    pub tile: u8,
}

#[derive(Debug, Deserialize)]
pub struct RotateSeedRequest {
    pub user_id: String,
    pub client_seed: String,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub user_id: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub balance: Decimal,
}

/// Client view of one game. The mine layout appears only after the terminal
/// transition; live games expose the hash commitment instead.
#[derive(Debug, Serialize, Deserialize)]
pub struct GameResponse {
    pub game_id: Uuid,
    pub user_id: String,
    pub status: GameStatus,
    pub bet_amount: Decimal,
    pub grid_size: u8,
    pub mine_count: u8,
    pub revealed_tiles: Vec<u8>,
    pub current_multiplier: Decimal,
    /// What a cash-out at the current multiplier would pay.
    pub potential_payout: Decimal,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub layout_commitment: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mine_layout: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&GameInstance> for GameResponse {
    fn from(game: &GameInstance) -> Self {
        let revealed_tiles = (0..game.grid_size)
            .filter(|&t| game.is_revealed(t))
            .collect();
        Self {
            game_id: game.game_id,
            user_id: game.user_id.clone(),
            status: game.status,
            bet_amount: game.bet_amount,
            grid_size: game.grid_size,
            mine_count: game.mine_count,
            revealed_tiles,
            current_multiplier: game.current_multiplier,
            potential_payout: game.payout(),
            server_seed_hash: game.server_seed_hash.clone(),
            client_seed: game.client_seed.clone(),
            nonce: game.nonce,
            layout_commitment: game.layout_commitment.clone(),
            mine_layout: game.mine_layout.clone(),
            created_at: game.created_at,
            completed_at: game.completed_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
