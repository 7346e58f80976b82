//! Bet history: append-only records of finalized rounds.
//!
//! Records are written outside the settlement lock, after the balance has
//! committed. A write failure must never roll settlement back, so the
//! recorder logs it and retries in the background with backoff, best-effort.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::game::{GameInstance, GameStatus};
use crate::store::EngineStore;

/// Immutable snapshot of a completed round. One record per game; seed
/// material is referenced by hash so a verifier can tie the record back to
/// the revealed server seed once the pair rotates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BetHistoryRecord {
    pub game_id: Uuid,
    pub user_id: String,
    pub status: GameStatus,
    pub bet_amount: Decimal,
    pub payout: Decimal,
    pub multiplier: Decimal,
    pub grid_size: u8,
    pub mine_count: u8,
    pub revealed_mask: u128,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub layout_commitment: String,
    pub mine_layout: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl BetHistoryRecord {
    /// Snapshot a terminal game. Callers only invoke this after the terminal
    /// transition, when the layout has been disclosed.
    pub fn from_game(game: &GameInstance, payout: Decimal) -> Self {
        Self {
            game_id: game.game_id,
            user_id: game.user_id.clone(),
            status: game.status,
            bet_amount: game.bet_amount,
            payout,
            multiplier: game.current_multiplier,
            grid_size: game.grid_size,
            mine_count: game.mine_count,
            revealed_mask: game.revealed_mask,
            server_seed_hash: game.server_seed_hash.clone(),
            client_seed: game.client_seed.clone(),
            nonce: game.nonce,
            layout_commitment: game.layout_commitment.clone(),
            mine_layout: game.mine_layout.clone().unwrap_or_default(),
            created_at: game.created_at,
            completed_at: game.completed_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Best-effort writer for finalized rounds.
pub struct BetHistoryRecorder {
    store: Arc<dyn EngineStore>,
    max_attempts: u32,
    backoff: Duration,
}

impl BetHistoryRecorder {
    pub fn new(store: Arc<dyn EngineStore>, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            store,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Write the record once inline; if that fails, hand it to a background
    /// retry task and return. Settlement has already committed by the time
    /// this runs, so errors are logged, never propagated.
    pub async fn record(&self, record: BetHistoryRecord) {
        match self.store.put_history(record.clone()).await {
            Ok(()) => {}
            Err(e) => {
                tracing::warn!(
                    game_id = %record.game_id,
                    error = %e,
                    "history write failed, retrying in background"
                );
                self.retry_detached(record);
            }
        }
    }

    fn retry_detached(&self, record: BetHistoryRecord) {
        let store = self.store.clone();
        let max_attempts = self.max_attempts;
        let backoff = self.backoff;

        tokio::spawn(async move {
            for attempt in 1..=max_attempts {
                tokio::time::sleep(backoff * attempt).await;
                match store.put_history(record.clone()).await {
                    Ok(()) => {
                        tracing::info!(
                            game_id = %record.game_id,
                            attempt,
                            "history record persisted on retry"
                        );
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(
                            game_id = %record.game_id,
                            attempt,
                            error = %e,
                            "history retry failed"
                        );
                    }
                }
            }
            tracing::error!(
                game_id = %record.game_id,
                "history record dropped after {} attempts",
                max_attempts
            );
        });
    }
}
