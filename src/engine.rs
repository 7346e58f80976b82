//! Settlement engine: the one place game money and game state move together.
//!
//! Every mutating action follows the same shape: acquire the per-entity lock,
//! validate the transition, derive randomness if needed, move funds through
//! the ledger, persist the new state, release the lock, and only then
//! record history and publish the settlement event.
//!
//! Atomicity across the ledger and the store works two ways:
//! - bet debits at creation get a compensating refund if the game row fails
//!   to persist (the game id is fresh per attempt, so a retry starts clean);
//! - settlement persists the terminal state first and credits second, so a
//!   failed write leaves the round fully live with no money moved, and a
//!   failed credit leaves a terminal round whose payout is re-driven on the
//!   next action against it. The stable `{game_id}:settle` key makes the
//!   re-driven credit a no-op if it already landed: one payout per game,
//!   ever, and the ledger never carries a credit for a state that was not
//!   committed.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::{FairgridConfig, GameConfig};
use crate::errors::{EngineError, EngineResult};
use crate::events::{BetSettledEvent, EventSink, TOPIC_BET_SETTLED};
use crate::game::{validate_bet_amount, validate_grid, GameInstance, GameStatus};
use crate::history::{BetHistoryRecord, BetHistoryRecorder};
use crate::ledger::{BalanceLedger, LedgerReason};
use crate::locks::ConcurrencyGuard;
use crate::outcome::{derive_mine_layout, layout_commitment};
use crate::seeds::{RotationOutcome, SeedPairView, SeedVault};
use crate::store::EngineStore;

pub struct SettlementEngine {
    store: Arc<dyn EngineStore>,
    ledger: Arc<dyn BalanceLedger>,
    vault: SeedVault,
    guard: ConcurrencyGuard,
    recorder: BetHistoryRecorder,
    events: Arc<dyn EventSink>,
    game_config: GameConfig,
}

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn EngineStore>,
        ledger: Arc<dyn BalanceLedger>,
        events: Arc<dyn EventSink>,
        config: &FairgridConfig,
    ) -> Self {
        let vault = SeedVault::new(store.clone());
        let guard = ConcurrencyGuard::new(Duration::from_millis(config.engine.lock_timeout_ms));
        let recorder = BetHistoryRecorder::new(
            store.clone(),
            config.engine.history_retry_attempts,
            Duration::from_millis(config.engine.history_retry_backoff_ms),
        );
        Self {
            store,
            ledger,
            vault,
            guard,
            recorder,
            events,
            game_config: config.game.clone(),
        }
    }

    /// Place a bet: debit first, then create the game. Only the hash
    /// commitment of the mine layout is persisted; the layout itself is
    /// recomputed from the seed pair on every reveal.
    pub async fn create_game(
        &self,
        user_id: &str,
        bet_amount: Decimal,
        grid_size: u8,
        mine_count: u8,
    ) -> EngineResult<GameInstance> {
        validate_bet_amount(bet_amount, self.game_config.min_bet, self.game_config.max_bet)?;
        validate_grid(grid_size, mine_count)?;

        let _user_lock = self.guard.acquire_user(user_id).await?;

        let pair = self.vault.active_pair(user_id).await?;
        let nonce = self.vault.next_nonce(user_id).await?;
        let game_id = Uuid::new_v4();

        self.ledger
            .apply_delta(
                user_id,
                -bet_amount,
                &format!("{}:bet", game_id),
                LedgerReason::Bet,
                Some(game_id),
            )
            .await?;

        let layout = derive_mine_layout(
            &pair.server_seed,
            &pair.client_seed,
            nonce,
            grid_size,
            mine_count,
        );
        let commitment = layout_commitment(&game_id, &layout);
        let game = GameInstance::new(
            game_id,
            user_id,
            bet_amount,
            grid_size,
            mine_count,
            &pair.server_seed_hash,
            &pair.client_seed,
            nonce,
            commitment,
            self.game_config.house_edge_factor,
        );

        if let Err(e) = self.store.put_game(game.clone()).await {
            // The bet was already taken; give it back so neither side commits.
            let refund = self
                .ledger
                .apply_delta(
                    user_id,
                    bet_amount,
                    &format!("{}:bet:rollback", game_id),
                    LedgerReason::Refund,
                    Some(game_id),
                )
                .await;
            if let Err(refund_err) = refund {
                tracing::error!(
                    %game_id,
                    user_id,
                    error = %refund_err,
                    "compensating refund failed after persist failure"
                );
            }
            return Err(e);
        }

        tracing::info!(
            %game_id,
            user_id,
            bet = %bet_amount,
            grid_size,
            mine_count,
            nonce,
            "game created"
        );
        Ok(game)
    }

    /// Reveal one tile. Safe tiles raise the multiplier and keep the round
    /// ACTIVE (auto-completing when the board is cleared); a mine ends the
    /// round as BUSTED with the full layout disclosed for verification.
    pub async fn reveal_tile(&self, game_id: &Uuid, tile: u8) -> EngineResult<GameInstance> {
        let lock = self.guard.acquire_game(game_id).await?;

        let mut game = self.load_game(game_id).await?;
        self.ensure_active(&game).await?;
        game.check_tile(tile)?;

        let layout = self.layout_for(&game).await?;

        if layout.contains(&tile) {
            game.bust(layout);
            self.store.put_game(game.clone()).await?;

            drop(lock);
            self.finalize_round(&game, Decimal::ZERO).await;
            return Ok(game);
        }

        game.apply_safe_reveal(tile, self.game_config.house_edge_factor);

        if game.all_safe_revealed() {
            game.complete(layout);
            let payout = self.settle_and_persist(&game).await?;

            drop(lock);
            self.finalize_round(&game, payout).await;
            return Ok(game);
        }

        self.store.put_game(game.clone()).await?;
        Ok(game)
    }

    /// Cash out the current multiplier. Requires at least one reveal unless
    /// zero-reveal cash-out is enabled in config.
    pub async fn cash_out(&self, game_id: &Uuid) -> EngineResult<GameInstance> {
        let lock = self.guard.acquire_game(game_id).await?;

        let mut game = self.load_game(game_id).await?;
        self.ensure_active(&game).await?;

        if game.revealed_count() == 0 && !self.game_config.allow_zero_reveal_cashout {
            return Err(EngineError::InvalidState(
                "cash-out requires at least one revealed tile".to_string(),
            ));
        }

        let layout = self.layout_for(&game).await?;
        game.complete(layout);
        let payout = self.settle_and_persist(&game).await?;

        drop(lock);
        self.finalize_round(&game, payout).await;
        Ok(game)
    }

    /// Rotate the client seed for a user. Serialized with game creation via
    /// the user lock; refused while any of the user's games is live.
    pub async fn rotate_client_seed(
        &self,
        user_id: &str,
        new_client_seed: &str,
    ) -> EngineResult<RotationOutcome> {
        let _user_lock = self.guard.acquire_user(user_id).await?;
        self.vault.rotate_client_seed(user_id, new_client_seed).await
    }

    /// Read-only game view. Layout stays hidden until terminal because it is
    /// never stored on a live instance.
    pub async fn game(&self, game_id: &Uuid) -> EngineResult<GameInstance> {
        self.load_game(game_id).await
    }

    /// Public view of the user's active seed pair.
    pub async fn active_seed_view(&self, user_id: &str) -> EngineResult<SeedPairView> {
        let _user_lock = self.guard.acquire_user(user_id).await?;
        Ok(self.vault.active_pair(user_id).await?.public_view())
    }

    pub fn store(&self) -> &Arc<dyn EngineStore> {
        &self.store
    }

    async fn load_game(&self, game_id: &Uuid) -> EngineResult<GameInstance> {
        self.store
            .game(game_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("game {}", game_id)))
    }

    /// Gate mutating actions on the ACTIVE state. A COMPLETED game whose
    /// payout credit failed after the terminal write gets that credit
    /// re-driven here before the caller is turned away, so the round heals
    /// on the next action against it.
    async fn ensure_active(&self, game: &GameInstance) -> EngineResult<()> {
        match game.status {
            GameStatus::Active => Ok(()),
            GameStatus::Completed => {
                self.recover_completed_credit(game).await;
                Err(EngineError::InvalidState(format!(
                    "game {} is already {}",
                    game.game_id, game.status
                )))
            }
            GameStatus::Busted => Err(EngineError::InvalidState(format!(
                "game {} is already {}",
                game.game_id, game.status
            ))),
        }
    }

    /// Recompute the mine layout from the seed pair the game was created
    /// under. The pair cannot rotate away while the game is live.
    async fn layout_for(&self, game: &GameInstance) -> EngineResult<Vec<u8>> {
        let pair = self
            .vault
            .pair_by_hash(&game.user_id, &game.server_seed_hash)
            .await?
            .ok_or_else(|| {
                EngineError::Persistence(format!(
                    "seed pair {} missing for game {}",
                    game.server_seed_hash, game.game_id
                ))
            })?;
        Ok(derive_mine_layout(
            &pair.server_seed,
            &game.client_seed,
            game.nonce,
            game.grid_size,
            game.mine_count,
        ))
    }

    /// Persist the terminal state, then credit the payout. A failed write
    /// leaves the round live with no money moved; a failed credit leaves a
    /// terminal round whose payout `ensure_active` re-drives later. The
    /// payout is a pure function of the persisted multiplier, so the credit
    /// and the history record can never disagree on the amount.
    async fn settle_and_persist(&self, game: &GameInstance) -> EngineResult<Decimal> {
        self.store.put_game(game.clone()).await?;
        self.apply_settle_credit(game).await
    }

    /// Idempotent payout credit for a persisted terminal game. The key is
    /// stable per game, so replays return the recorded balance without
    /// moving money again.
    async fn apply_settle_credit(&self, game: &GameInstance) -> EngineResult<Decimal> {
        let payout = game.payout();
        if payout > Decimal::ZERO {
            self.ledger
                .apply_delta(
                    &game.user_id,
                    payout,
                    &format!("{}:settle", game.game_id),
                    LedgerReason::Payout,
                    Some(game.game_id),
                )
                .await?;
        }
        Ok(payout)
    }

    /// Re-drive the payout of a COMPLETED game. Covers the window where the
    /// terminal write landed but the credit errored: the replayed key is a
    /// no-op when the credit already applied, and the finalize tail only
    /// runs if no history record exists yet.
    async fn recover_completed_credit(&self, game: &GameInstance) {
        match self.apply_settle_credit(game).await {
            Ok(payout) => {
                let recorded = matches!(self.store.history(&game.game_id).await, Ok(Some(_)));
                if !recorded {
                    self.finalize_round(game, payout).await;
                }
            }
            Err(e) => {
                tracing::warn!(
                    game_id = %game.game_id,
                    error = %e,
                    "settlement credit recovery failed, will retry on next action"
                );
            }
        }
    }

    /// Best-effort tail of settlement: history write and event broadcast.
    /// Runs outside the game lock; neither can fail the settled round.
    async fn finalize_round(&self, game: &GameInstance, payout: Decimal) {
        self.recorder
            .record(BetHistoryRecord::from_game(game, payout))
            .await;

        let event = BetSettledEvent {
            game_id: game.game_id,
            user_id: game.user_id.clone(),
            status: game.status,
            bet_amount: game.bet_amount,
            payout,
            multiplier: game.current_multiplier,
            completed_at: game.completed_at.unwrap_or_else(chrono::Utc::now),
        };
        match serde_json::to_value(&event) {
            Ok(payload) => self.events.publish(TOPIC_BET_SETTLED, payload),
            Err(e) => tracing::warn!(game_id = %game.game_id, error = %e, "event serialization failed"),
        }

        tracing::info!(
            game_id = %game.game_id,
            user_id = %game.user_id,
            status = %game.status,
            payout = %payout,
            "round settled"
        );
    }
}
