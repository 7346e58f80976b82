//! Persistence boundary.
//!
//! The engine only ever talks to `EngineStore`; a durable database behind it
//! is an external collaborator's concern. `MemoryStore` is the in-process
//! implementation used by the binary and the test suite. Store failures
//! surface as `Persistence` errors, which callers treat as retryable.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use uuid::Uuid;

use crate::errors::{EngineError, EngineResult};
use crate::game::GameInstance;
use crate::history::BetHistoryRecord;
use crate::seeds::SeedPair;

#[async_trait]
pub trait EngineStore: Send + Sync {
    async fn active_seed_pair(&self, user_id: &str) -> EngineResult<Option<SeedPair>>;
    async fn put_seed_pair(&self, pair: SeedPair) -> EngineResult<()>;
    /// Move a pair into the permanent retired set.
    async fn retire_seed_pair(&self, pair: SeedPair) -> EngineResult<()>;
    async fn retired_seed_pairs(&self, user_id: &str) -> EngineResult<Vec<SeedPair>>;

    async fn game(&self, game_id: &Uuid) -> EngineResult<Option<GameInstance>>;
    /// Upsert a game. Terminal games are immutable: overwriting one with a
    /// different status is rejected.
    async fn put_game(&self, game: GameInstance) -> EngineResult<()>;
    async fn active_game_count(&self, user_id: &str) -> EngineResult<usize>;

    /// Append-only: the first record for a game wins, replays are no-ops.
    async fn put_history(&self, record: BetHistoryRecord) -> EngineResult<()>;
    async fn history(&self, game_id: &Uuid) -> EngineResult<Option<BetHistoryRecord>>;
}

#[derive(Default)]
pub struct MemoryStore {
    seeds: DashMap<String, SeedPair>,
    retired_seeds: DashMap<String, Vec<SeedPair>>,
    games: DashMap<Uuid, GameInstance>,
    active_games: DashMap<String, HashSet<Uuid>>,
    history: DashMap<Uuid, BetHistoryRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EngineStore for MemoryStore {
    async fn active_seed_pair(&self, user_id: &str) -> EngineResult<Option<SeedPair>> {
        Ok(self.seeds.get(user_id).map(|p| p.clone()))
    }

    async fn put_seed_pair(&self, pair: SeedPair) -> EngineResult<()> {
        self.seeds.insert(pair.user_id.clone(), pair);
        Ok(())
    }

    async fn retire_seed_pair(&self, pair: SeedPair) -> EngineResult<()> {
        self.retired_seeds
            .entry(pair.user_id.clone())
            .or_default()
            .push(pair);
        Ok(())
    }

    async fn retired_seed_pairs(&self, user_id: &str) -> EngineResult<Vec<SeedPair>> {
        Ok(self
            .retired_seeds
            .get(user_id)
            .map(|v| v.clone())
            .unwrap_or_default())
    }

    async fn game(&self, game_id: &Uuid) -> EngineResult<Option<GameInstance>> {
        Ok(self.games.get(game_id).map(|g| g.clone()))
    }

    async fn put_game(&self, game: GameInstance) -> EngineResult<()> {
        if let Some(existing) = self.games.get(&game.game_id) {
            if existing.status.is_terminal() && existing.status != game.status {
                return Err(EngineError::Persistence(format!(
                    "game {} is terminal ({}) and immutable",
                    game.game_id, existing.status
                )));
            }
        }

        let mut index = self.active_games.entry(game.user_id.clone()).or_default();
        if game.status.is_terminal() {
            index.remove(&game.game_id);
        } else {
            index.insert(game.game_id);
        }
        drop(index);

        self.games.insert(game.game_id, game);
        Ok(())
    }

    async fn active_game_count(&self, user_id: &str) -> EngineResult<usize> {
        Ok(self
            .active_games
            .get(user_id)
            .map(|set| set.len())
            .unwrap_or(0))
    }

    async fn put_history(&self, record: BetHistoryRecord) -> EngineResult<()> {
        self.history.entry(record.game_id).or_insert(record);
        Ok(())
    }

    async fn history(&self, game_id: &Uuid) -> EngineResult<Option<BetHistoryRecord>> {
        Ok(self.history.get(game_id).map(|r| r.clone()))
    }
}
