//! Seed vault: per-user seed pairs and nonce accounting.
//!
//! Each user owns one active pair (secret server seed, published hash,
//! user-supplied client seed, monotonic nonce). Rotation retires the pair,
//! reveals its server seed for retroactive verification, and starts a fresh
//! pair at nonce zero. Retired pairs are retained forever; nothing here is
//! ever deleted.
//!
//! All methods assume the caller holds the per-user lock from
//! `ConcurrencyGuard`, the same domain that serializes game creation; that
//! is what makes `next_nonce` race-free under concurrent rounds.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::{EngineError, EngineResult};
use crate::outcome::hash_server_seed;
use crate::store::EngineStore;

pub const CLIENT_SEED_MIN_LEN: usize = 6;
pub const CLIENT_SEED_MAX_LEN: usize = 64;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedPair {
    pub user_id: String,
    /// Secret while the pair is active; auditable once retired.
    pub server_seed: String,
    /// SHA-256 of the server seed, published before any round uses the pair.
    pub server_seed_hash: String,
    pub client_seed: String,
    /// Strictly increasing per round; never reused within one pair.
    pub nonce: u64,
    pub created_at: DateTime<Utc>,
    pub retired_at: Option<DateTime<Utc>>,
}

impl SeedPair {
    fn generate(user_id: &str, client_seed: String) -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        let server_seed = hex::encode(bytes);
        let server_seed_hash = hash_server_seed(&server_seed);
        Self {
            user_id: user_id.to_string(),
            server_seed,
            server_seed_hash,
            client_seed,
            nonce: 0,
            created_at: Utc::now(),
            retired_at: None,
        }
    }

    /// Everything a client may see while the pair is active.
    pub fn public_view(&self) -> SeedPairView {
        SeedPairView {
            user_id: self.user_id.clone(),
            server_seed_hash: self.server_seed_hash.clone(),
            client_seed: self.client_seed.clone(),
            nonce: self.nonce,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedPairView {
    pub user_id: String,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
}

/// Result of a client seed rotation: the retiring server seed becomes
/// permanently auditable against every round played under it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RotationOutcome {
    pub revealed_server_seed: String,
    pub revealed_server_seed_hash: String,
    pub new_pair: SeedPairView,
}

/// Client seeds: 6–64 chars from `[A-Za-z0-9_-]`.
pub fn validate_client_seed(client_seed: &str) -> EngineResult<()> {
    let len = client_seed.chars().count();
    if !(CLIENT_SEED_MIN_LEN..=CLIENT_SEED_MAX_LEN).contains(&len) {
        return Err(EngineError::Validation(format!(
            "client seed must be {}-{} characters, got {}",
            CLIENT_SEED_MIN_LEN, CLIENT_SEED_MAX_LEN, len
        )));
    }
    if let Some(bad) = client_seed
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(EngineError::Validation(format!(
            "client seed contains disallowed character {:?}",
            bad
        )));
    }
    Ok(())
}

pub struct SeedVault {
    store: Arc<dyn EngineStore>,
}

impl SeedVault {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        Self { store }
    }

    /// Fetch the active pair, creating one with a fresh server seed and a
    /// random default client seed on first play.
    pub async fn active_pair(&self, user_id: &str) -> EngineResult<SeedPair> {
        if let Some(pair) = self.store.active_seed_pair(user_id).await? {
            return Ok(pair);
        }
        let mut default_client = [0u8; 8];
        rand::rngs::OsRng.fill_bytes(&mut default_client);
        let pair = SeedPair::generate(user_id, hex::encode(default_client));
        self.store.put_seed_pair(pair.clone()).await?;
        tracing::info!(user_id, hash = %pair.server_seed_hash, "created seed pair");
        Ok(pair)
    }

    /// Increment and return the nonce for the active pair. Serialized by the
    /// caller-held user lock.
    pub async fn next_nonce(&self, user_id: &str) -> EngineResult<u64> {
        let mut pair = self.active_pair(user_id).await?;
        pair.nonce += 1;
        let nonce = pair.nonce;
        self.store.put_seed_pair(pair).await?;
        Ok(nonce)
    }

    /// Rotate the client seed. Refused while the user has an active game,
    /// since the layout of live rounds is derived from the current pair.
    pub async fn rotate_client_seed(
        &self,
        user_id: &str,
        new_client_seed: &str,
    ) -> EngineResult<RotationOutcome> {
        validate_client_seed(new_client_seed)?;

        if self.store.active_game_count(user_id).await? > 0 {
            return Err(EngineError::InvalidState(
                "cannot rotate client seed while a game is active".to_string(),
            ));
        }

        let mut retiring = self.active_pair(user_id).await?;
        retiring.retired_at = Some(Utc::now());

        let fresh = SeedPair::generate(user_id, new_client_seed.to_string());
        self.store.retire_seed_pair(retiring.clone()).await?;
        self.store.put_seed_pair(fresh.clone()).await?;

        tracing::info!(
            user_id,
            retired_hash = %retiring.server_seed_hash,
            new_hash = %fresh.server_seed_hash,
            "rotated seed pair"
        );

        Ok(RotationOutcome {
            revealed_server_seed: retiring.server_seed,
            revealed_server_seed_hash: retiring.server_seed_hash,
            new_pair: fresh.public_view(),
        })
    }

    /// Look up the server seed for a given published hash: the active pair
    /// first, then the retired ones.
    pub async fn pair_by_hash(
        &self,
        user_id: &str,
        server_seed_hash: &str,
    ) -> EngineResult<Option<SeedPair>> {
        if let Some(active) = self.store.active_seed_pair(user_id).await? {
            if active.server_seed_hash == server_seed_hash {
                return Ok(Some(active));
            }
        }
        Ok(self
            .store
            .retired_seed_pairs(user_id)
            .await?
            .into_iter()
            .find(|p| p.server_seed_hash == server_seed_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn vault() -> SeedVault {
        SeedVault::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn client_seed_bounds() {
        assert!(validate_client_seed("abc123").is_ok());
        assert!(validate_client_seed(&"x".repeat(64)).is_ok());
        assert!(validate_client_seed("with-dash_and_under").is_ok());
        assert!(validate_client_seed("short").is_err());
        assert!(validate_client_seed(&"x".repeat(65)).is_err());
        assert!(validate_client_seed("spaces here!").is_err());
        assert!(validate_client_seed("héllo-seed").is_err());
    }

    #[tokio::test]
    async fn first_play_creates_pair_with_valid_hash() {
        let vault = vault();
        let pair = vault.active_pair("alice").await.unwrap();
        assert_eq!(pair.server_seed.len(), 64, "32 bytes hex");
        assert_eq!(pair.server_seed_hash, hash_server_seed(&pair.server_seed));
        assert_eq!(pair.nonce, 0);
        assert!(pair.retired_at.is_none());

        // Second call returns the same pair.
        let again = vault.active_pair("alice").await.unwrap();
        assert_eq!(again.server_seed_hash, pair.server_seed_hash);
    }

    #[tokio::test]
    async fn nonce_strictly_increases() {
        let vault = vault();
        assert_eq!(vault.next_nonce("bob").await.unwrap(), 1);
        assert_eq!(vault.next_nonce("bob").await.unwrap(), 2);
        assert_eq!(vault.next_nonce("bob").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn rotation_reveals_and_resets() {
        let vault = vault();
        let before = vault.active_pair("carol").await.unwrap();
        vault.next_nonce("carol").await.unwrap();

        let outcome = vault
            .rotate_client_seed("carol", "my-new-seed")
            .await
            .unwrap();
        assert_eq!(outcome.revealed_server_seed, before.server_seed);
        assert_eq!(outcome.revealed_server_seed_hash, before.server_seed_hash);
        assert_eq!(outcome.new_pair.client_seed, "my-new-seed");
        assert_eq!(outcome.new_pair.nonce, 0);
        assert_ne!(outcome.new_pair.server_seed_hash, before.server_seed_hash);

        // Retired pair is still reachable for audit.
        let retired = vault
            .pair_by_hash("carol", &before.server_seed_hash)
            .await
            .unwrap()
            .expect("retired pair retained");
        assert!(retired.retired_at.is_some());
    }

    #[tokio::test]
    async fn rotation_rejects_bad_seed() {
        let vault = vault();
        let err = vault.rotate_client_seed("dave", "nope").await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
