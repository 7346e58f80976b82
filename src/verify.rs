//! Retroactive fairness verification.
//!
//! Once a seed pair retires, its server seed is public and anyone can
//! recompute every layout played under it. The auditor assembles a bundle
//! of everything a verifier needs for one round and, when the server seed
//! is already revealed, runs the recomputation itself and reports each
//! check individually.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::{EngineError, EngineResult};
use crate::game::GameStatus;
use crate::history::BetHistoryRecord;
use crate::outcome::{derive_mine_layout, hash_server_seed, layout_commitment};
use crate::seeds::SeedVault;
use crate::store::EngineStore;

/// One recomputation check with its outcome.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationReport {
    pub verified: bool,
    pub checks: Vec<VerificationCheck>,
}

/// Everything a third party needs to audit one settled round. The server
/// seed is present only after its pair has retired; until then the bundle
/// carries the hash commitment and `report` is `None`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditBundle {
    pub game_id: Uuid,
    pub user_id: String,
    pub status: GameStatus,
    pub bet_amount: Decimal,
    pub payout: Decimal,
    pub multiplier: Decimal,
    pub grid_size: u8,
    pub mine_count: u8,
    pub server_seed_hash: String,
    pub server_seed: Option<String>,
    pub client_seed: String,
    pub nonce: u64,
    pub layout_commitment: String,
    pub mine_layout: Vec<u8>,
    pub report: Option<VerificationReport>,
}

/// Recompute a settled round from first principles against its history
/// record. Pure: callers supply the revealed server seed.
pub fn verify_round(record: &BetHistoryRecord, server_seed: &str) -> VerificationReport {
    let mut checks = Vec::new();

    let recomputed_hash = hash_server_seed(server_seed);
    checks.push(VerificationCheck {
        name: "server_seed_hash".to_string(),
        passed: recomputed_hash == record.server_seed_hash,
        detail: format!(
            "published {}, recomputed {}",
            record.server_seed_hash, recomputed_hash
        ),
    });

    let recomputed_layout = derive_mine_layout(
        server_seed,
        &record.client_seed,
        record.nonce,
        record.grid_size,
        record.mine_count,
    );
    checks.push(VerificationCheck {
        name: "mine_layout".to_string(),
        passed: recomputed_layout == record.mine_layout,
        detail: format!(
            "disclosed {:?}, recomputed {:?}",
            record.mine_layout, recomputed_layout
        ),
    });

    let recomputed_commitment = layout_commitment(&record.game_id, &recomputed_layout);
    checks.push(VerificationCheck {
        name: "layout_commitment".to_string(),
        passed: recomputed_commitment == record.layout_commitment,
        detail: format!(
            "published {}, recomputed {}",
            record.layout_commitment, recomputed_commitment
        ),
    });

    VerificationReport {
        verified: checks.iter().all(|c| c.passed),
        checks,
    }
}

pub struct Auditor {
    store: Arc<dyn EngineStore>,
    vault: SeedVault,
}

impl Auditor {
    pub fn new(store: Arc<dyn EngineStore>) -> Self {
        let vault = SeedVault::new(store.clone());
        Self { store, vault }
    }

    /// Assemble the audit bundle for a settled round. Runs the verification
    /// report inline when the seed pair has already retired.
    pub async fn audit_bundle(&self, game_id: &Uuid) -> EngineResult<AuditBundle> {
        let record = self
            .store
            .history(game_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("no settled round for game {}", game_id)))?;

        let pair = self
            .vault
            .pair_by_hash(&record.user_id, &record.server_seed_hash)
            .await?;

        // Reveal only once the pair is out of rotation.
        let revealed = pair.filter(|p| p.retired_at.is_some());
        let report = revealed
            .as_ref()
            .map(|p| verify_round(&record, &p.server_seed));

        Ok(AuditBundle {
            game_id: record.game_id,
            user_id: record.user_id,
            status: record.status,
            bet_amount: record.bet_amount,
            payout: record.payout,
            multiplier: record.multiplier,
            grid_size: record.grid_size,
            mine_count: record.mine_count,
            server_seed_hash: record.server_seed_hash,
            server_seed: revealed.map(|p| p.server_seed),
            client_seed: record.client_seed,
            nonce: record.nonce,
            layout_commitment: record.layout_commitment,
            mine_layout: record.mine_layout,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameInstance;
    use chrono::Utc;

    const SERVER: &str = "5f2a9c0d417e88b3aa41c6d2e9b05f7c5f2a9c0d417e88b3aa41c6d2e9b05f7c";

    fn settled_record(server_seed: &str) -> BetHistoryRecord {
        let game_id = Uuid::new_v4();
        let layout = derive_mine_layout(server_seed, "lucky-tiles", 7, 25, 3);
        let commitment = layout_commitment(&game_id, &layout);
        let mut game = GameInstance::new(
            game_id,
            "alice",
            "10.00".parse().unwrap(),
            25,
            3,
            &hash_server_seed(server_seed),
            "lucky-tiles",
            7,
            commitment,
            "0.99".parse().unwrap(),
        );
        game.complete(layout);
        let mut record = BetHistoryRecord::from_game(&game, "19.97".parse().unwrap());
        record.completed_at = Utc::now();
        record
    }

    #[test]
    fn honest_round_verifies() {
        let record = settled_record(SERVER);
        let report = verify_round(&record, SERVER);
        assert!(report.verified);
        assert_eq!(report.checks.len(), 3);
        assert!(report.checks.iter().all(|c| c.passed));
    }

    #[test]
    fn wrong_server_seed_fails_every_check() {
        let record = settled_record(SERVER);
        let report = verify_round(&record, "deadbeef");
        assert!(!report.verified);
        assert!(report.checks.iter().all(|c| !c.passed));
    }

    #[test]
    fn tampered_layout_fails_layout_checks() {
        let mut record = settled_record(SERVER);
        record.mine_layout[0] = record.mine_layout[0].wrapping_add(1) % 25;
        let report = verify_round(&record, SERVER);
        assert!(!report.verified);
        let by_name = |n: &str| {
            report
                .checks
                .iter()
                .find(|c| c.name == n)
                .map(|c| c.passed)
                .unwrap()
        };
        assert!(by_name("server_seed_hash"));
        assert!(!by_name("mine_layout"));
    }
}
