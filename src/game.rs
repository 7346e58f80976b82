//! Grid-wagering game state machine.
//!
//! A round is created in `Active` (the transient CREATED state collapses at
//! creation), accumulates revealed tiles, and ends in exactly one terminal
//! state: `Completed` (cash-out or full board clear) or `Busted` (mine hit).
//! Status never regresses and the revealed mask only ever gains bits; all
//! mutation happens through the settlement engine under the per-game lock.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{EngineError, EngineResult};

/// Grid sizes the game accepts.
pub const ALLOWED_GRID_SIZES: [u8; 5] = [16, 25, 36, 64, 100];

/// Upper bound on mines regardless of grid size.
pub const MAX_MINE_COUNT: u8 = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameStatus {
    Active,
    Completed,
    Busted,
}

impl GameStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, GameStatus::Completed | GameStatus::Busted)
    }
}

impl std::fmt::Display for GameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameStatus::Active => write!(f, "ACTIVE"),
            GameStatus::Completed => write!(f, "COMPLETED"),
            GameStatus::Busted => write!(f, "BUSTED"),
        }
    }
}

/// One round of the grid game. The mine layout itself is never stored while
/// the round is live; only its hash commitment is. The plaintext layout is
/// filled in on the terminal transition, when disclosure becomes safe.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameInstance {
    pub game_id: Uuid,
    pub user_id: String,
    pub status: GameStatus,
    pub bet_amount: Decimal,
    pub grid_size: u8,
    pub mine_count: u8,
    /// Bitset over tile indices; bit i set means tile i has been revealed.
    pub revealed_mask: u128,
    pub server_seed_hash: String,
    pub client_seed: String,
    pub nonce: u64,
    pub current_multiplier: Decimal,
    pub layout_commitment: String,
    /// Populated only once the round is terminal.
    pub mine_layout: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl GameInstance {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        game_id: Uuid,
        user_id: &str,
        bet_amount: Decimal,
        grid_size: u8,
        mine_count: u8,
        server_seed_hash: &str,
        client_seed: &str,
        nonce: u64,
        layout_commitment: String,
        house_edge_factor: Decimal,
    ) -> Self {
        Self {
            game_id,
            user_id: user_id.to_string(),
            status: GameStatus::Active,
            bet_amount,
            grid_size,
            mine_count,
            revealed_mask: 0,
            server_seed_hash: server_seed_hash.to_string(),
            client_seed: client_seed.to_string(),
            nonce,
            current_multiplier: payout_multiplier(grid_size, mine_count, 0, house_edge_factor),
            layout_commitment,
            mine_layout: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn revealed_count(&self) -> u32 {
        self.revealed_mask.count_ones()
    }

    pub fn is_revealed(&self, tile: u8) -> bool {
        self.revealed_mask & (1u128 << tile) != 0
    }

    pub fn safe_tile_count(&self) -> u32 {
        (self.grid_size - self.mine_count) as u32
    }

    pub fn all_safe_revealed(&self) -> bool {
        self.revealed_count() == self.safe_tile_count()
    }

    /// Reject out-of-range and already-revealed tiles before any transition.
    pub fn check_tile(&self, tile: u8) -> EngineResult<()> {
        if tile >= self.grid_size {
            return Err(EngineError::InvalidTile {
                tile,
                reason: format!("index out of range for grid of {}", self.grid_size),
            });
        }
        if self.is_revealed(tile) {
            return Err(EngineError::InvalidTile {
                tile,
                reason: "tile already revealed".to_string(),
            });
        }
        Ok(())
    }

    /// Record a safe reveal: set the mask bit and recompute the multiplier.
    /// The multiplier is strictly increasing in the revealed count.
    pub fn apply_safe_reveal(&mut self, tile: u8, house_edge_factor: Decimal) {
        self.revealed_mask |= 1u128 << tile;
        self.current_multiplier = payout_multiplier(
            self.grid_size,
            self.mine_count,
            self.revealed_count(),
            house_edge_factor,
        );
    }

    /// Terminal transition: mine hit. Payout is zero (the bet was debited at
    /// creation) and the full layout becomes public for verification.
    pub fn bust(&mut self, layout: Vec<u8>) {
        self.status = GameStatus::Busted;
        self.current_multiplier = Decimal::ZERO;
        self.mine_layout = Some(layout);
        self.completed_at = Some(Utc::now());
    }

    /// Terminal transition: cash-out or full board clear.
    pub fn complete(&mut self, layout: Vec<u8>) {
        self.status = GameStatus::Completed;
        self.mine_layout = Some(layout);
        self.completed_at = Some(Utc::now());
    }

    /// Payout at the current multiplier, rounded down to cents so rounding
    /// never favors the player.
    pub fn payout(&self) -> Decimal {
        (self.bet_amount * self.current_multiplier)
            .round_dp_with_strategy(2, RoundingStrategy::ToZero)
    }
}

/// Payout multiplier after `revealed` safe reveals:
/// `house_edge_factor * C(grid, mines) / C(grid - revealed, mines)`.
///
/// Both binomials are exact u128 integers, so the ratio is monotonically
/// non-decreasing in `revealed` and equals `house_edge_factor` at zero
/// reveals.
pub fn payout_multiplier(
    grid_size: u8,
    mine_count: u8,
    revealed: u32,
    house_edge_factor: Decimal,
) -> Decimal {
    let total = binomial(grid_size as u64, mine_count as u64);
    let remaining = binomial(grid_size as u64 - revealed as u64, mine_count as u64);
    if remaining == 0 {
        return Decimal::ZERO;
    }
    let total = Decimal::from_i128_with_scale(total as i128, 0);
    let remaining = Decimal::from_i128_with_scale(remaining as i128, 0);
    house_edge_factor * total / remaining
}

/// Exact binomial coefficient. Inputs are bounded by the grid (n <= 100,
/// k <= 24), so the result fits comfortably in u128.
fn binomial(n: u64, k: u64) -> u128 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut result: u128 = 1;
    for i in 1..=k {
        // Exact at every step: result * (n - k + i) is divisible by i.
        result = result * (n - k + i) as u128 / i as u128;
    }
    result
}

/// Bet amounts must be positive, within configured bounds, and carry at most
/// two decimal places.
pub fn validate_bet_amount(bet: Decimal, min_bet: Decimal, max_bet: Decimal) -> EngineResult<()> {
    if bet <= Decimal::ZERO {
        return Err(EngineError::Validation(format!(
            "bet amount {} must be positive",
            bet
        )));
    }
    if bet != bet.round_dp(2) {
        return Err(EngineError::Validation(format!(
            "bet amount {} must have at most two decimal places",
            bet
        )));
    }
    if bet < min_bet || bet > max_bet {
        return Err(EngineError::Validation(format!(
            "bet amount {} outside allowed range [{}, {}]",
            bet, min_bet, max_bet
        )));
    }
    Ok(())
}

/// Grid must be one of the supported sizes; mines bounded by
/// `min(24, grid_size - 1)` and at least 1.
pub fn validate_grid(grid_size: u8, mine_count: u8) -> EngineResult<()> {
    if !ALLOWED_GRID_SIZES.contains(&grid_size) {
        return Err(EngineError::Validation(format!(
            "grid size {} not in {:?}",
            grid_size, ALLOWED_GRID_SIZES
        )));
    }
    let max_mines = MAX_MINE_COUNT.min(grid_size - 1);
    if mine_count == 0 || mine_count > max_mines {
        return Err(EngineError::Validation(format!(
            "mine count {} outside allowed range [1, {}] for grid of {}",
            mine_count, max_mines, grid_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn house_edge() -> Decimal {
        "0.99".parse().unwrap()
    }

    fn sample_game(grid_size: u8, mine_count: u8) -> GameInstance {
        GameInstance::new(
            Uuid::new_v4(),
            "alice",
            "10.00".parse().unwrap(),
            grid_size,
            mine_count,
            "deadbeef",
            "client-seed",
            0,
            "commitment".to_string(),
            house_edge(),
        )
    }

    #[test]
    fn binomial_known_values() {
        assert_eq!(binomial(25, 3), 2300);
        assert_eq!(binomial(20, 3), 1140);
        assert_eq!(binomial(16, 15), 16);
        assert_eq!(binomial(100, 24), 79_776_075_565_900_368_755_100);
        assert_eq!(binomial(5, 6), 0);
    }

    #[test]
    fn multiplier_is_house_edge_at_zero_reveals() {
        for &grid in &ALLOWED_GRID_SIZES {
            let max_mines = MAX_MINE_COUNT.min(grid - 1);
            for mines in 1..=max_mines {
                assert_eq!(payout_multiplier(grid, mines, 0, house_edge()), house_edge());
            }
        }
    }

    #[test]
    fn multiplier_monotonically_increases() {
        for &grid in &ALLOWED_GRID_SIZES {
            let max_mines = MAX_MINE_COUNT.min(grid - 1);
            for mines in 1..=max_mines {
                let mut previous = Decimal::ZERO;
                for revealed in 0..=(grid - mines) as u32 {
                    let m = payout_multiplier(grid, mines, revealed, house_edge());
                    assert!(
                        m > previous,
                        "multiplier regressed at grid={} mines={} revealed={}",
                        grid,
                        mines,
                        revealed
                    );
                    previous = m;
                }
            }
        }
    }

    #[test]
    fn multiplier_matches_combinatorial_formula() {
        // C(25,3) / C(20,3) = 2300 / 1140
        let expected = house_edge() * Decimal::from(2300) / Decimal::from(1140);
        assert_eq!(payout_multiplier(25, 3, 5, house_edge()), expected);
    }

    #[test]
    fn reveal_sets_bits_and_never_clears() {
        let mut game = sample_game(25, 3);
        game.apply_safe_reveal(0, house_edge());
        game.apply_safe_reveal(24, house_edge());
        assert!(game.is_revealed(0));
        assert!(game.is_revealed(24));
        assert_eq!(game.revealed_count(), 2);

        let mask_before = game.revealed_mask;
        game.apply_safe_reveal(7, house_edge());
        assert_eq!(game.revealed_mask & mask_before, mask_before);
    }

    #[test]
    fn check_tile_rejects_out_of_range_and_repeats() {
        let mut game = sample_game(25, 3);
        assert!(matches!(
            game.check_tile(25),
            Err(EngineError::InvalidTile { tile: 25, .. })
        ));
        game.apply_safe_reveal(3, house_edge());
        assert!(matches!(
            game.check_tile(3),
            Err(EngineError::InvalidTile { tile: 3, .. })
        ));
        assert!(game.check_tile(4).is_ok());
    }

    #[test]
    fn bust_zeroes_multiplier_and_reveals_layout() {
        let mut game = sample_game(25, 3);
        game.apply_safe_reveal(0, house_edge());
        game.bust(vec![4, 9, 13]);
        assert_eq!(game.status, GameStatus::Busted);
        assert!(game.status.is_terminal());
        assert_eq!(game.payout(), Decimal::ZERO);
        assert_eq!(game.mine_layout.as_deref(), Some(&[4u8, 9, 13][..]));
        assert!(game.completed_at.is_some());
    }

    #[test]
    fn payout_rounds_down_to_cents() {
        let mut game = sample_game(25, 3);
        for tile in 0..5 {
            game.apply_safe_reveal(tile, house_edge());
        }
        // 10.00 * 0.99 * 2300/1140 = 19.9736...
        assert_eq!(game.payout(), "19.97".parse::<Decimal>().unwrap());
    }

    #[test]
    fn all_safe_revealed_detection() {
        let mut game = sample_game(16, 15);
        assert_eq!(game.safe_tile_count(), 1);
        game.apply_safe_reveal(11, house_edge());
        assert!(game.all_safe_revealed());
    }

    #[test]
    fn bet_validation() {
        let min = "0.10".parse().unwrap();
        let max = "10000.00".parse().unwrap();
        assert!(validate_bet_amount("10.00".parse().unwrap(), min, max).is_ok());
        assert!(validate_bet_amount("0.05".parse().unwrap(), min, max).is_err());
        assert!(validate_bet_amount("10.001".parse().unwrap(), min, max).is_err());
        assert!(validate_bet_amount(Decimal::ZERO, min, max).is_err());
        assert!(validate_bet_amount("-5.00".parse().unwrap(), min, max).is_err());
        assert!(validate_bet_amount("10000.01".parse().unwrap(), min, max).is_err());
    }

    #[test]
    fn grid_validation() {
        assert!(validate_grid(25, 3).is_ok());
        assert!(validate_grid(16, 15).is_ok());
        assert!(validate_grid(100, 24).is_ok());
        assert!(validate_grid(30, 3).is_err(), "unsupported grid size");
        assert!(validate_grid(25, 0).is_err(), "at least one mine");
        assert!(validate_grid(25, 25).is_err(), "mines must leave a safe tile");
        assert!(validate_grid(100, 25).is_err(), "hard cap of 24 mines");
    }
}
