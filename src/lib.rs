//! fairgrid: a provably-fair settlement engine for grid wagering games.
//!
//! Players bet against a hidden mine layout derived deterministically from a
//! committed server seed, their own client seed and a monotonic nonce. Safe
//! reveals compound a multiplier; hitting a mine loses the bet; cashing out
//! settles at the current multiplier. Every round is retroactively
//! verifiable once its seed pair rotates.

pub mod api;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod game;
pub mod history;
pub mod ledger;
pub mod locks;
pub mod outcome;
pub mod seeds;
pub mod store;
pub mod verify;

pub use config::FairgridConfig;
pub use engine::SettlementEngine;
pub use errors::{EngineError, EngineResult};
pub use game::{GameInstance, GameStatus};
pub use ledger::{BalanceLedger, MemoryLedger};
pub use store::{EngineStore, MemoryStore};
