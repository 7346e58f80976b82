//! Deterministic outcome derivation.
//!
//! Pure functions only: the same (server seed, client seed, nonce, cursor)
//! always yields the same value, on any platform, forever. Outcomes are
//! unpredictable while the server seed is secret and fully recomputable by a
//! third party once it is revealed.
//!
//! The keyed construction hashes the secret server seed together with the
//! public client seed, nonce and cursor; uniformity over the requested domain
//! is guaranteed by rejection sampling over 8-byte windows of the digest
//! stream, never by a biased modulo.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Domain separator baked into every layout commitment.
const COMMITMENT_CONTEXT: &[u8] = b"FAIRGRID_LAYOUT_V1";

/// Streams unsigned 64-bit words out of the keyed digest of one
/// (seed pair, nonce, cursor) coordinate. When one digest block is consumed
/// the block counter increments and a fresh block is derived, so rejection
/// sampling can draw as many words as it needs.
struct DigestStream<'a> {
    server_seed: &'a str,
    client_seed: &'a str,
    nonce: u64,
    cursor: u32,
    block: u32,
    buf: [u8; 32],
    offset: usize,
}

impl<'a> DigestStream<'a> {
    fn new(server_seed: &'a str, client_seed: &'a str, nonce: u64, cursor: u32) -> Self {
        let mut stream = Self {
            server_seed,
            client_seed,
            nonce,
            cursor,
            block: 0,
            buf: [0u8; 32],
            offset: 0,
        };
        stream.refill();
        stream
    }

    fn refill(&mut self) {
        let mut hasher = Sha256::new();
        // Secret key first, public message after.
        hasher.update(self.server_seed.as_bytes());
        hasher.update(b":");
        hasher.update(self.client_seed.as_bytes());
        hasher.update(b":");
        hasher.update(self.nonce.to_be_bytes());
        hasher.update(b":");
        hasher.update(self.cursor.to_be_bytes());
        hasher.update(b":");
        hasher.update(self.block.to_be_bytes());
        self.buf = hasher.finalize().into();
        self.offset = 0;
    }

    fn next_u64(&mut self) -> u64 {
        if self.offset + 8 > self.buf.len() {
            self.block += 1;
            self.refill();
        }
        let window: [u8; 8] = self.buf[self.offset..self.offset + 8]
            .try_into()
            .expect("window is 8 bytes");
        self.offset += 8;
        u64::from_be_bytes(window)
    }
}

/// Derive a uniform integer in `[0, domain_size)`.
///
/// `cursor` lets one seed/nonce pair produce multiple independent values
/// (one per tile draw) without burning a nonce per draw.
pub fn derive_outcome(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    cursor: u32,
    domain_size: u64,
) -> u64 {
    if domain_size == 0 {
        return 0;
    }
    let mut stream = DigestStream::new(server_seed, client_seed, nonce, cursor);

    // Accept only draws below the largest multiple of domain_size that fits
    // in a u64; everything above is resampled.
    let rem = (u64::MAX % domain_size).wrapping_add(1) % domain_size;
    if rem == 0 {
        return stream.next_u64() % domain_size;
    }
    let limit = u64::MAX - rem + 1;
    loop {
        let draw = stream.next_u64();
        if draw < limit {
            return draw % domain_size;
        }
    }
}

/// Derive the mine positions for one round as a sorted list of tile indices.
///
/// Partial Fisher–Yates over the full grid: draw `mine_count` swaps, each from
/// its own cursor, and take the head of the permutation. The layout is fully
/// determined by the seed pair and nonce, so a verifier can recompute it.
pub fn derive_mine_layout(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    grid_size: u8,
    mine_count: u8,
) -> Vec<u8> {
    let mut tiles: Vec<u8> = (0..grid_size).collect();
    for i in 0..mine_count as usize {
        let remaining = grid_size as u64 - i as u64;
        let j = i + derive_outcome(server_seed, client_seed, nonce, i as u32, remaining) as usize;
        tiles.swap(i, j);
    }
    let mut mines = tiles[..mine_count as usize].to_vec();
    mines.sort_unstable();
    mines
}

/// SHA-256 hex digest of a server seed; published before any round uses it.
pub fn hash_server_seed(server_seed: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(server_seed.as_bytes());
    hex::encode(hasher.finalize())
}

/// Commitment to a mine layout, persisted at game creation. The plaintext
/// layout is only disclosed on the terminal transition.
pub fn layout_commitment(game_id: &Uuid, layout: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(COMMITMENT_CONTEXT);
    hasher.update(game_id.as_bytes());
    hasher.update(layout);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVER: &str = "5f2a9c0d417e88b3aa41c6d2e9b05f7c5f2a9c0d417e88b3aa41c6d2e9b05f7c";
    const CLIENT: &str = "lucky-tiles";

    #[test]
    fn outcome_is_deterministic() {
        for cursor in 0..16 {
            let a = derive_outcome(SERVER, CLIENT, 7, cursor, 25);
            let b = derive_outcome(SERVER, CLIENT, 7, cursor, 25);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn outcome_stays_in_domain() {
        for nonce in 0..200 {
            for &domain in &[1u64, 2, 16, 25, 36, 64, 100] {
                let v = derive_outcome(SERVER, CLIENT, nonce, 0, domain);
                assert!(v < domain, "draw {} escaped domain {}", v, domain);
            }
        }
    }

    #[test]
    fn outcome_varies_with_each_input() {
        let base = derive_outcome(SERVER, CLIENT, 1, 0, u64::MAX);
        assert_ne!(base, derive_outcome(SERVER, CLIENT, 2, 0, u64::MAX));
        assert_ne!(base, derive_outcome(SERVER, CLIENT, 1, 1, u64::MAX));
        assert_ne!(base, derive_outcome(SERVER, "other-client", 1, 0, u64::MAX));
        assert_ne!(base, derive_outcome("other-server", CLIENT, 1, 0, u64::MAX));
    }

    #[test]
    fn outcome_zero_domain_is_zero() {
        assert_eq!(derive_outcome(SERVER, CLIENT, 0, 0, 0), 0);
    }

    #[test]
    fn layout_has_right_shape() {
        for nonce in 0..50 {
            let layout = derive_mine_layout(SERVER, CLIENT, nonce, 25, 3);
            assert_eq!(layout.len(), 3);
            assert!(layout.windows(2).all(|w| w[0] < w[1]), "sorted and unique");
            assert!(layout.iter().all(|&t| t < 25));
        }
    }

    #[test]
    fn layout_is_reproducible() {
        let a = derive_mine_layout(SERVER, CLIENT, 42, 64, 24);
        let b = derive_mine_layout(SERVER, CLIENT, 42, 64, 24);
        assert_eq!(a, b);
    }

    #[test]
    fn layout_changes_with_nonce() {
        let a = derive_mine_layout(SERVER, CLIENT, 1, 100, 24);
        let b = derive_mine_layout(SERVER, CLIENT, 2, 100, 24);
        assert_ne!(a, b);
    }

    #[test]
    fn full_mine_grid_minus_one() {
        // mine_count may go up to grid_size - 1 on the smallest grid.
        let layout = derive_mine_layout(SERVER, CLIENT, 3, 16, 15);
        assert_eq!(layout.len(), 15);
    }

    #[test]
    fn seed_hash_matches_direct_digest() {
        let mut hasher = Sha256::new();
        hasher.update(SERVER.as_bytes());
        assert_eq!(hash_server_seed(SERVER), hex::encode(hasher.finalize()));
    }

    #[test]
    fn commitment_binds_game_and_layout() {
        let game_a = Uuid::new_v4();
        let game_b = Uuid::new_v4();
        let layout = vec![1u8, 5, 9];
        assert_eq!(
            layout_commitment(&game_a, &layout),
            layout_commitment(&game_a, &layout)
        );
        assert_ne!(
            layout_commitment(&game_a, &layout),
            layout_commitment(&game_b, &layout)
        );
        assert_ne!(
            layout_commitment(&game_a, &layout),
            layout_commitment(&game_a, &[1u8, 5, 10])
        );
    }
}
