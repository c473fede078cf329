//! Seeded Fisher-Yates ordering of the presented items.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use glimmer_core::CollectionKey;

/// Seed for one viewing session: SHA-256 of the key and the session start
/// time in milliseconds, truncated to 64 bits.
pub fn session_seed(key: &CollectionKey, started_at: DateTime<Utc>) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(key.as_str().as_bytes());
    hasher.update(started_at.timestamp_millis().to_be_bytes());
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Permutation of `0..len` determined entirely by `seed`.
pub fn permutation(len: usize, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    for i in (1..len).rev() {
        let j = rng.random_range(0..=i);
        order.swap(i, j);
    }
    order
}

/// `items` reordered by [`permutation`].
pub fn shuffled<T: Clone>(items: &[T], seed: u64) -> Vec<T> {
    permutation(items.len(), seed).into_iter().map(|i| items[i].clone()).collect()
}
