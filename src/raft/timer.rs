use rand::Rng;
use std::time::Duration;

/// Draws an election timeout uniformly from `min_ms..=max_ms`.
pub fn random_election_timeout<R: Rng + ?Sized>(rng: &mut R, min_ms: u64, max_ms: u64) -> Duration {
    let timeout_ms = rng.random_range(min_ms..=max_ms);
    Duration::from_millis(timeout_ms)
}
