//! Seeded simulation environment.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use huddle_core::{Environment, env::Sleep};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::time::Instant;

/// Wall-clock reading at simulation start: 2026-01-01T00:00:00Z.
pub const EPOCH_MILLIS: i64 = 1_767_225_600_000;

/// Deterministic [`Environment`].
///
/// Randomness comes from a seeded ChaCha stream shared by all clones. Time is
/// [`EPOCH_MILLIS`] plus tokio's elapsed time, so it advances with the paused
/// test clock.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    start: Instant,
}

impl SimEnv {
    /// Environment seeded with `seed`.
    ///
    /// Must be created inside a tokio runtime for time to follow a paused
    /// clock.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))), start: Instant::now() }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("start", &self.start).finish_non_exhaustive()
    }
}

impl Environment for SimEnv {
    fn unix_millis(&self) -> i64 {
        let elapsed = i64::try_from(self.start.elapsed().as_millis()).unwrap_or(i64::MAX);
        EPOCH_MILLIS.saturating_add(elapsed)
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn same_seed_same_stream() {
        let a = SimEnv::with_seed(7);
        let b = SimEnv::with_seed(7);
        assert_eq!(a.random_u64(), b.random_u64());
        assert_ne!(a.random_u64(), SimEnv::with_seed(8).random_u64());
    }

    #[tokio::test(start_paused = true)]
    async fn time_follows_paused_clock() {
        let env = SimEnv::with_seed(1);
        assert_eq!(env.unix_millis(), EPOCH_MILLIS);

        env.sleep(Duration::from_millis(1500)).await;
        assert_eq!(env.unix_millis(), EPOCH_MILLIS + 1500);
    }
}
