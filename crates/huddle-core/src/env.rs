//! Environment abstraction.
//!
//! Wall-clock time, sleeping and randomness are the only sources of
//! nondeterminism in the client. Production code uses [`SystemEnv`]; tests
//! substitute a seeded implementation driven by tokio's paused clock.

use std::{
    future::Future,
    pin::Pin,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use rand::RngCore;

/// A sleep that can be stored and polled later.
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Time and randomness supplied to the client.
pub trait Environment: Send + Sync + 'static {
    /// Milliseconds since the Unix epoch.
    fn unix_millis(&self) -> i64;

    /// Future that completes after `duration`.
    fn sleep(&self, duration: Duration) -> Sleep;

    /// Fill `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Uniform random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }

    /// Random index below `bound`. Returns 0 for an empty range.
    fn random_index(&self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        (self.random_u64() % bound as u64) as usize
    }
}

/// System clock, tokio timers and OS randomness.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn unix_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        if let Err(err) = getrandom::fill(buffer) {
            tracing::warn!(%err, "OS randomness unavailable, using thread RNG");
            rand::thread_rng().fill_bytes(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_env_produces_distinct_random_values() {
        let env = SystemEnv;
        assert_ne!(env.random_u64(), env.random_u64());
        assert!(env.unix_millis() > 0);
    }

    #[test]
    fn random_index_stays_in_range() {
        let env = SystemEnv;
        for _ in 0..100 {
            assert!(env.random_index(30) < 30);
        }
        assert_eq!(env.random_index(0), 0);
    }
}
