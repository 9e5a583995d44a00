//! Engine configuration, resolved once at startup and passed by parameter.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::entity::EntityType;
use crate::rng::DeterministicRng;

/// Exponential backoff curve for retryable outbox failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub base: Duration,
    /// Upper bound on the exponential part.
    pub max: Duration,
    /// Uniform random jitter added on top, in `[0, jitter]`.
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(2),
            max: Duration::from_secs(15 * 60),
            jitter: Duration::from_secs(1),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt after `attempt_count` failures
    /// (`attempt_count >= 1`): `min(base * 2^(attempt_count - 1), max) + jitter`.
    pub fn delay(&self, attempt_count: i32, rng: &mut dyn DeterministicRng) -> Duration {
        let exponent = u32::try_from(attempt_count.saturating_sub(1)).unwrap_or(0).min(31);
        let exponential = self
            .base
            .checked_mul(1_u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max);
        let jitter_cap = u32::try_from(self.jitter.as_millis()).unwrap_or(u32::MAX);
        let jitter = Duration::from_millis(u64::from(rng.next_u32_range(0, jitter_cap)));
        exponential.saturating_add(jitter)
    }
}

/// Which entity types have the relational store as their primary store.
///
/// Writes to the others go straight to the spreadsheet store, so enqueueing
/// them would replicate a write back onto itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityBackends {
    postgres_primary: BTreeSet<EntityType>,
}

impl Default for EntityBackends {
    fn default() -> Self {
        Self::postgres_primary(EntityType::OUTBOUND)
    }
}

impl EntityBackends {
    /// Backends where exactly `entity_types` are relational-primary.
    #[must_use]
    pub fn postgres_primary(entity_types: impl IntoIterator<Item = EntityType>) -> Self {
        Self {
            postgres_primary: entity_types.into_iter().collect(),
        }
    }

    /// Whether writes of `entity_type` originate in the relational store.
    #[must_use]
    pub fn is_postgres_primary(&self, entity_type: EntityType) -> bool {
        self.postgres_primary.contains(&entity_type)
    }
}

/// Settings for the outbox dispatcher and writers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Attempts beyond which an event is dead-lettered.
    pub max_retries: i32,
    /// Retry schedule.
    pub backoff: BackoffPolicy,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// In-flight claims older than this are considered abandoned.
    pub claim_timeout: Duration,
    /// Upper bound on one spreadsheet-store request.
    pub external_call_timeout: Duration,
    /// Upper bound on one whole writer call, which may issue several
    /// requests. Must exceed `external_call_timeout`, and stay below
    /// `claim_timeout` so the reaper never releases a claim mid-write.
    pub write_timeout: Duration,
    /// Number of concurrent dispatch workers in this process.
    pub workers: usize,
    /// Primary store per entity type.
    pub backends: EntityBackends,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 8,
            backoff: BackoffPolicy::default(),
            poll_interval: Duration::from_secs(1),
            claim_timeout: Duration::from_secs(5 * 60),
            external_call_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(60),
            workers: 1,
            backends: EntityBackends::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MinRng;

    impl DeterministicRng for MinRng {
        fn next_u32_range(&mut self, min: u32, _max: u32) -> u32 {
            min
        }
    }

    struct MaxRng;

    impl DeterministicRng for MaxRng {
        fn next_u32_range(&mut self, _min: u32, max: u32) -> u32 {
            max
        }
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(2),
            max: Duration::from_secs(60),
            jitter: Duration::ZERO,
        };

        assert_eq!(policy.delay(1, &mut MinRng), Duration::from_secs(2));
        assert_eq!(policy.delay(2, &mut MinRng), Duration::from_secs(4));
        assert_eq!(policy.delay(3, &mut MinRng), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_is_capped_before_jitter() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(2),
            max: Duration::from_secs(60),
            jitter: Duration::from_millis(500),
        };

        assert_eq!(policy.delay(10, &mut MinRng), Duration::from_secs(60));
        assert_eq!(policy.delay(40, &mut MaxRng), Duration::from_millis(60_500));
    }

    #[test]
    fn test_default_backends_cover_every_outbound_type() {
        let backends = EntityBackends::default();
        for entity_type in EntityType::OUTBOUND {
            assert!(backends.is_postgres_primary(entity_type));
        }
        assert!(!backends.is_postgres_primary(EntityType::Method));
    }
}
