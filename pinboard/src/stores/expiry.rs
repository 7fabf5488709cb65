//! Per-entry expiry for the in-memory moka token store.

use std::time::{Duration, Instant};

use moka::Expiry;

/// A cached value together with the lifetime it was written with.
#[derive(Debug, Clone)]
pub(crate) struct Expiring<V> {
    pub value: V,
    pub ttl: Duration,
    pub written_at: Instant,
}

impl<V> Expiring<V> {
    pub fn new(value: V, ttl: Duration) -> Self {
        Self {
            value,
            ttl,
            written_at: Instant::now(),
        }
    }

    /// Time left before the entry expires, `None` once it has.
    pub fn remaining(&self) -> Option<Duration> {
        self.ttl.checked_sub(self.written_at.elapsed()).filter(|d| !d.is_zero())
    }
}

/// Expires each entry after the ttl it was written with; overwriting restarts the clock.
pub(crate) struct WrittenTtl;

impl<V> Expiry<String, Expiring<V>> for WrittenTtl {
    fn expire_after_create(&self, _key: &String, value: &Expiring<V>, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Expiring<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}
