//! Time-bounded result cache keyed by a (SQL, params) fingerprint.
//!
//! Entries are inserted only when the caller opts in with a TTL. Expired
//! entries are purged by the pool's maintenance sweep; a read that lands on an
//! expired entry misses (and drops the entry) rather than serving stale data.

use crate::query::{QueryOutcome, SqlParam};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::debug;

/// SHA-256 of the normalized SQL text plus serialized parameters.
pub(crate) type Fingerprint = [u8; 32];

pub(crate) fn fingerprint(sql: &str, params: &[SqlParam]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(sql.trim().as_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(params).unwrap_or_default());
    hasher.finalize().into()
}

struct CachedResult {
    outcome: QueryOutcome,
    expires_at: Instant,
}

#[derive(Default)]
pub(crate) struct ResultCache {
    entries: DashMap<Fingerprint, CachedResult>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a live entry, or misses. An entry found past its expiry is
    /// removed on the spot.
    pub fn get(&self, key: &Fingerprint) -> Option<QueryOutcome> {
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > Instant::now() {
                return Some(entry.outcome.clone());
            }
        }
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= Instant::now());
        None
    }

    pub fn insert(&self, key: Fingerprint, outcome: QueryOutcome, ttl: Duration) {
        self.entries.insert(
            key,
            CachedResult {
                outcome,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Time-driven eviction, run from the maintenance loop.
    pub fn purge_expired(&self) {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "purged expired result-cache entries");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
