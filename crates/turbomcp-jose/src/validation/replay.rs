//! Token replay detection

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

/// Records token identifiers for the remainder of their validity window.
///
/// Implementations must be safe for concurrent use: `try_add` is the single atomic
/// check-and-record operation the pipeline relies on.
pub trait TokenReplayCache: Send + Sync + fmt::Debug {
    /// Record `token_id` until `expires_at` (seconds since the epoch).
    ///
    /// Returns `false` if the identifier is already recorded and has not expired at `now`.
    fn try_add(&self, token_id: &str, expires_at: i64, now: i64) -> bool;

    /// Whether `token_id` is recorded and unexpired at `now`
    fn contains(&self, token_id: &str, now: i64) -> bool;
}

/// Seconds between opportunistic purges run from `try_add`
pub const REPLAY_PURGE_INTERVAL_SECS: i64 = 60;

/// In-memory replay cache keyed by `jti`
///
/// Expired entries are dropped by `try_add` at most once every
/// [`REPLAY_PURGE_INTERVAL_SECS`]; [`InMemoryReplayCache::purge_expired`] can also be
/// called directly.
#[derive(Debug, Default)]
pub struct InMemoryReplayCache {
    entries: DashMap<String, i64>,
    next_purge_at: AtomicI64,
}

impl InMemoryReplayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop entries whose validity window ended before `now`; returns how many were removed
    pub fn purge_expired(&self, now: i64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| *expires_at >= now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Purged expired replay cache entries");
        }
        removed
    }

    /// Purge if the interval has elapsed; only the caller that wins the swap purges
    fn maybe_purge(&self, now: i64) {
        let due = self.next_purge_at.load(Ordering::Relaxed);
        if now < due {
            return;
        }
        if self
            .next_purge_at
            .compare_exchange(due, now + REPLAY_PURGE_INTERVAL_SECS, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.purge_expired(now);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TokenReplayCache for InMemoryReplayCache {
    fn try_add(&self, token_id: &str, expires_at: i64, now: i64) -> bool {
        let added = match self.entries.entry(token_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() >= now {
                    false
                } else {
                    // previous window is over, the identifier may be used again
                    occupied.insert(expires_at);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(expires_at);
                true
            }
        };
        // entry guard is released here; `retain` locks every shard
        self.maybe_purge(now);
        added
    }

    fn contains(&self, token_id: &str, now: i64) -> bool {
        self.entries
            .get(token_id)
            .is_some_and(|expires_at| *expires_at >= now)
    }
}
