//! Shared counters with atomic increment and per-key expiry
//!
//! The counter store is the only mutable state rate limiting relies on. All
//! coordination happens through the store's own atomicity; callers never hold
//! a process-local lock across a store round trip.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum CounterStoreError {
    #[error("counter store command failed: {0}")]
    Command(#[from] redis::RedisError),

    #[error("counter store command timed out after {0:?}")]
    Timeout(Duration),
}

/// Networked key/value counter contract
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically add one to `key` (creating it at 0) and return the new value
    async fn increment(&self, key: &str) -> Result<i64, CounterStoreError>;

    /// Make `key` disappear after `window`
    async fn expire(&self, key: &str, window: Duration) -> Result<(), CounterStoreError>;
}

// ============================================================================
// Redis
// ============================================================================

/// `INCR` / `EXPIRE` against Redis, each bounded by `command_timeout`
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
    command_timeout: Duration,
}

impl RedisCounterStore {
    pub fn new(conn: ConnectionManager, command_timeout: Duration) -> Self {
        Self {
            conn,
            command_timeout,
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, CounterStoreError>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match timeout(self.command_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CounterStoreError::Timeout(self.command_timeout)),
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str) -> Result<i64, CounterStoreError> {
        let mut conn = self.conn.clone();
        self.bounded(conn.incr::<_, _, i64>(key, 1i64)).await
    }

    async fn expire(&self, key: &str, window: Duration) -> Result<(), CounterStoreError> {
        let mut conn = self.conn.clone();
        let seconds = window.as_secs().max(1) as i64;
        self.bounded(conn.expire::<_, ()>(key, seconds)).await
    }
}

// ============================================================================
// In-process
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct MemoryEntry {
    count: i64,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Increments between two sweeps of expired keys
pub const DEFAULT_SWEEP_INTERVAL: u64 = 1024;

/// In-process counter store with Redis-compatible semantics
///
/// An expired key reads as absent and restarts from zero on its next
/// increment. Every `sweep_interval` increments the whole map is swept and
/// expired keys are removed, so one entry per distinct caller does not
/// accumulate for the life of the process. Time comes from `tokio::time`,
/// so tests can drive window expiry with a paused clock.
/// Counters are per-process: only suitable for tests and single-instance
/// local runs.
#[derive(Debug)]
pub struct MemoryCounterStore {
    entries: DashMap<String, MemoryEntry>,
    increments: AtomicU64,
    sweep_interval: u64,
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_interval(sweep_interval: u64) -> Self {
        Self {
            entries: DashMap::new(),
            increments: AtomicU64::new(0),
            sweep_interval: sweep_interval.max(1),
        }
    }

    /// Current value of `key`, if it exists and has not expired
    pub fn get(&self, key: &str) -> Option<i64> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.count)
    }

    /// Number of stored keys, expired ones not yet swept included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every expired key and return how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let evicted = before.saturating_sub(self.entries.len());

        if evicted > 0 {
            debug!(evicted, remaining = self.entries.len(), "Expired counters swept");
        }
        evicted
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<i64, CounterStoreError> {
        // Must run before an entry guard is taken: retain locks every shard
        let seen = self.increments.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % self.sweep_interval == 0 {
            self.purge_expired();
        }

        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(MemoryEntry {
                count: 0,
                expires_at: None,
            });

        if entry.is_expired(now) {
            *entry = MemoryEntry {
                count: 0,
                expires_at: None,
            };
        }

        entry.count += 1;
        Ok(entry.count)
    }

    async fn expire(&self, key: &str, window: Duration) -> Result<(), CounterStoreError> {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.expires_at = Some(now + window);
            }
        }
        Ok(())
    }
}
