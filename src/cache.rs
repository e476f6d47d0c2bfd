// src/cache.rs
//! Per-category in-memory cache. One entry per category, replaced wholesale.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

use crate::category::Category;
use crate::records::Resolved;

#[derive(Debug)]
pub struct CacheEntry {
    pub category: Category,
    pub payload: Arc<Resolved>,
    /// Monotonic timestamp used for expiry.
    pub fetched_at: Instant,
    /// Wall-clock timestamp for diagnostics.
    pub fetched_at_utc: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(category: Category, payload: Arc<Resolved>, ttl: Duration) -> Self {
        Self {
            category,
            payload,
            fetched_at: Instant::now(),
            fetched_at_utc: Utc::now(),
            ttl,
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        self.age(now) < self.ttl
    }
}

#[derive(Debug, Default)]
pub struct CategoryCache {
    entries: RwLock<HashMap<Category, Arc<CacheEntry>>>,
}

impl CategoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: Category) -> Option<Arc<CacheEntry>> {
        let g = match self.entries.read() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        g.get(&category).cloned()
    }

    /// Entry for `category` if it is still within its TTL at `now`.
    pub fn get_fresh(&self, category: Category, now: Instant) -> Option<Arc<CacheEntry>> {
        self.get(category).filter(|e| e.is_fresh(now))
    }

    /// Store `entry` unless the current one is at least as new.
    /// Returns whether the entry was written.
    pub fn store(&self, entry: Arc<CacheEntry>) -> bool {
        let mut g = match self.entries.write() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        if let Some(existing) = g.get(&entry.category) {
            if existing.fetched_at >= entry.fetched_at {
                return false;
            }
        }
        g.insert(entry.category, entry);
        true
    }

    /// All entries, ordered by category.
    pub fn snapshot(&self) -> Vec<Arc<CacheEntry>> {
        let g = match self.entries.read() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        };
        let mut out: Vec<_> = g.values().cloned().collect();
        out.sort_by_key(|e| e.category);
        out
    }
}
