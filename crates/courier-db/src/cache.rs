//! Bounded authorization cache with sliding and absolute expiry.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use courier_types::models::AccessToken;
use lru::LruCache;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub capacity: usize,
    /// An entry expires once it goes unread for this long.
    pub sliding: Duration,
    /// An entry expires this long after insertion, however often it is read.
    pub absolute: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1 << 20,
            sliding: Duration::from_secs(60),
            absolute: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Credential { scheme: String, digest: String },
    ChannelOwner { account: i64, channel: String },
    TokenOwner { account: i64, channel: String, token: i64 },
    TokenOnChannel { channel: String, token: i64 },
    Secret(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Account(i64),
    Granted,
    Token(AccessToken),
}

struct Entry {
    value: CachedValue,
    inserted: DateTime<Utc>,
    last_access: DateTime<Utc>,
}

pub struct AuthCache {
    entries: Mutex<LruCache<CacheKey, Entry>>,
    sliding: TimeDelta,
    absolute: TimeDelta,
    generation: AtomicU64,
}

impl AuthCache {
    pub fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            sliding: TimeDelta::from_std(config.sliding).unwrap_or(TimeDelta::MAX),
            absolute: TimeDelta::from_std(config.absolute).unwrap_or(TimeDelta::MAX),
            generation: AtomicU64::new(0),
        }
    }

    /// Returns the live value for `key`, refreshing its sliding window.
    pub fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CachedValue> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(key)?;
        if self.is_expired(entry, now) {
            entries.pop(key);
            return None;
        }
        entry.last_access = now;
        Some(entry.value.clone())
    }

    /// Counter bumped by every invalidation. Read it before a storage lookup
    /// and pass it to [`AuthCache::insert`] so a result that raced with an
    /// eviction is not cached.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn insert(&self, key: CacheKey, value: CachedValue, generation: u64, now: DateTime<Utc>) {
        let mut entries = self.entries.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        entries.put(key, Entry { value, inserted: now, last_access: now });
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut entries = self.entries.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.pop(key).is_some()
    }

    /// Whether `key` holds a live entry. Does not touch recency or expiry.
    pub fn contains(&self, key: &CacheKey, now: DateTime<Utc>) -> bool {
        self.entries.lock().peek(key).is_some_and(|entry| !self.is_expired(entry, now))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_expired(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        now - entry.last_access >= self.sliding || now - entry.inserted >= self.absolute
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn cache(capacity: usize) -> AuthCache {
        AuthCache::new(&CacheConfig {
            capacity,
            sliding: Duration::from_secs(60),
            absolute: Duration::from_secs(600),
        })
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn secret(s: &str) -> CacheKey {
        CacheKey::Secret(s.to_string())
    }

    #[test]
    fn hit_refreshes_sliding_window() {
        let cache = cache(8);
        cache.insert(secret("a"), CachedValue::Granted, cache.generation(), t0());

        let mut now = t0();
        for _ in 0..5 {
            now += TimeDelta::seconds(50);
            assert_eq!(cache.get(&secret("a"), now), Some(CachedValue::Granted));
        }
    }

    #[test]
    fn idle_entry_expires() {
        let cache = cache(8);
        cache.insert(secret("a"), CachedValue::Granted, cache.generation(), t0());

        assert!(cache.get(&secret("a"), t0() + TimeDelta::seconds(61)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn absolute_expiry_wins_over_activity() {
        let cache = cache(8);
        cache.insert(secret("a"), CachedValue::Account(7), cache.generation(), t0());

        let mut now = t0();
        for _ in 0..19 {
            now += TimeDelta::seconds(30);
            assert!(cache.get(&secret("a"), now).is_some());
        }
        now += TimeDelta::seconds(30);
        assert!(cache.get(&secret("a"), now).is_none());
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = cache(2);
        let generation = cache.generation();
        cache.insert(secret("a"), CachedValue::Granted, generation, t0());
        cache.insert(secret("b"), CachedValue::Granted, generation, t0());
        assert!(cache.get(&secret("a"), t0()).is_some());
        cache.insert(secret("c"), CachedValue::Granted, generation, t0());

        assert!(cache.contains(&secret("a"), t0()));
        assert!(!cache.contains(&secret("b"), t0()));
        assert!(cache.contains(&secret("c"), t0()));
    }

    #[test]
    fn insert_after_invalidation_is_dropped() {
        let cache = cache(8);
        let stale = cache.generation();
        cache.invalidate(&secret("a"));
        cache.insert(secret("a"), CachedValue::Granted, stale, t0());

        assert!(!cache.contains(&secret("a"), t0()));
    }

    #[test]
    fn invalidate_removes_exact_key() {
        let cache = cache(8);
        let generation = cache.generation();
        let owner = CacheKey::ChannelOwner { account: 1, channel: "ch".into() };
        let other = CacheKey::ChannelOwner { account: 2, channel: "ch".into() };
        cache.insert(owner.clone(), CachedValue::Granted, generation, t0());
        cache.insert(other.clone(), CachedValue::Granted, generation, t0());

        assert!(cache.invalidate(&owner));
        assert!(!cache.invalidate(&owner));
        assert!(cache.contains(&other, t0()));
    }
}
