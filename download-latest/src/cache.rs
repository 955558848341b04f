use crate::release::ReleaseSnapshot;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, LazyLock, Mutex},
};

/// How long a cached release stays fresh.
pub const DEFAULT_TTL_SECONDS: i64 = 300;

/// A string key-value store for cached releases. Implementations may fail in any way they like.
/// The cache treats every failure as a miss.
pub trait CacheStorage: Send + Sync {
    /// # Errors
    ///
    /// Any error means "no usable value".
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// # Errors
    ///
    /// Any error means the value was not stored.
    fn set(&self, key: &str, value: String) -> Result<()>;

    /// # Errors
    ///
    /// Any error means the value may still be stored.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Where the cache gets the current time from.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// An in-process [`CacheStorage`]. Everything in it is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| anyhow!("cache lock is poisoned: {e}"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<()> {
        self.entries
            .lock()
            .map_err(|e| anyhow!("cache lock is poisoned: {e}"))?
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .lock()
            .map_err(|e| anyhow!("cache lock is poisoned: {e}"))?
            .remove(key);
        Ok(())
    }
}

static SHARED_STORAGE: LazyLock<Arc<MemoryStorage>> =
    LazyLock::new(|| Arc::new(MemoryStorage::new()));

#[derive(Debug, Deserialize, Serialize)]
struct Entry {
    data: ReleaseSnapshot,
    timestamp: DateTime<Utc>,
}

/// A short-lived, best-effort cache of release snapshots.
///
/// The cache never returns an error. If the storage backend fails or holds something we cannot
/// parse, that is a miss on read and a no-op on write.
#[derive(Clone)]
pub struct ReleaseCache {
    storage: Option<Arc<dyn CacheStorage>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl fmt::Debug for ReleaseCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseCache")
            .field("enabled", &self.storage.is_some())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl Default for ReleaseCache {
    fn default() -> Self {
        Self::shared()
    }
}

impl ReleaseCache {
    /// A cache over the given storage and clock with the default five minute lifetime.
    #[must_use]
    pub fn new(storage: Arc<dyn CacheStorage>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage: Some(storage),
            clock,
            ttl: Duration::seconds(DEFAULT_TTL_SECONDS),
        }
    }

    /// A cache over a single in-memory store shared by the whole process. Every instance returned
    /// by this function sees the same entries.
    #[must_use]
    pub fn shared() -> Self {
        let storage: Arc<dyn CacheStorage> = SHARED_STORAGE.clone();
        Self::new(storage, Arc::new(SystemClock))
    }

    /// A cache with no storage at all. Every lookup is a miss.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            storage: None,
            clock: Arc::new(SystemClock),
            ttl: Duration::seconds(DEFAULT_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The cache key for a repository and an optional tag on the API at `api_base`. Releases from
    /// different hosts never share a key, even when the repository names are the same.
    #[must_use]
    pub fn key(api_base: &str, repo: &str, version: Option<&str>) -> String {
        format!("{api_base}|{repo}:{}", version.unwrap_or("latest"))
    }

    /// Returns the cached snapshot for `key` if there is one and it is still fresh.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ReleaseSnapshot> {
        let storage = self.storage.as_ref()?;
        let raw = match storage.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("no cached release for {key}");
                return None;
            }
            Err(e) => {
                debug!("could not read cached release for {key}: {e}");
                return None;
            }
        };
        let entry = match serde_json::from_str::<Entry>(&raw) {
            Ok(e) => e,
            Err(e) => {
                debug!("ignoring malformed cached release for {key}: {e}");
                return None;
            }
        };

        let age = self.clock.now() - entry.timestamp;
        if age >= self.ttl {
            debug!(
                "cached release for {key} is stale ({}s old)",
                age.num_seconds()
            );
            return None;
        }

        debug!(
            "using cached release for {key} ({}s old)",
            age.num_seconds()
        );
        Some(entry.data)
    }

    /// Stores a snapshot under `key`, stamped with the current time.
    pub fn set(&self, key: &str, snapshot: &ReleaseSnapshot) {
        let Some(storage) = self.storage.as_ref() else {
            return;
        };
        let entry = Entry {
            data: snapshot.clone(),
            timestamp: self.clock.now(),
        };
        let raw = match serde_json::to_string(&entry) {
            Ok(r) => r,
            Err(e) => {
                debug!("could not serialize release for {key}: {e}");
                return;
            }
        };
        if let Err(e) = storage.set(key, raw) {
            debug!("could not cache release for {key}: {e}");
        }
    }

    /// Drops any cached snapshot for `key`, so the next lookup goes to the network.
    pub fn invalidate(&self, key: &str) {
        let Some(storage) = self.storage.as_ref() else {
            return;
        };
        if let Err(e) = storage.remove(key) {
            debug!("could not remove cached release for {key}: {e}");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::release::Asset;
    use test_log::test;
    use url::Url;

    /// A clock the test can move forward by hand.
    #[derive(Debug)]
    pub(crate) struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self(Mutex::new(Utc::now())))
        }

        pub(crate) fn advance(&self, seconds: i64) {
            let mut now = self.0.lock().unwrap();
            *now += Duration::seconds(seconds);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    /// Storage that fails every operation, like a browser with storage disabled.
    pub(crate) struct BrokenStorage;

    impl CacheStorage for BrokenStorage {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow!("storage is disabled"))
        }

        fn set(&self, _key: &str, _value: String) -> Result<()> {
            Err(anyhow!("quota exceeded"))
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Err(anyhow!("storage is disabled"))
        }
    }

    fn snapshot() -> ReleaseSnapshot {
        ReleaseSnapshot {
            version: "v1.0.0".to_string(),
            release_page_url: Url::parse("https://github.com/owner/repo/releases/tag/v1.0.0")
                .unwrap(),
            assets: vec![Asset {
                name: "app.dmg".to_string(),
                url: Url::parse("https://example.com/app.dmg").unwrap(),
                size: 10,
            }],
        }
    }

    #[test]
    fn key_defaults_to_latest() {
        assert_eq!(
            ReleaseCache::key("https://api.github.com/", "owner/repo", None),
            "https://api.github.com/|owner/repo:latest"
        );
        assert_eq!(
            ReleaseCache::key("https://api.github.com/", "owner/repo", Some("v1.0.0")),
            "https://api.github.com/|owner/repo:v1.0.0"
        );
    }

    #[test]
    fn key_differs_per_api_host() {
        assert_ne!(
            ReleaseCache::key("https://api.github.com/", "owner/repo", None),
            ReleaseCache::key("https://ghe.example.com/api/v3/", "owner/repo", None),
        );
    }

    #[test]
    fn fresh_entry_is_returned() {
        let clock = ManualClock::new();
        let cache = ReleaseCache::new(Arc::new(MemoryStorage::new()), clock.clone());
        cache.set("k", &snapshot());
        clock.advance(DEFAULT_TTL_SECONDS - 1);
        assert_eq!(cache.get("k"), Some(snapshot()));
    }

    #[test]
    fn entry_expires_after_ttl() {
        let clock = ManualClock::new();
        let cache = ReleaseCache::new(Arc::new(MemoryStorage::new()), clock.clone());
        cache.set("k", &snapshot());
        clock.advance(DEFAULT_TTL_SECONDS);
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn custom_ttl() {
        let clock = ManualClock::new();
        let cache = ReleaseCache::new(Arc::new(MemoryStorage::new()), clock.clone())
            .with_ttl(Duration::seconds(10));
        cache.set("k", &snapshot());
        clock.advance(11);
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn rewriting_an_entry_refreshes_it() {
        let clock = ManualClock::new();
        let cache = ReleaseCache::new(Arc::new(MemoryStorage::new()), clock.clone());
        cache.set("k", &snapshot());
        clock.advance(DEFAULT_TTL_SECONDS - 1);
        cache.set("k", &snapshot());
        clock.advance(DEFAULT_TTL_SECONDS - 1);
        assert!(cache.get("k").is_some());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = ReleaseCache::new(Arc::new(MemoryStorage::new()), ManualClock::new());
        cache.set("k", &snapshot());
        cache.invalidate("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn broken_storage_is_a_miss_not_an_error() {
        let cache = ReleaseCache::new(Arc::new(BrokenStorage), ManualClock::new());
        cache.set("k", &snapshot());
        assert_eq!(cache.get("k"), None);
        cache.invalidate("k");
    }

    #[test]
    fn malformed_payload_is_a_miss() -> Result<()> {
        let storage = Arc::new(MemoryStorage::new());
        storage.set("k", "{not json".to_string())?;
        storage.set("k2", r#"{"data": {}, "timestamp": 0}"#.to_string())?;
        let cache = ReleaseCache::new(storage, ManualClock::new());
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.get("k2"), None);
        Ok(())
    }

    #[test]
    fn disabled_cache_always_misses() {
        let cache = ReleaseCache::disabled();
        cache.set("k", &snapshot());
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn shared_caches_see_each_others_entries() {
        let key = "shared/test:v9.9.9";
        ReleaseCache::shared().set(key, &snapshot());
        assert_eq!(ReleaseCache::shared().get(key), Some(snapshot()));
        ReleaseCache::shared().invalidate(key);
        assert_eq!(ReleaseCache::shared().get(key), None);
    }
}
