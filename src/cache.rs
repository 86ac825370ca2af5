//! # Runtime Secret Cache
//!
//! TTL cache over the canonical secret store, used by long-lived
//! consumers (the webhook listener, embedded runtimes) to avoid
//! refetching the full mapping on every request.
//!
//! The cache trades freshness for availability: when a refresh fails, a
//! previously fetched entry is served stale rather than failing the
//! caller, and an optional process-environment fallback covers local
//! development where no store credentials exist.
//!
//! Time is injected through [`Clock`] so TTL expiry is deterministic
//! under test.

use crate::store::{SecretMap, SecretProvider, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Injectable time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock time source used outside of tests.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

type CacheKey = (String, String);

#[derive(Clone)]
struct CacheEntry {
    secrets: SecretMap,
    expires_at: Instant,
    /// Single-flight guard: true while a refresh for this key is in
    /// flight, so concurrent callers do not duplicate the fetch.
    refreshing: bool,
}

/// Process-wide cache of canonical secret mappings, keyed by
/// (project, environment).
pub struct SecretCache {
    provider: Arc<dyn SecretProvider>,
    clock: Arc<dyn Clock>,
    /// Entry lifetime; zero disables caching entirely.
    ttl: Duration,
    env_fallback: bool,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl std::fmt::Debug for SecretCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCache")
            .field("ttl", &self.ttl)
            .field("env_fallback", &self.env_fallback)
            .finish_non_exhaustive()
    }
}

/// Clears the `refreshing` flag when the refresh exits, on every path.
struct RefreshGuard<'a> {
    entries: &'a Mutex<HashMap<CacheKey, CacheEntry>>,
    key: CacheKey,
    armed: bool,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(entry) = entries.get_mut(&self.key) {
                entry.refreshing = false;
            }
        }
    }
}

impl SecretCache {
    pub fn new(provider: Arc<dyn SecretProvider>, ttl: Duration) -> Self {
        Self::with_clock(provider, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(
        provider: Arc<dyn SecretProvider>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            clock,
            ttl,
            env_fallback: false,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Enable reading requested keys from the process environment as a
    /// last resort when the store is unreachable and nothing is cached.
    #[must_use]
    pub fn with_env_fallback(mut self, enabled: bool) -> Self {
        self.env_fallback = enabled;
        self
    }

    /// Get the full secret mapping for (project, environment).
    pub async fn get(&self, project: &str, environment: &str) -> Result<SecretMap, StoreError> {
        self.resolve(project, environment, None).await
    }

    /// Get a subset of the mapping. The returned map is a copy; cached
    /// entries are never handed out for mutation.
    pub async fn get_keys(
        &self,
        project: &str,
        environment: &str,
        keys: &[&str],
    ) -> Result<SecretMap, StoreError> {
        self.resolve(project, environment, Some(keys)).await
    }

    async fn resolve(
        &self,
        project: &str,
        environment: &str,
        keys: Option<&[&str]>,
    ) -> Result<SecretMap, StoreError> {
        let key = (project.to_string(), environment.to_string());

        if !self.ttl.is_zero() {
            let entries = self.entries.lock().unwrap();
            if let Some(entry) = entries.get(&key) {
                if self.clock.now() < entry.expires_at {
                    debug!("Cache hit for {}/{}", project, environment);
                    return Ok(filter_keys(&entry.secrets, keys));
                }
            }
        }

        match self.refresh(&key).await {
            Ok(secrets) => Ok(filter_keys(&secrets, keys)),
            Err(err) => {
                // Stale fallback: a transient store outage must not take
                // down every consumer while a recent value is in memory.
                {
                    let entries = self.entries.lock().unwrap();
                    if let Some(entry) = entries.get(&key) {
                        warn!(
                            "Secret store fetch failed ({err}); serving stale secrets for {}/{}",
                            project, environment
                        );
                        return Ok(filter_keys(&entry.secrets, keys));
                    }
                }

                if self.env_fallback {
                    if let Some(keys) = keys {
                        warn!(
                            "Secret store fetch failed ({err}); reading {} keys from process environment",
                            keys.len()
                        );
                        return Ok(env_fallback_map(keys));
                    }
                    debug!("Process-environment fallback skipped: no key subset requested");
                }

                Err(err)
            }
        }
    }

    /// Fetch from the store and replace the cached entry.
    ///
    /// Single-flight: if a refresh for this key is already in flight the
    /// held (possibly stale) entry is returned instead of duplicating
    /// the network call. A failed fetch leaves the held entry untouched.
    async fn refresh(&self, key: &CacheKey) -> Result<SecretMap, StoreError> {
        let mut armed = false;
        {
            let mut entries = self.entries.lock().unwrap();
            if let Some(entry) = entries.get_mut(key) {
                if entry.refreshing {
                    debug!(
                        "Refresh already in flight for {}/{}; serving held entry",
                        key.0, key.1
                    );
                    return Ok(entry.secrets.clone());
                }
                entry.refreshing = true;
                armed = true;
            }
        }
        let _guard = RefreshGuard {
            entries: &self.entries,
            key: key.clone(),
            armed,
        };

        let secrets = self.provider.fetch(&key.1).await?;

        if !self.ttl.is_zero() {
            let mut entries = self.entries.lock().unwrap();
            entries.insert(
                key.clone(),
                CacheEntry {
                    secrets: secrets.clone(),
                    expires_at: self.clock.now() + self.ttl,
                    refreshing: false,
                },
            );
        }

        Ok(secrets)
    }

    /// Fire-and-forget refresh. A failure is logged and the existing
    /// entry, stale or not, is left untouched.
    pub fn refresh_in_background(self: &Arc<Self>, project: &str, environment: &str) {
        let cache = Arc::clone(self);
        let key = (project.to_string(), environment.to_string());
        tokio::spawn(async move {
            if let Err(err) = cache.refresh(&key).await {
                warn!(
                    "Background refresh failed for {}/{}: {}",
                    key.0, key.1, err
                );
            }
        });
    }

    /// Wipe all entries. Test reset, not part of request serving.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

fn filter_keys(secrets: &SecretMap, keys: Option<&[&str]>) -> SecretMap {
    match keys {
        None => secrets.clone(),
        Some(keys) => keys
            .iter()
            .filter_map(|key| {
                secrets
                    .get(*key)
                    .map(|value| ((*key).to_string(), value.clone()))
            })
            .collect(),
    }
}

fn env_fallback_map(keys: &[&str]) -> SecretMap {
    keys.iter()
        .filter_map(|key| {
            std::env::var(key)
                .ok()
                .map(|value| ((*key).to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct TestProvider {
        secrets: Mutex<SecretMap>,
        fail: AtomicBool,
        fetches: AtomicUsize,
        delay: Option<Duration>,
    }

    impl TestProvider {
        fn new(pairs: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                secrets: Mutex::new(
                    pairs
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect(),
                ),
                fail: AtomicBool::new(false),
                fetches: AtomicUsize::new(0),
                delay: None,
            })
        }

        fn slow(pairs: &[(&str, &str)], delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                secrets: Mutex::new(
                    pairs
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect(),
                ),
                fail: AtomicBool::new(false),
                fetches: AtomicUsize::new(0),
                delay: Some(delay),
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SecretProvider for TestProvider {
        async fn fetch(&self, _environment: &str) -> Result<SecretMap, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("store offline".to_string()));
            }
            Ok(self.secrets.lock().unwrap().clone())
        }
    }

    struct TestClock {
        base: Instant,
        offset: Mutex<Duration>,
    }

    impl TestClock {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                base: Instant::now(),
                offset: Mutex::new(Duration::ZERO),
            })
        }

        fn advance(&self, duration: Duration) {
            *self.offset.lock().unwrap() += duration;
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.base + *self.offset.lock().unwrap()
        }
    }

    #[tokio::test]
    async fn test_second_get_within_ttl_hits_cache() {
        let provider = TestProvider::new(&[("API_KEY", "a")]);
        let clock = TestClock::new();
        let cache = SecretCache::with_clock(
            Arc::clone(&provider) as Arc<dyn SecretProvider>,
            DEFAULT_TTL,
            Arc::clone(&clock) as Arc<dyn Clock>,
        );

        let first = cache.get("my-app", "production").await.unwrap();
        let second = cache.get("my-app", "production").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.fetches(), 1);
    }

    #[tokio::test]
    async fn test_get_after_ttl_expiry_refetches() {
        let provider = TestProvider::new(&[("API_KEY", "a")]);
        let clock = TestClock::new();
        let cache = SecretCache::with_clock(
            Arc::clone(&provider) as Arc<dyn SecretProvider>,
            Duration::from_secs(300),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );

        cache.get("my-app", "production").await.unwrap();
        clock.advance(Duration::from_secs(301));
        cache.get("my-app", "production").await.unwrap();

        assert_eq!(provider.fetches(), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_caching() {
        let provider = TestProvider::new(&[("API_KEY", "a")]);
        let cache = SecretCache::new(
            Arc::clone(&provider) as Arc<dyn SecretProvider>,
            Duration::ZERO,
        );

        cache.get("my-app", "production").await.unwrap();
        cache.get("my-app", "production").await.unwrap();

        assert_eq!(provider.fetches(), 2);
    }

    #[tokio::test]
    async fn test_stale_entry_served_when_fetch_fails() {
        let provider = TestProvider::new(&[("API_KEY", "a")]);
        let clock = TestClock::new();
        let cache = SecretCache::with_clock(
            Arc::clone(&provider) as Arc<dyn SecretProvider>,
            Duration::from_secs(300),
            Arc::clone(&clock) as Arc<dyn Clock>,
        );

        let fresh = cache.get("my-app", "production").await.unwrap();
        clock.advance(Duration::from_secs(301));
        provider.fail.store(true, Ordering::SeqCst);

        let stale = cache.get("my-app", "production").await.unwrap();

        assert_eq!(fresh, stale);
        assert_eq!(provider.fetches(), 2);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates_without_cache_or_fallback() {
        let provider = TestProvider::new(&[("API_KEY", "a")]);
        provider.fail.store(true, Ordering::SeqCst);
        let cache = SecretCache::new(Arc::clone(&provider) as Arc<dyn SecretProvider>, DEFAULT_TTL);

        let result = cache.get("my-app", "production").await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_env_fallback_reads_requested_keys() {
        let provider = TestProvider::new(&[]);
        provider.fail.store(true, Ordering::SeqCst);
        let cache = SecretCache::new(Arc::clone(&provider) as Arc<dyn SecretProvider>, DEFAULT_TTL)
            .with_env_fallback(true);

        std::env::set_var("SECRET_SYNC_CACHE_TEST_KEY", "from-env");
        let secrets = cache
            .get_keys("my-app", "production", &["SECRET_SYNC_CACHE_TEST_KEY"])
            .await
            .unwrap();

        assert_eq!(
            secrets.get("SECRET_SYNC_CACHE_TEST_KEY").map(String::as_str),
            Some("from-env")
        );
    }

    #[tokio::test]
    async fn test_get_keys_filters_cached_entry() {
        let provider = TestProvider::new(&[("API_KEY", "a"), ("DB_URL", "b")]);
        let cache = SecretCache::new(Arc::clone(&provider) as Arc<dyn SecretProvider>, DEFAULT_TTL);

        let subset = cache
            .get_keys("my-app", "production", &["API_KEY"])
            .await
            .unwrap();

        assert_eq!(subset.len(), 1);
        assert_eq!(subset.get("API_KEY").map(String::as_str), Some("a"));
        assert_eq!(provider.fetches(), 1);
    }

    #[tokio::test]
    async fn test_clear_forces_refetch() {
        let provider = TestProvider::new(&[("API_KEY", "a")]);
        let cache = SecretCache::new(Arc::clone(&provider) as Arc<dyn SecretProvider>, DEFAULT_TTL);

        cache.get("my-app", "production").await.unwrap();
        cache.clear();
        cache.get("my-app", "production").await.unwrap();

        assert_eq!(provider.fetches(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_is_single_flight() {
        let provider = TestProvider::slow(&[("API_KEY", "a")], Duration::from_millis(50));
        let clock = TestClock::new();
        let cache = Arc::new(SecretCache::with_clock(
            Arc::clone(&provider) as Arc<dyn SecretProvider>,
            Duration::from_secs(300),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));

        // Populate, then expire so both concurrent gets want a refresh.
        // On the single-threaded test runtime the first future marks the
        // entry as refreshing before it yields, so the order is fixed.
        cache.get("my-app", "production").await.unwrap();
        clock.advance(Duration::from_secs(301));

        let (a, b) = tokio::join!(
            cache.get("my-app", "production"),
            cache.get("my-app", "production"),
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        // One initial fetch plus exactly one refresh; the second caller
        // was served the held entry.
        assert_eq!(provider.fetches(), 2);
    }

    #[tokio::test]
    async fn test_failed_background_refresh_leaves_entry_intact() {
        let provider = TestProvider::new(&[("API_KEY", "a")]);
        let clock = TestClock::new();
        let cache = Arc::new(SecretCache::with_clock(
            Arc::clone(&provider) as Arc<dyn SecretProvider>,
            Duration::from_secs(300),
            Arc::clone(&clock) as Arc<dyn Clock>,
        ));

        let original = cache.get("my-app", "production").await.unwrap();
        provider.fail.store(true, Ordering::SeqCst);

        cache.refresh_in_background("my-app", "production");
        tokio::time::sleep(Duration::from_millis(20)).await;

        clock.advance(Duration::from_secs(301));
        let served = cache.get("my-app", "production").await.unwrap();
        assert_eq!(original, served);
    }
}
