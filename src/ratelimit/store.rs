//! Concurrent bucket registry.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, trace};

use super::bucket::TokenBucket;
use super::key::LimiterKey;
use super::policy::Quota;

/// Registry mapping limiter keys to their buckets.
///
/// Buckets are created lazily on first access, exactly once per distinct
/// key even under concurrent first access. The registry is explicitly
/// constructed and shared via `Arc`; there is no process-global instance,
/// so tests get isolated stores.
///
/// Entries grow with identity cardinality. Call [`evict_idle`] from a
/// background task (or use [`spawn_sweeper`]) to drop buckets that have
/// not admitted traffic for a while; an evicted key is recreated full on
/// its next request.
///
/// [`evict_idle`]: BucketStore::evict_idle
/// [`spawn_sweeper`]: BucketStore::spawn_sweeper
pub struct BucketStore {
    /// Buckets indexed by limiter key.
    buckets: DashMap<LimiterKey, Arc<TokenBucket>>,
}

impl BucketStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }

    /// Get the bucket for `key`, creating it full if this is the key's
    /// first access.
    ///
    /// Concurrent first accesses agree on a single bucket instance: the
    /// map's entry lock makes the check-then-create step linearizable.
    pub fn get_or_create(&self, key: &LimiterKey, quota: Quota) -> Arc<TokenBucket> {
        if let Some(bucket) = self.buckets.get(key) {
            return Arc::clone(&bucket);
        }

        let bucket = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(
                    key = %key,
                    capacity = quota.capacity,
                    period = ?quota.period,
                    "Creating new bucket"
                );
                Arc::new(TokenBucket::new(quota))
            });
        Arc::clone(&bucket)
    }

    /// Drop buckets idle for longer than `max_idle`.
    ///
    /// Returns the number of evicted entries. Invisible to admission
    /// semantics: only keys quiet for longer than the threshold are
    /// dropped, and those come back full on their next request anyway.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| bucket.idle_for() <= max_idle);
        // Creations may race the sweep, so the count is best-effort.
        before.saturating_sub(self.buckets.len())
    }

    /// Spawn a background task that evicts idle buckets on an interval.
    ///
    /// The task runs until the returned handle is aborted. Hosts that
    /// prefer their own scheduling can call [`evict_idle`] directly.
    ///
    /// [`evict_idle`]: BucketStore::evict_idle
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        max_idle: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // The first tick fires immediately; skip it so a fresh store
            // is not swept before it has seen traffic.
            interval.tick().await;
            loop {
                interval.tick().await;
                let evicted = store.evict_idle(max_idle);
                if evicted > 0 {
                    debug!(evicted, remaining = store.len(), "Swept idle buckets");
                } else {
                    trace!(tracked = store.len(), "Sweep found no idle buckets");
                }
            }
        })
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the store holds no buckets.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drop all buckets. Primarily useful for tests.
    pub fn clear(&self) {
        self.buckets.clear();
    }
}

impl Default for BucketStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketStore")
            .field("buckets", &self.buckets.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::policy::LimitCategory;
    use crate::ratelimit::resolver::IdentityKind;
    use std::thread;

    fn key(identity: &str) -> LimiterKey {
        LimiterKey::new(LimitCategory::Login, IdentityKind::Ip, identity)
    }

    #[test]
    fn test_same_key_returns_same_bucket() {
        let store = BucketStore::new();
        let quota = Quota::per_minute(5);

        let first = store.get_or_create(&key("1.2.3.4"), quota);
        let second = store.get_or_create(&key("1.2.3.4"), quota);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_distinct_identities_get_distinct_buckets() {
        let store = BucketStore::new();
        let quota = Quota::per_minute(5);

        let a = store.get_or_create(&key("1.2.3.4"), quota);
        let b = store.get_or_create(&key("5.6.7.8"), quota);

        assert!(!Arc::ptr_eq(&a, &b));

        // Exhausting A leaves B untouched
        for _ in 0..5 {
            assert!(a.try_consume(1));
        }
        assert!(!a.try_consume(1));
        assert!(b.try_consume(1));
    }

    #[test]
    fn test_distinct_categories_get_distinct_buckets() {
        let store = BucketStore::new();
        let quota = Quota::per_minute(5);

        let login = store.get_or_create(
            &LimiterKey::new(LimitCategory::Login, IdentityKind::Ip, "1.2.3.4"),
            quota,
        );
        let upload = store.get_or_create(
            &LimiterKey::new(LimitCategory::Upload, IdentityKind::Ip, "1.2.3.4"),
            quota,
        );

        assert!(!Arc::ptr_eq(&login, &upload));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_concurrent_first_access_creates_one_bucket() {
        let store = Arc::new(BucketStore::new());
        let quota = Quota::new(5, Duration::from_secs(3600));
        let mut handles = vec![];

        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(thread::spawn(move || {
                let bucket = store.get_or_create(&key("1.2.3.4"), quota);
                let admitted = bucket.try_consume(1);
                (bucket, admitted)
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // One live instance, observed by every caller
        assert_eq!(store.len(), 1);
        let reference = &results[0].0;
        assert!(results.iter().all(|(b, _)| Arc::ptr_eq(b, reference)));

        // First consumes are not double-counted: exactly capacity admitted
        let admitted = results.iter().filter(|(_, ok)| *ok).count();
        assert_eq!(admitted, 5);
    }

    #[test]
    fn test_evict_idle_drops_only_idle_buckets() {
        let store = BucketStore::new();
        let quota = Quota::per_minute(5);

        let stale = store.get_or_create(&key("1.2.3.4"), quota);
        stale.try_consume(1);

        thread::sleep(Duration::from_millis(60));

        let active = store.get_or_create(&key("5.6.7.8"), quota);
        active.try_consume(1);

        let evicted = store.evict_idle(Duration::from_millis(50));
        assert_eq!(evicted, 1);
        assert_eq!(store.len(), 1);

        // The evicted key comes back as a fresh, full bucket
        let reborn = store.get_or_create(&key("1.2.3.4"), quota);
        assert!(!Arc::ptr_eq(&stale, &reborn));
        assert!(reborn.available_tokens() >= 5.0 - f64::EPSILON);
    }

    #[test]
    fn test_clear() {
        let store = BucketStore::new();
        store.get_or_create(&key("1.2.3.4"), Quota::per_minute(5));
        assert!(!store.is_empty());

        store.clear();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_evicts_in_background() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("floodgate=debug")
            .with_test_writer()
            .try_init();

        let store = Arc::new(BucketStore::new());
        let bucket = store.get_or_create(&key("1.2.3.4"), Quota::per_minute(5));
        bucket.try_consume(1);
        drop(bucket);

        let handle = store.spawn_sweeper(Duration::from_millis(20), Duration::from_millis(50));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(store.is_empty());

        handle.abort();
    }
}
