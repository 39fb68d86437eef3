//! Time-windowed status cache
//!
//! Every device reads its properties from the most recent status snapshot. A
//! remote fetch happens only when the snapshot is older than the refresh
//! interval, when no snapshot exists yet, or when the caller forces one.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default refresh interval for the TCS status
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Monotonic time source
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock backed by `Instant::now`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset_nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset_nanos: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset_nanos.fetch_add(nanos, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_nanos(self.offset_nanos.load(Ordering::SeqCst))
    }
}

/// Anything that can produce a complete status snapshot in one call
#[async_trait]
pub trait StatusSource: Send + Sync {
    type Snapshot: Send + Sync;
    type Error: Send;

    async fn fetch_status(&self) -> Result<Self::Snapshot, Self::Error>;
}

/// Caches the latest snapshot of a source for a fixed interval
pub struct StatusCache<S: StatusSource> {
    source: S,
    clock: Arc<dyn Clock>,
    refresh_interval: Duration,
    snapshot: Option<Arc<S::Snapshot>>,
    last_fetch: Option<Instant>,
    invalidated: bool,
}

impl<S: StatusSource> StatusCache<S> {
    pub fn new(source: S, refresh_interval: Duration) -> Self {
        Self::with_clock(source, refresh_interval, Arc::new(SystemClock))
    }

    pub fn with_clock(source: S, refresh_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            clock,
            refresh_interval,
            snapshot: None,
            last_fetch: None,
            invalidated: false,
        }
    }

    /// Return the cached snapshot, fetching a new one if it is stale or `force` is set.
    ///
    /// A failed fetch leaves the previous snapshot and timestamp untouched,
    /// so the next call fetches again.
    pub async fn get_status(&mut self, force: bool) -> Result<Arc<S::Snapshot>, S::Error> {
        if !force {
            if let Some(snapshot) = self.fresh_snapshot() {
                return Ok(snapshot);
            }
        }

        let requested_at = self.clock.now();
        let snapshot = Arc::new(self.source.fetch_status().await?);

        // Never let the recorded fetch time run backwards
        let fetched_at = match self.last_fetch {
            Some(prev) if prev > requested_at => {
                warn!("Clock reported time before previous fetch; keeping previous timestamp");
                prev
            }
            _ => requested_at,
        };

        debug!(force, "Status refreshed");
        self.last_fetch = Some(fetched_at);
        self.snapshot = Some(Arc::clone(&snapshot));
        self.invalidated = false;
        Ok(snapshot)
    }

    fn fresh_snapshot(&self) -> Option<Arc<S::Snapshot>> {
        if self.invalidated {
            return None;
        }
        let snapshot = self.snapshot.as_ref()?;
        let fetched_at = self.last_fetch?;
        let age = self.clock.now().saturating_duration_since(fetched_at);
        (age < self.refresh_interval).then(|| Arc::clone(snapshot))
    }

    /// Most recent snapshot without touching the source
    pub fn snapshot(&self) -> Option<Arc<S::Snapshot>> {
        self.snapshot.clone()
    }

    pub fn last_fetch(&self) -> Option<Instant> {
        self.last_fetch
    }

    /// Whether a call to `get_status(false)` would be served from cache
    pub fn is_fresh(&self) -> bool {
        self.fresh_snapshot().is_some()
    }

    /// Mark the cached snapshot stale without discarding it
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn set_refresh_interval(&mut self, interval: Duration) {
        self.refresh_interval = interval;
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[derive(Default)]
    struct CountingSource {
        attempts: AtomicUsize,
        fetches: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl StatusSource for Arc<CountingSource> {
        type Snapshot = usize;
        type Error = String;

        async fn fetch_status(&self) -> Result<usize, String> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err("link down".to_string());
            }
            Ok(self.fetches.fetch_add(1, Ordering::SeqCst) + 1)
        }
    }

    fn cache_with_clock() -> (StatusCache<Arc<CountingSource>>, Arc<CountingSource>, ManualClock) {
        let source = Arc::new(CountingSource::default());
        let clock = ManualClock::new();
        let cache = StatusCache::with_clock(
            Arc::clone(&source),
            DEFAULT_REFRESH_INTERVAL,
            Arc::new(clock.clone()),
        );
        (cache, source, clock)
    }

    #[tokio::test]
    async fn test_first_call_fetches() {
        let (mut cache, source, _clock) = cache_with_clock();
        assert!(cache.snapshot().is_none());
        assert!(cache.last_fetch().is_none());

        let snapshot = cache.get_status(false).await.unwrap();
        assert_eq!(*snapshot, 1);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert!(cache.last_fetch().is_some());
    }

    #[tokio::test]
    async fn test_calls_within_interval_share_snapshot() {
        let (mut cache, source, clock) = cache_with_clock();

        let first = cache.get_status(false).await.unwrap();
        clock.advance(Duration::from_millis(400));
        let second = cache.get_status(false).await.unwrap();
        clock.advance(Duration::from_millis(599));
        let third = cache.get_status(false).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &third));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_snapshot_refetches() {
        let (mut cache, source, clock) = cache_with_clock();

        let first = cache.get_status(false).await.unwrap();
        clock.advance(Duration::from_millis(1000));
        let second = cache.get_status(false).await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(*second, 2);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_force_always_fetches() {
        let (mut cache, source, _clock) = cache_with_clock();

        cache.get_status(false).await.unwrap();
        let forced = cache.get_status(true).await.unwrap();
        assert_eq!(*forced, 2);

        // The forced snapshot is what later unforced reads see
        let cached = cache.get_status(false).await.unwrap();
        assert!(Arc::ptr_eq(&forced, &cached));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_state() {
        let (mut cache, source, clock) = cache_with_clock();

        let first = cache.get_status(false).await.unwrap();
        let fetched_at = cache.last_fetch();

        clock.advance(Duration::from_secs(2));
        source.fail.store(true, Ordering::SeqCst);
        assert_eq!(cache.get_status(false).await.unwrap_err(), "link down");

        assert!(Arc::ptr_eq(&cache.snapshot().unwrap(), &first));
        assert_eq!(cache.last_fetch(), fetched_at);
        assert!(!cache.is_fresh());

        // Next call retries the source instead of serving the stale snapshot
        source.fail.store(false, Ordering::SeqCst);
        let recovered = cache.get_status(false).await.unwrap();
        assert_eq!(*recovered, 2);
    }

    #[tokio::test]
    async fn test_failed_forced_fetch_within_interval_serves_cached() {
        let (mut cache, source, clock) = cache_with_clock();

        let first = cache.get_status(false).await.unwrap();
        clock.advance(Duration::from_millis(400));
        source.fail.store(true, Ordering::SeqCst);
        assert!(cache.get_status(true).await.is_err());
        assert_eq!(source.attempts.load(Ordering::SeqCst), 2);

        let cached = cache.get_status(false).await.unwrap();
        assert!(Arc::ptr_eq(&cached, &first));
        assert_eq!(source.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_on_first_fetch() {
        let (mut cache, source, _clock) = cache_with_clock();
        source.fail.store(true, Ordering::SeqCst);

        assert!(cache.get_status(false).await.is_err());
        assert!(cache.snapshot().is_none());
        assert!(cache.last_fetch().is_none());
    }

    #[tokio::test]
    async fn test_last_fetch_is_monotonic() {
        let (mut cache, _source, clock) = cache_with_clock();

        let mut previous = None;
        for _ in 0..5 {
            cache.get_status(true).await.unwrap();
            let current = cache.last_fetch();
            assert!(current >= previous);
            previous = current;
            clock.advance(Duration::from_millis(300));
        }
    }

    #[tokio::test]
    async fn test_invalidate_forces_next_fetch() {
        let (mut cache, source, _clock) = cache_with_clock();

        cache.get_status(false).await.unwrap();
        assert!(cache.is_fresh());

        cache.invalidate();
        assert!(!cache.is_fresh());
        assert!(cache.snapshot().is_some());

        cache.get_status(false).await.unwrap();
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert!(cache.is_fresh());
    }

    #[tokio::test]
    async fn test_zero_interval_fetches_every_time() {
        let (mut cache, source, _clock) = cache_with_clock();
        cache.set_refresh_interval(Duration::ZERO);

        for _ in 0..3 {
            cache.get_status(false).await.unwrap();
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
    }
}
