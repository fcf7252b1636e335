//! Time-windowed ingestion buffer
//!
//! Samples land in one bucket per (source, time quantum). Each bucket
//! carries its own lock, so concurrent producers on different buckets never
//! contend; the map-level lock is only taken briefly to look up, create or
//! evict buckets. Buckets older than the TTL are evicted on every ingest and
//! by the periodic sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use crate::adapters::errors::SourceError;
use crate::adapters::traits::{into_source_score, SourceAdapter};
use crate::adapters::types::{FetchParams, SentimentSample, SourceId, SourceScore};
use crate::core::scorer::{score_weighted, TextScorer};
use crate::core::store::{StoreResult, TtlStore};

/// Prefix of journaled bucket lists in the TTL store
pub const WINDOW_KEY_PREFIX: &str = "sentiment:window:";

// =============================================================================
// Buckets
// =============================================================================

/// (source, quantum start in epoch seconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub source: SourceId,
    pub quantum_start: i64,
}

impl BucketKey {
    pub fn for_instant(source: SourceId, at: DateTime<Utc>, granularity: Duration) -> Self {
        let step = granularity.as_secs().max(1) as i64;
        Self {
            source,
            quantum_start: at.timestamp().div_euclid(step) * step,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.quantum_start, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// `sentiment:window:{source}:{yyyyMMddHHmm}`
    pub fn storage_key(&self) -> String {
        format!(
            "{}{}:{}",
            WINDOW_KEY_PREFIX,
            self.source,
            self.start().format("%Y%m%d%H%M")
        )
    }

    /// Inverse of `storage_key`
    pub fn from_storage_key(key: &str) -> Option<Self> {
        let rest = key.strip_prefix(WINDOW_KEY_PREFIX)?;
        let (source, stamp) = rest.split_once(':')?;
        let source = source.parse().ok()?;
        let start = chrono::NaiveDateTime::parse_from_str(&format!("{}00", stamp), "%Y%m%d%H%M%S").ok()?;
        Some(Self {
            source,
            quantum_start: start.and_utc().timestamp(),
        })
    }
}

/// Samples for one (source, quantum), guarded by its own lock
#[derive(Debug)]
pub struct WindowBucket {
    pub key: BucketKey,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
    samples: Mutex<Vec<SentimentSample>>,
}

impl WindowBucket {
    fn new(key: BucketKey, created_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key,
            created_at,
            ttl,
            samples: Mutex::new(Vec::new()),
        }
    }

    /// Strictly older than the TTL
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_milliseconds() > self.ttl.as_millis() as i64
    }

    pub async fn len(&self) -> usize {
        self.samples.lock().await.len()
    }
}

// =============================================================================
// Buffer
// =============================================================================

#[derive(Debug, Clone)]
pub struct WindowSettings {
    pub ttl: Duration,
    pub min_sample_threshold: usize,
    pub granularity: Duration,
    /// Further samples for a full bucket are dropped
    pub max_samples_per_bucket: usize,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            min_sample_threshold: 50,
            granularity: Duration::from_secs(60),
            max_samples_per_bucket: 10_000,
        }
    }
}

/// Routing signal for the scoring pass; underflow is not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready { key: BucketKey, count: usize },
    Underflow { count: usize, threshold: usize },
}

pub struct WindowBuffer {
    settings: WindowSettings,
    buckets: RwLock<HashMap<BucketKey, Arc<WindowBucket>>>,
    store: Option<Arc<dyn TtlStore>>,
}

impl WindowBuffer {
    pub fn new(settings: WindowSettings) -> Self {
        Self {
            settings,
            buckets: RwLock::new(HashMap::new()),
            store: None,
        }
    }

    /// Journal every sample to `store` so buckets survive a restart
    pub fn with_store(mut self, store: Arc<dyn TtlStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn settings(&self) -> &WindowSettings {
        &self.settings
    }

    pub async fn ingest(&self, sample: SentimentSample) -> BucketKey {
        self.ingest_at(sample, Utc::now()).await
    }

    /// Append `sample` to the bucket of `now`'s quantum, creating it if needed
    pub async fn ingest_at(&self, sample: SentimentSample, now: DateTime<Utc>) -> BucketKey {
        self.evict_expired_at(now).await;

        let key = BucketKey::for_instant(sample.source_id, now, self.settings.granularity);
        let bucket = self.bucket_for(key, now).await;

        let accepted = {
            let mut samples = bucket.samples.lock().await;
            if samples.len() >= self.settings.max_samples_per_bucket {
                false
            } else {
                samples.push(sample.clone());
                trace!(source = %key.source, count = samples.len(), "[WINDOW] Sample ingested");
                true
            }
        };

        if !accepted {
            debug!(source = %key.source, "[WINDOW] Bucket full - sample dropped");
            return key;
        }

        if let Some(store) = &self.store {
            if let Err(e) = self.journal(store.as_ref(), key, &sample).await {
                warn!(error = %e, key = %key.storage_key(), "[WINDOW] Journal write failed");
            }
        }
        key
    }

    async fn journal(&self, store: &dyn TtlStore, key: BucketKey, sample: &SentimentSample) -> StoreResult<()> {
        let encoded = match serde_json::to_string(sample) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "[WINDOW] Sample not serializable - not journaled");
                return Ok(());
            }
        };
        store
            .list_push(&key.storage_key(), encoded, Some(self.settings.ttl))
            .await
            .map(|_| ())
    }

    async fn bucket_for(&self, key: BucketKey, now: DateTime<Utc>) -> Arc<WindowBucket> {
        if let Some(bucket) = self.buckets.read().await.get(&key) {
            return bucket.clone();
        }
        let mut buckets = self.buckets.write().await;
        buckets
            .entry(key)
            .or_insert_with(|| {
                debug!(source = %key.source, quantum = key.quantum_start, "[WINDOW] Bucket created");
                Arc::new(WindowBucket::new(key, now, self.settings.ttl))
            })
            .clone()
    }

    /// Newest live bucket of `source` at or above the threshold
    pub async fn readiness(&self, source: SourceId, now: DateTime<Utc>) -> Readiness {
        let mut candidates: Vec<Arc<WindowBucket>> = self
            .buckets
            .read()
            .await
            .values()
            .filter(|b| b.key.source == source && !b.is_expired(now))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| b.key.quantum_start.cmp(&a.key.quantum_start));

        let threshold = self.settings.min_sample_threshold;
        let mut newest_count = None;
        for bucket in candidates {
            let count = bucket.len().await;
            newest_count.get_or_insert(count);
            if count >= threshold {
                return Readiness::Ready {
                    key: bucket.key,
                    count,
                };
            }
        }
        Readiness::Underflow {
            count: newest_count.unwrap_or(0),
            threshold,
        }
    }

    pub async fn ready(&self, source: SourceId, now: DateTime<Utc>) -> bool {
        matches!(self.readiness(source, now).await, Readiness::Ready { .. })
    }

    pub async fn drain(&self, key: BucketKey) -> Vec<SentimentSample> {
        self.drain_at(key, Utc::now()).await
    }

    /// Current contents of a live bucket; the bucket keeps its samples
    pub async fn drain_at(&self, key: BucketKey, now: DateTime<Utc>) -> Vec<SentimentSample> {
        let bucket = self.buckets.read().await.get(&key).cloned();
        match bucket {
            Some(bucket) if !bucket.is_expired(now) => bucket.samples.lock().await.clone(),
            _ => Vec::new(),
        }
    }

    pub async fn evict_expired(&self) -> usize {
        self.evict_expired_at(Utc::now()).await
    }

    /// Drop every bucket older than the TTL; returns how many were removed.
    ///
    /// The map-wide write lock is only taken once a bucket has expired.
    pub async fn evict_expired_at(&self, now: DateTime<Utc>) -> usize {
        let any_expired = self.buckets.read().await.values().any(|b| b.is_expired(now));
        if !any_expired {
            return 0;
        }

        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|_, bucket| !bucket.is_expired(now));
        let evicted = before - buckets.len();
        if evicted > 0 {
            debug!(evicted, remaining = buckets.len(), "[WINDOW] Expired buckets evicted");
        }
        evicted
    }

    pub async fn bucket_count(&self) -> usize {
        self.buckets.read().await.len()
    }

    /// Rebuild buckets from the journal; returns the number of samples restored.
    ///
    /// Restored buckets take their quantum start as creation time.
    pub async fn rehydrate(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };

        let mut restored = 0;
        for storage_key in store.keys(WINDOW_KEY_PREFIX).await? {
            let Some(key) = BucketKey::from_storage_key(&storage_key) else {
                warn!(key = %storage_key, "[WINDOW] Unrecognized journal key skipped");
                continue;
            };
            let bucket = WindowBucket::new(key, key.start(), self.settings.ttl);
            if bucket.is_expired(now) {
                continue;
            }

            let samples: Vec<SentimentSample> = store
                .list_range(&storage_key, 0, None)
                .await?
                .iter()
                .filter_map(|raw| serde_json::from_str(raw).ok())
                .collect();
            if samples.is_empty() {
                continue;
            }
            restored += samples.len();
            *bucket.samples.lock().await = samples;
            self.buckets.write().await.insert(key, Arc::new(bucket));
        }

        info!(restored, "[WINDOW] Buckets rehydrated from journal");
        Ok(restored)
    }
}

// =============================================================================
// Window-backed source
// =============================================================================

/// Presents the windowed stream of one source as a SourceAdapter.
///
/// Absent while the window is below threshold; otherwise the ready bucket is
/// drained and scored, weighted by engagement.
pub struct WindowSource {
    source: SourceId,
    window: Arc<WindowBuffer>,
    scorer: Arc<dyn TextScorer>,
    closed: AtomicBool,
}

impl WindowSource {
    pub fn new(source: SourceId, window: Arc<WindowBuffer>, scorer: Arc<dyn TextScorer>) -> Self {
        Self {
            source,
            window,
            scorer,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SourceAdapter for WindowSource {
    fn source_id(&self) -> SourceId {
        self.source
    }

    async fn fetch(&self, _params: &FetchParams) -> SourceScore {
        if self.is_closed() {
            return into_source_score(self.source, Err(SourceError::Closed));
        }
        let now = Utc::now();
        let key = match self.window.readiness(self.source, now).await {
            Readiness::Ready { key, count } => {
                debug!(source = %self.source, count, "[WINDOW] Bucket ready for scoring");
                key
            }
            Readiness::Underflow { count, threshold } => {
                debug!(source = %self.source, count, threshold, "[WINDOW] Below threshold");
                return SourceScore::absent(self.source);
            }
        };

        let items: Vec<(String, f64)> = self
            .window
            .drain_at(key, now)
            .await
            .into_iter()
            .map(|s| {
                let weight = s.engagement_metrics.post_weight();
                (s.text, weight)
            })
            .collect();

        into_source_score(self.source, score_weighted(self.scorer.as_ref(), items).await)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scorer::LexiconScorer;
    use crate::core::store::InMemoryStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn sample(text: &str) -> SentimentSample {
        SentimentSample::new(SourceId::Twitter, text, t0())
    }

    fn secs(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    fn buffer(threshold: usize) -> WindowBuffer {
        WindowBuffer::new(WindowSettings {
            min_sample_threshold: threshold,
            ..WindowSettings::default()
        })
    }

    #[test]
    fn test_bucket_key_quantizes_and_round_trips() {
        let at = t0() + secs(42);
        let key = BucketKey::for_instant(SourceId::Twitter, at, Duration::from_secs(60));
        assert_eq!(key.start(), t0());
        assert_eq!(key.storage_key(), "sentiment:window:twitter:202403011200");
        assert_eq!(BucketKey::from_storage_key(&key.storage_key()), Some(key));
        assert_eq!(BucketKey::from_storage_key("historical_sentiment"), None);
    }

    #[tokio::test]
    async fn test_bucket_present_before_ttl_absent_after() {
        let window = buffer(1);
        let key = window.ingest_at(sample("near"), t0()).await;

        assert_eq!(window.drain_at(key, t0() + secs(299)).await.len(), 1);
        assert!(window.ready(SourceId::Twitter, t0() + secs(299)).await);

        assert!(window.drain_at(key, t0() + secs(301)).await.is_empty());
        assert!(!window.ready(SourceId::Twitter, t0() + secs(301)).await);

        assert_eq!(window.evict_expired_at(t0() + secs(301)).await, 1);
        assert_eq!(window.bucket_count().await, 0);
    }

    #[tokio::test]
    async fn test_ingest_evicts_expired_buckets() {
        let window = buffer(1);
        window.ingest_at(sample("old"), t0()).await;
        window.ingest_at(sample("new"), t0() + secs(400)).await;
        assert_eq!(window.bucket_count().await, 1);
    }

    #[tokio::test]
    async fn test_ingest_into_live_bucket_needs_no_write_lock() {
        let window = buffer(1);
        window.ingest_at(sample("first"), t0()).await;

        // A concurrent reader holds the map; nothing has expired
        let held = window.buckets.read().await;
        let ingest = window.ingest_at(sample("second"), t0() + secs(10));
        let key = tokio::time::timeout(Duration::from_millis(200), ingest)
            .await
            .expect("ingest blocked on the map lock");
        drop(held);

        assert_eq!(window.drain_at(key, t0() + secs(10)).await.len(), 2);
        assert_eq!(window.evict_expired_at(t0() + secs(10)).await, 0);
    }

    #[tokio::test]
    async fn test_threshold_gating() {
        let window = buffer(3);
        for _ in 0..2 {
            window.ingest_at(sample("near"), t0()).await;
        }
        assert_eq!(
            window.readiness(SourceId::Twitter, t0()).await,
            Readiness::Underflow {
                count: 2,
                threshold: 3
            }
        );

        let key = window.ingest_at(sample("near"), t0() + secs(10)).await;
        assert_eq!(
            window.readiness(SourceId::Twitter, t0() + secs(10)).await,
            Readiness::Ready { key, count: 3 }
        );
        // Other sources are unaffected
        assert!(!window.ready(SourceId::Reddit, t0()).await);
    }

    #[tokio::test]
    async fn test_drain_is_not_destructive() {
        let window = buffer(1);
        let key = window.ingest_at(sample("a"), t0()).await;
        assert_eq!(window.drain_at(key, t0()).await.len(), 1);
        window.ingest_at(sample("b"), t0() + secs(5)).await;
        assert_eq!(window.drain_at(key, t0() + secs(5)).await.len(), 2);
    }

    #[tokio::test]
    async fn test_separate_quanta_and_newest_ready_bucket() {
        let window = buffer(2);
        window.ingest_at(sample("a"), t0()).await;
        window.ingest_at(sample("b"), t0()).await;
        window.ingest_at(sample("c"), t0() + secs(60)).await;
        assert_eq!(window.bucket_count().await, 2);

        // Newest bucket has one sample, the previous one meets the threshold
        match window.readiness(SourceId::Twitter, t0() + secs(61)).await {
            Readiness::Ready { key, count } => {
                assert_eq!(key.quantum_start, t0().timestamp());
                assert_eq!(count, 2);
            }
            other => panic!("expected ready, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_bucket_drops_samples() {
        let window = WindowBuffer::new(WindowSettings {
            max_samples_per_bucket: 2,
            ..WindowSettings::default()
        });
        let mut key = None;
        for _ in 0..5 {
            key = Some(window.ingest_at(sample("x"), t0()).await);
        }
        assert_eq!(window.drain_at(key.unwrap(), t0()).await.len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_ingestion() {
        let window = Arc::new(buffer(1));
        let mut handles = Vec::new();
        for source in [SourceId::Twitter, SourceId::Reddit] {
            for _ in 0..4 {
                let window = window.clone();
                handles.push(tokio::spawn(async move {
                    for i in 0..25 {
                        let s = SentimentSample::new(source, format!("post {}", i), t0());
                        window.ingest_at(s, t0()).await;
                    }
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let key = BucketKey::for_instant(SourceId::Twitter, t0(), Duration::from_secs(60));
        assert_eq!(window.drain_at(key, t0()).await.len(), 100);
    }

    #[tokio::test]
    async fn test_journal_and_rehydrate() {
        let store: Arc<dyn TtlStore> = Arc::new(InMemoryStore::new());
        let now = Utc::now();

        let window = buffer(1).with_store(store.clone());
        let key = window.ingest_at(sample("near mainnet"), now).await;
        window.ingest_at(sample("near upgrade"), now).await;
        assert_eq!(store.list_len(&key.storage_key()).await.unwrap(), 2);

        let restarted = buffer(1).with_store(store);
        assert_eq!(restarted.rehydrate(now).await.unwrap(), 2);
        let texts: Vec<String> = restarted
            .drain_at(key, now)
            .await
            .into_iter()
            .map(|s| s.text)
            .collect();
        assert_eq!(texts, vec!["near mainnet", "near upgrade"]);
    }

    #[tokio::test]
    async fn test_window_source_scores_ready_bucket() {
        let window = Arc::new(buffer(2));
        let source = WindowSource::new(SourceId::Twitter, window.clone(), Arc::new(LexiconScorer::new()));
        let params = FetchParams::default();

        window.ingest(sample("NEAR mainnet upgrade")).await;
        assert!(!source.fetch(&params).await.is_present());

        window.ingest(sample("NEAR validator set rotated")).await;
        let score = source.fetch(&params).await;
        assert!((score.value().unwrap() - 0.65).abs() < 1e-9);

        source.close().await;
        assert!(!source.fetch(&params).await.is_present());
    }
}
