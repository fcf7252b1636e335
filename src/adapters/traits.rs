//! Source adapter trait definition
//!
//! The SourceAdapter trait defines the common interface that all
//! sentiment providers must implement.

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::adapters::errors::{SourceError, SourceResult};
use crate::adapters::types::{FetchParams, SourceId, SourceScore};

/// Common trait for all sentiment source adapters
///
/// `fetch` never fails: ordinary network or API failures are logged and
/// reported as `Reading::Absent`, so one adapter can never prevent the
/// others from contributing to a round.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Provider identifier used for weights and reliability lookups
    fn source_id(&self) -> SourceId;

    /// Collect raw data and return a normalized score in [0,1] or absence
    async fn fetch(&self, params: &FetchParams) -> SourceScore;

    /// Release held connections; later fetches report absence
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// Map an internal collection result onto the adapter contract.
///
/// `NoData` is logged at debug (nothing relevant was posted), everything
/// else at warn.
pub fn into_source_score(source: SourceId, result: SourceResult<f64>) -> SourceScore {
    match result {
        Ok(value) => {
            debug!(source = %source, score = value, "[SOURCE] Score collected");
            SourceScore::present(source, value)
        }
        Err(SourceError::NoData) => {
            debug!(source = %source, "[SOURCE] No relevant items - absent");
            SourceScore::absent(source)
        }
        Err(e) => {
            warn!(source = %source, error = %e, "[SOURCE] Unavailable - treating as absent");
            SourceScore::absent(source)
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scriptable in-memory source for unit tests
    pub struct MockSource {
        source: SourceId,
        readings: Mutex<Vec<Option<f64>>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
        closed: AtomicBool,
    }

    impl MockSource {
        pub fn new(source: SourceId, value: Option<f64>) -> Self {
            Self {
                source,
                readings: Mutex::new(vec![value]),
                delay: None,
                calls: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }
        }

        /// Successive fetches return these values; the last one repeats
        pub fn sequence(source: SourceId, values: Vec<Option<f64>>) -> Self {
            let mut mock = Self::new(source, None);
            mock.readings = Mutex::new(values);
            mock
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SourceAdapter for MockSource {
        fn source_id(&self) -> SourceId {
            self.source
        }

        async fn fetch(&self, _params: &FetchParams) -> SourceScore {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.is_closed() {
                return SourceScore::absent(self.source);
            }
            let value = {
                let readings = self.readings.lock().unwrap();
                let idx = call.min(readings.len().saturating_sub(1));
                readings.get(idx).copied().flatten()
            };
            match value {
                Some(v) => SourceScore::present(self.source, v),
                None => SourceScore::absent(self.source),
            }
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_mock_sequence_repeats_last() {
        let mock = MockSource::sequence(SourceId::Twitter, vec![Some(0.2), None]);
        let params = FetchParams::default();
        assert_eq!(mock.fetch(&params).await.value(), Some(0.2));
        assert_eq!(mock.fetch(&params).await.value(), None);
        assert_eq!(mock.fetch(&params).await.value(), None);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_closed_mock_is_absent() {
        let mock = MockSource::new(SourceId::Reddit, Some(0.7));
        mock.close().await;
        assert!(!mock.fetch(&FetchParams::default()).await.is_present());
    }

    #[test]
    fn test_into_source_score_maps_errors_to_absent() {
        let score = into_source_score(SourceId::Santiment, Err(SourceError::Timeout(100)));
        assert!(!score.is_present());
        let score = into_source_score(SourceId::Santiment, Err(SourceError::NoData));
        assert!(!score.is_present());
        let score = into_source_score(SourceId::Santiment, Ok(0.42));
        assert_eq!(score.value(), Some(0.42));
    }
}
