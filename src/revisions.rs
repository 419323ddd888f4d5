//! Revision count resolution.
//!
//! The ranker asks how many versions a paper has. The answer comes from an external
//! service, so every failure (missing id, network error, bad status, malformed body,
//! timeout) collapses to [`NEUTRAL_REVISION_COUNT`] here and never reaches the scorer.

use crate::config::LookupConfig;
use crate::error::Result;
use crate::model::PaperRecord;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Revision count assumed when a lookup is impossible or fails ("no extra signal").
pub const NEUTRAL_REVISION_COUNT: u32 = 1;

/// An external service that knows how many revisions a paper has.
pub trait RevisionSource {
    fn revision_count(&self, external_id: &str) -> impl Future<Output = Result<u32>> + Send;
}

/// Synchronous view of resolved revision counts, consumed by the ranker.
pub trait RevisionLookup {
    fn revisions_for(&self, record: &PaperRecord) -> u32;
}

/// Lookup that always answers with the neutral default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRevisions;

impl RevisionLookup for NoRevisions {
    fn revisions_for(&self, _record: &PaperRecord) -> u32 {
        NEUTRAL_REVISION_COUNT
    }
}

/// Revision counts keyed by external id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RevisionTable {
    counts: HashMap<String, u32>,
}

impl RevisionTable {
    pub fn get(&self, external_id: &str) -> u32 {
        self.counts
            .get(external_id)
            .copied()
            .unwrap_or(NEUTRAL_REVISION_COUNT)
    }

    pub fn insert(&mut self, external_id: impl Into<String>, count: u32) {
        self.counts.insert(external_id.into(), count);
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl From<HashMap<String, u32>> for RevisionTable {
    fn from(counts: HashMap<String, u32>) -> Self {
        Self { counts }
    }
}

impl RevisionLookup for RevisionTable {
    fn revisions_for(&self, record: &PaperRecord) -> u32 {
        record
            .external_id
            .as_deref()
            .map(|id| self.get(id))
            .unwrap_or(NEUTRAL_REVISION_COUNT)
    }
}

/// Resolves revision counts for a batch with bounded concurrency, spacing and timeouts.
pub struct RevisionResolver<S> {
    source: S,
    concurrency: usize,
    min_interval: Duration,
    timeout: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl<S: RevisionSource + Sync> RevisionResolver<S> {
    pub fn new(source: S, concurrency: usize, min_interval: Duration, timeout: Duration) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
            min_interval,
            timeout,
            last_request: Mutex::new(None),
        }
    }

    pub fn from_config(source: S, config: &LookupConfig) -> Self {
        Self::new(
            source,
            config.concurrency,
            Duration::from_millis(config.min_interval_ms),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Resolve every distinct external id in `records`. Never fails.
    pub async fn resolve(&self, records: &[PaperRecord]) -> RevisionTable {
        let mut seen = HashSet::new();
        let ids: Vec<&str> = records
            .iter()
            .filter_map(|r| r.external_id.as_deref())
            .filter(|id| !id.trim().is_empty() && seen.insert(*id))
            .collect();

        if ids.is_empty() {
            return RevisionTable::default();
        }

        info!(
            count = ids.len(),
            concurrency = self.concurrency,
            "Resolving revision counts"
        );

        let counts: Vec<(String, u32)> = stream::iter(ids)
            .map(|id| async move { (id.to_string(), self.resolve_one(id).await) })
            .buffered(self.concurrency)
            .collect()
            .await;

        let revised = counts.iter().filter(|(_, c)| *c > 1).count();
        info!(
            resolved = counts.len(),
            revised = revised,
            "Revision lookup complete"
        );

        RevisionTable::from(counts.into_iter().collect::<HashMap<_, _>>())
    }

    /// Resolve one id, mapping every failure to the neutral default.
    pub async fn resolve_one(&self, external_id: &str) -> u32 {
        if external_id.trim().is_empty() {
            return NEUTRAL_REVISION_COUNT;
        }

        self.wait_for_rate_limit().await;

        match tokio::time::timeout(self.timeout, self.source.revision_count(external_id)).await {
            Ok(Ok(count)) if count >= 1 => {
                debug!(id = external_id, count = count, "Revision count resolved");
                count
            }
            Ok(Ok(count)) => {
                warn!(id = external_id, count = count, "Implausible revision count");
                NEUTRAL_REVISION_COUNT
            }
            Ok(Err(e)) => {
                warn!(id = external_id, error = %e, "Revision lookup failed");
                NEUTRAL_REVISION_COUNT
            }
            Err(_) => {
                warn!(
                    id = external_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Revision lookup timed out"
                );
                NEUTRAL_REVISION_COUNT
            }
        }
    }

    /// Space request starts at least `min_interval` apart across all workers.
    async fn wait_for_rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PaperRankError;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSource {
        calls: AtomicUsize,
    }

    impl FakeSource {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl RevisionSource for FakeSource {
        async fn revision_count(&self, external_id: &str) -> Result<u32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match external_id {
                "2401.00001" => Ok(3),
                "2401.00002" => Ok(1),
                "zero" => Ok(0),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(9)
                }
                _ => Err(PaperRankError::Api {
                    code: 503,
                    message: "unavailable".to_string(),
                }),
            }
        }
    }

    fn record(id: Option<&str>) -> PaperRecord {
        let mut r = PaperRecord::new("t", "", vec![], Utc::now(), Utc::now());
        r.external_id = id.map(str::to_string);
        r
    }

    fn resolver() -> RevisionResolver<FakeSource> {
        RevisionResolver::new(
            FakeSource::new(),
            2,
            Duration::ZERO,
            Duration::from_millis(50),
        )
    }

    #[tokio::test]
    async fn test_failures_degrade_to_neutral() {
        let resolver = resolver();
        assert_eq!(resolver.resolve_one("2401.00001").await, 3);
        assert_eq!(resolver.resolve_one("broken").await, NEUTRAL_REVISION_COUNT);
        assert_eq!(resolver.resolve_one("zero").await, NEUTRAL_REVISION_COUNT);
        assert_eq!(resolver.resolve_one("").await, NEUTRAL_REVISION_COUNT);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_neutral() {
        let resolver = resolver();
        let started = std::time::Instant::now();
        assert_eq!(resolver.resolve_one("slow").await, NEUTRAL_REVISION_COUNT);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_resolve_batch_dedupes_ids() {
        let resolver = resolver();
        let records = vec![
            record(Some("2401.00001")),
            record(Some("2401.00002")),
            record(Some("2401.00001")),
            record(Some("broken")),
            record(None),
        ];

        let table = resolver.resolve(&records).await;
        assert_eq!(resolver.source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(table.len(), 3);
        assert_eq!(table.revisions_for(&records[0]), 3);
        assert_eq!(table.revisions_for(&records[1]), 1);
        assert_eq!(table.revisions_for(&records[3]), NEUTRAL_REVISION_COUNT);
        assert_eq!(table.revisions_for(&records[4]), NEUTRAL_REVISION_COUNT);
    }

    #[tokio::test]
    async fn test_resolve_empty_batch() {
        let table = resolver().resolve(&[record(None)]).await;
        assert!(table.is_empty());
    }

    #[test]
    fn test_no_revisions_is_neutral() {
        assert_eq!(NoRevisions.revisions_for(&record(Some("x"))), NEUTRAL_REVISION_COUNT);
        assert_eq!(NEUTRAL_REVISION_COUNT, 1);
    }
}
