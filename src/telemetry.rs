//! Query performance accounting: totals, running average latency, cache
//! hit/miss counters, and a bounded ring of slow-query records.

use crate::query::SqlParam;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of slow-query records retained, oldest trimmed first.
const SLOW_QUERY_CAPACITY: usize = 100;

/// One execution that exceeded the slow-query threshold.
#[derive(Debug, Clone, Serialize)]
pub struct SlowQuery {
    pub sql: String,
    pub params: Vec<SqlParam>,
    pub duration_ms: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Snapshot of the recorder, embedded in [`crate::PoolStats`].
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceSnapshot {
    pub total_queries: u64,
    pub average_query_time_ms: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub slow_queries: Vec<SlowQuery>,
}

/// In-process recorder. No persistence; resets on restart or [`reset`].
///
/// [`reset`]: PerformanceRecorder::reset
#[derive(Default)]
pub(crate) struct PerformanceRecorder {
    total_queries: AtomicU64,
    total_query_micros: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    slow_queries: RwLock<VecDeque<SlowQuery>>,
}

impl PerformanceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_query(&self, elapsed: Duration) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
        self.total_query_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn record_slow_query(&self, sql: &str, params: &[SqlParam], elapsed: Duration) {
        let record = SlowQuery {
            sql: sql.to_string(),
            params: params.to_vec(),
            duration_ms: elapsed.as_millis() as u64,
            recorded_at: Utc::now(),
        };

        let mut ring = self.slow_queries.write().await;
        ring.push_back(record);
        while ring.len() > SLOW_QUERY_CAPACITY {
            ring.pop_front();
        }
    }

    pub async fn snapshot(&self) -> PerformanceSnapshot {
        let total_queries = self.total_queries.load(Ordering::Relaxed);
        let total_micros = self.total_query_micros.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        let cache_misses = self.cache_misses.load(Ordering::Relaxed);

        let average_query_time_ms = if total_queries > 0 {
            total_micros as f64 / total_queries as f64 / 1000.0
        } else {
            0.0
        };
        let cache_hit_rate = if cache_hits + cache_misses > 0 {
            cache_hits as f64 / (cache_hits + cache_misses) as f64
        } else {
            0.0
        };

        PerformanceSnapshot {
            total_queries,
            average_query_time_ms,
            cache_hits,
            cache_misses,
            cache_hit_rate,
            slow_queries: self.slow_queries.read().await.iter().cloned().collect(),
        }
    }

    pub async fn reset(&self) {
        self.total_queries.store(0, Ordering::Relaxed);
        self.total_query_micros.store(0, Ordering::Relaxed);
        self.cache_hits.store(0, Ordering::Relaxed);
        self.cache_misses.store(0, Ordering::Relaxed);
        self.slow_queries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn averages_query_latency() {
        let recorder = PerformanceRecorder::new();
        recorder.record_query(Duration::from_millis(10));
        recorder.record_query(Duration::from_millis(30));

        let snapshot = recorder.snapshot().await;
        assert_eq!(snapshot.total_queries, 2);
        assert!((snapshot.average_query_time_ms - 20.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn computes_cache_hit_rate() {
        let recorder = PerformanceRecorder::new();
        recorder.record_cache_hit();
        recorder.record_cache_miss();
        recorder.record_cache_miss();
        recorder.record_cache_miss();

        let snapshot = recorder.snapshot().await;
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.cache_misses, 3);
        assert!((snapshot.cache_hit_rate - 0.25).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn slow_query_ring_trims_oldest() {
        let recorder = PerformanceRecorder::new();
        for i in 0..(SLOW_QUERY_CAPACITY + 5) {
            recorder
                .record_slow_query(
                    &format!("SELECT {i}"),
                    &[],
                    Duration::from_millis(1500),
                )
                .await;
        }

        let snapshot = recorder.snapshot().await;
        assert_eq!(snapshot.slow_queries.len(), SLOW_QUERY_CAPACITY);
        assert_eq!(snapshot.slow_queries[0].sql, "SELECT 5");
    }

    #[tokio::test]
    async fn reset_zeroes_everything() {
        let recorder = PerformanceRecorder::new();
        recorder.record_query(Duration::from_millis(5));
        recorder.record_cache_hit();
        recorder
            .record_slow_query("SELECT 1", &[], Duration::from_secs(2))
            .await;

        recorder.reset().await;

        let snapshot = recorder.snapshot().await;
        assert_eq!(snapshot.total_queries, 0);
        assert_eq!(snapshot.cache_hits, 0);
        assert_eq!(snapshot.average_query_time_ms, 0.0);
        assert!(snapshot.slow_queries.is_empty());
    }
}
