//! Operational statistics collection.
//!
//! A [`StatsCollector`] buffers named gauge records with optional tags; the
//! database walks its subsystems and records UID cache counters, write
//! latency quantiles, and compaction-queue gauges into it. The write-latency
//! sketch is a constant-memory CKMS quantile estimator.

use parking_lot::Mutex;
use quantiles::ckms::CKMS;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// One recorded statistic.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsEntry {
    /// Statistic name.
    pub name: String,
    /// Recorded value.
    pub value: u64,
    /// Tags attached to the record, in insertion order.
    pub tags: Vec<(String, String)>,
}

/// Buffers statistics records during a collection pass.
#[derive(Debug, Default)]
pub struct StatsCollector {
    entries: Vec<StatsEntry>,
    extra_tags: Vec<(String, String)>,
}

impl StatsCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a value with no tag beyond the scoped extras.
    pub fn record(&mut self, name: &str, value: u64) {
        self.entries.push(StatsEntry {
            name: name.to_string(),
            value,
            tags: self.extra_tags.clone(),
        });
    }

    /// Records a value with one extra tag.
    pub fn record_tagged(&mut self, name: &str, value: u64, tag: (&str, &str)) {
        let mut tags = self.extra_tags.clone();
        tags.push((tag.0.to_string(), tag.1.to_string()));
        self.entries.push(StatsEntry {
            name: name.to_string(),
            value,
            tags,
        });
    }

    /// Attaches a tag to every subsequent record until cleared.
    pub fn add_extra_tag(&mut self, key: &str, value: &str) {
        self.extra_tags.push((key.to_string(), value.to_string()));
    }

    /// Removes a previously attached extra tag.
    pub fn clear_extra_tag(&mut self, key: &str) {
        self.extra_tags.retain(|(k, _)| k != key);
    }

    /// Everything recorded so far.
    pub fn entries(&self) -> &[StatsEntry] {
        &self.entries
    }
}

/// Constant-memory latency sketch for write timing.
pub struct LatencyHistogram {
    sketch: Mutex<CKMS<f64>>,
    count: AtomicU64,
}

impl LatencyHistogram {
    /// Creates a histogram with 0.1% rank error.
    pub fn new() -> Self {
        Self {
            sketch: Mutex::new(CKMS::new(0.001)),
            count: AtomicU64::new(0),
        }
    }

    /// Records one latency sample.
    pub fn record(&self, latency: Duration) {
        self.sketch.lock().insert(latency.as_secs_f64() * 1000.0);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// The latency at quantile `q` in milliseconds, if any samples exist.
    pub fn quantile_ms(&self, q: f64) -> Option<f64> {
        self.sketch.lock().query(q).map(|(_, value)| value)
    }

    /// Number of samples recorded.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_records_with_tags() {
        let mut collector = StatsCollector::new();
        collector.record("uid.cache-size", 12);
        collector.record_tagged("uid.cache-hit", 7, ("kind", "metric"));

        collector.add_extra_tag("class", "writer");
        collector.record("latency.count", 3);
        collector.clear_extra_tag("class");
        collector.record("plain", 1);

        let entries = collector.entries();
        assert_eq!(entries.len(), 4);
        assert!(entries[0].tags.is_empty());
        assert_eq!(entries[1].tags, vec![("kind".to_string(), "metric".to_string())]);
        assert_eq!(entries[2].tags, vec![("class".to_string(), "writer".to_string())]);
        assert!(entries[3].tags.is_empty());
    }

    #[test]
    fn test_histogram_quantiles() {
        let histogram = LatencyHistogram::new();
        assert_eq!(histogram.quantile_ms(0.5), None);

        for ms in 1..=100u64 {
            histogram.record(Duration::from_millis(ms));
        }
        assert_eq!(histogram.count(), 100);

        let p50 = histogram.quantile_ms(0.5).unwrap();
        let p99 = histogram.quantile_ms(0.99).unwrap();
        assert!(p50 >= 45.0 && p50 <= 55.0, "p50 was {}", p50);
        assert!(p99 >= p50);
    }
}
