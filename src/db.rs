//! The central database handle.
//!
//! [`Tsdb`] owns the write path, the three UID resolvers, the compaction
//! scheduler, and the flush/shutdown lifecycle. It is safe to share behind
//! an `Arc` and call from any number of tasks concurrently.

use crate::codec::RowCodec;
use crate::compaction::{CompactionScheduler, Compactor, SortedMergeCompactor};
use crate::core::{validate_uid_name, Config, Result, Uid, UidKind, WindrowError};
use crate::stats::{LatencyHistogram, StatsCollector};
use crate::storage::StorageBackend;
use crate::uid::{UidResolver, DEFAULT_SUGGEST_LIMIT};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Column family time series cells are stored under in the data table.
pub const DATA_FAMILY: &[u8] = b"t";

enum PointValue {
    Long(i64),
    Float(f32),
}

impl PointValue {
    /// Big-endian cell bytes plus the representation the qualifier encodes.
    fn encode(&self) -> (Bytes, bool, usize) {
        match *self {
            PointValue::Long(v) => (Bytes::copy_from_slice(&v.to_be_bytes()), false, 8),
            PointValue::Float(v) => {
                (Bytes::copy_from_slice(&v.to_bits().to_be_bytes()), true, 4)
            },
        }
    }
}

/// Thread-safe handle to one time series database instance.
pub struct Tsdb {
    config: Config,
    store: Arc<dyn StorageBackend>,
    codec: RowCodec,
    metrics: UidResolver,
    tag_keys: UidResolver,
    tag_values: UidResolver,
    compaction: CompactionScheduler,
    put_latency: LatencyHistogram,
    shutdown_started: AtomicBool,
}

impl Tsdb {
    /// Opens a database instance over the given store.
    ///
    /// UID widths and table names are fixed from `config` for the lifetime
    /// of the instance.
    pub fn open(config: Config, store: Arc<dyn StorageBackend>) -> Result<Self> {
        Self::open_with_compactor(config, store, Arc::new(SortedMergeCompactor))
    }

    /// Opens a database instance with a custom compaction merge algorithm.
    pub fn open_with_compactor(
        config: Config,
        store: Arc<dyn StorageBackend>,
        compactor: Arc<dyn Compactor>,
    ) -> Result<Self> {
        config.validate()?;
        let codec = RowCodec::new(&config.uid);
        let uid_table = config.storage.uid_table.clone();
        let metrics = UidResolver::new(
            UidKind::Metric,
            config.uid.metric_width,
            uid_table.clone(),
            store.clone(),
        );
        let tag_keys = UidResolver::new(
            UidKind::TagKey,
            config.uid.tag_key_width,
            uid_table.clone(),
            store.clone(),
        );
        let tag_values = UidResolver::new(
            UidKind::TagValue,
            config.uid.tag_value_width,
            uid_table,
            store.clone(),
        );
        let compaction = CompactionScheduler::new(
            config.compaction.enabled,
            config.storage.data_table.clone(),
            Bytes::from_static(DATA_FAMILY),
            store.clone(),
            compactor,
        );
        debug!(
            data_table = %config.storage.data_table,
            uid_table = %config.storage.uid_table,
            compaction = config.compaction.enabled,
            "opened database instance"
        );
        Ok(Self {
            config,
            store,
            codec,
            metrics,
            tag_keys,
            tag_values,
            compaction,
            put_latency: LatencyHistogram::new(),
            shutdown_started: AtomicBool::new(false),
        })
    }

    /// The configuration this instance was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The row-key and qualifier codec of this instance.
    pub fn codec(&self) -> &RowCodec {
        &self.codec
    }

    // ---------- //
    // Write path //
    // ---------- //

    /// Adds a single integer-valued data point.
    ///
    /// `timestamp` is in seconds and must fit in an unsigned 32-bit
    /// quantity; `tags` must be non-empty. Timestamps are not required to
    /// arrive in order per series. The row is marked for later compaction
    /// review whether or not the write succeeds.
    pub async fn add_point(
        &self,
        metric: &str,
        timestamp: i64,
        value: i64,
        tags: &HashMap<String, String>,
    ) -> Result<()> {
        self.add_point_internal(metric, timestamp, PointValue::Long(value), tags)
            .await
    }

    /// Adds a single floating-point data point.
    ///
    /// NaN and infinite values are rejected before anything is written.
    pub async fn add_point_float(
        &self,
        metric: &str,
        timestamp: i64,
        value: f32,
        tags: &HashMap<String, String>,
    ) -> Result<()> {
        self.add_point_internal(metric, timestamp, PointValue::Float(value), tags)
            .await
    }

    async fn add_point_internal(
        &self,
        metric: &str,
        timestamp: i64,
        value: PointValue,
        tags: &HashMap<String, String>,
    ) -> Result<()> {
        Self::check_metric_and_tags(metric, tags)?;
        if !(0..=i64::from(u32::MAX)).contains(&timestamp) {
            return Err(WindrowError::InvalidTimestamp(timestamp));
        }
        if let PointValue::Float(v) = &value {
            if !v.is_finite() {
                return Err(WindrowError::invalid_value(format!(
                    "value is NaN or Infinite: {} for metric={} timestamp={}",
                    v, metric, timestamp
                )));
            }
        }

        let metric_uid = self.metrics.get_or_create(metric).await?;
        let mut tag_uids = Vec::with_capacity(tags.len());
        for (key, val) in tags {
            let tagk = self.tag_keys.get_or_create(key).await?;
            let tagv = self.tag_values.get_or_create(val).await?;
            tag_uids.push((tagk, tagv));
        }

        let timestamp = timestamp as u32;
        let base_time = RowCodec::base_time(timestamp);
        let row = self.codec.row_key(&metric_uid, base_time, &tag_uids);
        // Scheduling is local bookkeeping; it must not wait on the write.
        self.compaction.schedule(&row);

        let (value_bytes, is_float, value_len) = value.encode();
        let qualifier = RowCodec::qualifier(timestamp - base_time, is_float, value_len)?;

        let start = Instant::now();
        let result = self
            .store
            .put(
                &self.config.storage.data_table,
                &row,
                DATA_FAMILY,
                &qualifier,
                value_bytes,
            )
            .await;
        self.put_latency.record(start.elapsed());
        result
    }

    fn check_metric_and_tags(metric: &str, tags: &HashMap<String, String>) -> Result<()> {
        validate_uid_name("metric", metric)?;
        if tags.is_empty() {
            return Err(WindrowError::InvalidName {
                field: "tag set",
                name: String::new(),
            });
        }
        for (key, value) in tags {
            validate_uid_name("tag key", key)?;
            validate_uid_name("tag value", value)?;
        }
        Ok(())
    }

    // --------- //
    // Lifecycle //
    // --------- //

    /// Forces a flush of any un-committed in-memory data to the store.
    pub async fn flush(&self) -> Result<()> {
        self.store.flush().await
    }

    /// Gracefully shuts down this instance.
    ///
    /// With compaction enabled, the compaction queue is drained first; every
    /// row that fails to compact is logged and none of them prevents the
    /// store from shutting down. The store's shutdown runs exactly once per
    /// instance; repeat calls return immediately.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shutdown_started.swap(true, Ordering::AcqRel) {
            debug!("shutdown already performed");
            return Ok(());
        }
        if self.compaction.enabled() {
            if let Err(e) = self.compaction.flush().await {
                let failures = e.partial_failures();
                if failures.is_empty() {
                    error!(error = %e, "failed to flush the compaction queue");
                } else {
                    for failure in failures {
                        error!(error = %failure, "failed to flush the compaction queue");
                    }
                }
            }
        }
        self.store.shutdown().await
    }

    // ----------- //
    // UID surface //
    // ----------- //

    fn resolver(&self, kind: UidKind) -> &UidResolver {
        match kind {
            UidKind::Metric => &self.metrics,
            UidKind::TagKey => &self.tag_keys,
            UidKind::TagValue => &self.tag_values,
        }
    }

    /// Finds the UID assigned to a name, for the given kind.
    pub async fn uid_id(&self, kind: UidKind, name: &str) -> Result<Uid> {
        if name.is_empty() {
            return Err(WindrowError::InvalidName {
                field: "uid name",
                name: String::new(),
            });
        }
        self.resolver(kind).id(name).await
    }

    /// Finds the name a UID was assigned to, for the given kind.
    pub async fn uid_name(&self, kind: UidKind, uid: &Uid) -> Result<String> {
        self.resolver(kind).name(uid).await
    }

    /// Assigns a UID to a new name, dispatched by external kind token.
    ///
    /// The token is matched case-insensitively against `metric`, `tagk`,
    /// and `tagv`. A name that already has a UID is rejected with an error
    /// carrying that UID.
    pub async fn assign_uid(&self, kind_token: &str, name: &str) -> Result<Uid> {
        let kind = match UidKind::parse_token(kind_token) {
            Ok(kind) => kind,
            Err(e) => {
                warn!(token = kind_token, "unknown UID type");
                return Err(e);
            },
        };
        validate_uid_name(kind.token(), name)?;
        let resolver = self.resolver(kind);
        match resolver.id(name).await {
            Ok(uid) => Err(WindrowError::NameAlreadyExists {
                name: name.to_string(),
                uid: uid.to_string(),
            }),
            Err(WindrowError::NameNotFound { .. }) => resolver.get_or_create(name).await,
            Err(e) => Err(e),
        }
    }

    /// Returns a few metric names starting with `prefix`.
    pub async fn suggest_metrics(&self, prefix: &str) -> Result<Vec<String>> {
        self.metrics.suggest(prefix, DEFAULT_SUGGEST_LIMIT).await
    }

    /// Returns up to `max` metric names starting with `prefix`.
    pub async fn suggest_metrics_max(&self, prefix: &str, max: usize) -> Result<Vec<String>> {
        self.metrics.suggest(prefix, max).await
    }

    /// Returns a few tag keys starting with `prefix`.
    pub async fn suggest_tag_keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.tag_keys.suggest(prefix, DEFAULT_SUGGEST_LIMIT).await
    }

    /// Returns up to `max` tag keys starting with `prefix`.
    pub async fn suggest_tag_keys_max(&self, prefix: &str, max: usize) -> Result<Vec<String>> {
        self.tag_keys.suggest(prefix, max).await
    }

    /// Returns a few tag values starting with `prefix`.
    pub async fn suggest_tag_values(&self, prefix: &str) -> Result<Vec<String>> {
        self.tag_values.suggest(prefix, DEFAULT_SUGGEST_LIMIT).await
    }

    /// Returns up to `max` tag values starting with `prefix`.
    pub async fn suggest_tag_values_max(&self, prefix: &str, max: usize) -> Result<Vec<String>> {
        self.tag_values.suggest(prefix, max).await
    }

    /// Discards all in-memory UID caches.
    pub fn drop_caches(&self) {
        self.metrics.drop_caches();
        self.tag_keys.drop_caches();
        self.tag_values.drop_caches();
    }

    // ----- //
    // Stats //
    // ----- //

    /// Number of cache hits during lookups involving UIDs.
    pub fn uid_cache_hits(&self) -> u64 {
        self.metrics.cache_hits() + self.tag_keys.cache_hits() + self.tag_values.cache_hits()
    }

    /// Number of cache misses during lookups involving UIDs.
    pub fn uid_cache_misses(&self) -> u64 {
        self.metrics.cache_misses() + self.tag_keys.cache_misses() + self.tag_values.cache_misses()
    }

    /// Number of cache entries currently resident for UID lookups.
    pub fn uid_cache_size(&self) -> usize {
        self.metrics.cache_size() + self.tag_keys.cache_size() + self.tag_values.cache_size()
    }

    /// Number of rows currently pending compaction.
    pub fn pending_compactions(&self) -> usize {
        self.compaction.len()
    }

    /// The write-latency histogram.
    pub fn put_latency(&self) -> &LatencyHistogram {
        &self.put_latency
    }

    /// Records the stats tracked by this instance into `collector`.
    pub fn collect_stats(&self, collector: &mut StatsCollector) {
        for resolver in [&self.metrics, &self.tag_keys, &self.tag_values] {
            let kind = resolver.kind().token();
            collector.record_tagged("uid.cache-hit", resolver.cache_hits(), ("kind", kind));
            collector.record_tagged("uid.cache-miss", resolver.cache_misses(), ("kind", kind));
            collector.record_tagged(
                "uid.cache-size",
                resolver.cache_size() as u64,
                ("kind", kind),
            );
        }

        collector.add_extra_tag("class", "WritePath");
        collector.record("put.count", self.put_latency.count());
        for (label, q) in [("p50", 0.5), ("p95", 0.95), ("p99", 0.99)] {
            if let Some(ms) = self.put_latency.quantile_ms(q) {
                collector.record_tagged("put.latency", ms.round() as u64, ("quantile", label));
            }
        }
        collector.clear_extra_tag("class");

        collector.record("compaction.pending", self.compaction.len() as u64);
        collector.record("compaction.scheduled", self.compaction.rows_scheduled());
        collector.record("compaction.compacted", self.compaction.rows_compacted());
        collector.record("compaction.failed", self.compaction.rows_failed());
    }
}
