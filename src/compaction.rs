//! Compaction scheduling.
//!
//! Every write marks its row for later compaction review. Rows sit in a
//! lock-free pending set (duplicate scheduling collapses to one entry) until
//! [`CompactionScheduler::flush`] drains them: each row is read back, merged
//! into a single cell through the [`Compactor`] seam, and the per-sample
//! cells are deleted. Per-row failures never stop the drain; they are
//! aggregated into one `PartialFlush` error.

use crate::core::{Result, WindrowError};
use crate::storage::{Cell, StorageBackend};
use bytes::Bytes;
use dashmap::DashSet;
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Merge algorithm applied to all data cells of one row.
pub trait Compactor: Send + Sync {
    /// Returns the single cell representing every sample in `cells`, or
    /// `None` to leave the row untouched. Must be deterministic.
    fn compact(&self, row: &[u8], cells: &[Cell]) -> Result<Option<Cell>>;
}

/// Default merge: cells sorted by qualifier, qualifier bytes concatenated,
/// then value bytes concatenated, preserving every logical sample.
#[derive(Debug, Default)]
pub struct SortedMergeCompactor;

impl Compactor for SortedMergeCompactor {
    fn compact(&self, _row: &[u8], cells: &[Cell]) -> Result<Option<Cell>> {
        if cells.len() < 2 {
            return Ok(None);
        }
        let mut sorted: Vec<&Cell> = cells.iter().collect();
        sorted.sort_by(|a, b| a.qualifier.cmp(&b.qualifier));

        let mut qualifier = Vec::with_capacity(sorted.iter().map(|c| c.qualifier.len()).sum());
        let mut value = Vec::with_capacity(sorted.iter().map(|c| c.value.len()).sum());
        for cell in sorted {
            qualifier.extend_from_slice(&cell.qualifier);
            value.extend_from_slice(&cell.value);
        }
        Ok(Some(Cell::new(cells[0].family.clone(), qualifier, value)))
    }
}

/// Tracks rows that need compaction and drains them on demand.
pub struct CompactionScheduler {
    enabled: bool,
    table: String,
    family: Bytes,
    store: Arc<dyn StorageBackend>,
    compactor: Arc<dyn Compactor>,
    pending: DashSet<Bytes>,
    scheduled: AtomicU64,
    compacted: AtomicU64,
    failed: AtomicU64,
}

impl CompactionScheduler {
    /// Creates a scheduler draining into `table` under the given data family.
    pub fn new(
        enabled: bool,
        table: String,
        family: Bytes,
        store: Arc<dyn StorageBackend>,
        compactor: Arc<dyn Compactor>,
    ) -> Self {
        Self {
            enabled,
            table,
            family,
            store,
            compactor,
            pending: DashSet::new(),
            scheduled: AtomicU64::new(0),
            compacted: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Whether compaction is enabled for this instance.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Marks a row for later compaction review.
    ///
    /// Never blocks the write path: a no-op when compaction is disabled,
    /// otherwise a lock-free insert into the pending set. Scheduling the
    /// same row twice before it is processed collapses to one entry.
    pub fn schedule(&self, row: &[u8]) {
        if !self.enabled {
            return;
        }
        if self.pending.insert(Bytes::copy_from_slice(row)) {
            self.scheduled.fetch_add(1, Ordering::Relaxed);
            trace!(row_len = row.len(), "row scheduled for compaction");
        }
    }

    /// Number of rows currently pending.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the pending set is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total rows ever scheduled (after dedup).
    pub fn rows_scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    /// Total rows rewritten into a compacted cell.
    pub fn rows_compacted(&self) -> u64 {
        self.compacted.load(Ordering::Relaxed)
    }

    /// Total rows that failed to flush.
    pub fn rows_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Merges all data cells of one row through the configured algorithm.
    pub fn compact(&self, row: &[u8], cells: &[Cell]) -> Result<Option<Cell>> {
        self.compactor.compact(row, cells)
    }

    /// Drains every pending row through compaction.
    ///
    /// Rows flush concurrently; a failing row is recorded and the drain
    /// continues. Returns `PartialFlush` carrying every per-row failure if
    /// any row failed.
    pub async fn flush(&self) -> Result<()> {
        let rows: Vec<Bytes> = self.pending.iter().map(|row| row.key().clone()).collect();
        for row in &rows {
            self.pending.remove(row);
        }
        if rows.is_empty() {
            return Ok(());
        }

        let results = join_all(rows.iter().map(|row| self.flush_row(row))).await;
        let failures: Vec<WindrowError> = results.into_iter().filter_map(Result::err).collect();
        if failures.is_empty() {
            Ok(())
        } else {
            self.failed.fetch_add(failures.len() as u64, Ordering::Relaxed);
            Err(WindrowError::PartialFlush(failures))
        }
    }

    async fn flush_row(&self, row: &Bytes) -> Result<()> {
        let cells = self.store.get(&self.table, row).await?;
        let data: Vec<Cell> = cells
            .into_iter()
            .filter(|cell| cell.family == self.family)
            .collect();

        if let Some(merged) = self.compact(row, &data)? {
            self.store
                .put(
                    &self.table,
                    row,
                    &self.family,
                    &merged.qualifier,
                    merged.value,
                )
                .await?;
            let originals: Vec<Bytes> = data
                .iter()
                .map(|cell| cell.qualifier.clone())
                .filter(|qualifier| *qualifier != merged.qualifier)
                .collect();
            self.store
                .delete(&self.table, row, &self.family, &originals)
                .await?;
            self.compacted.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn scheduler(enabled: bool, store: Arc<dyn StorageBackend>) -> CompactionScheduler {
        CompactionScheduler::new(
            enabled,
            "tsdb".to_string(),
            Bytes::from_static(b"t"),
            store,
            Arc::new(SortedMergeCompactor),
        )
    }

    #[tokio::test]
    async fn test_schedule_collapses_duplicates() {
        let s = scheduler(true, Arc::new(MemoryBackend::new()));
        s.schedule(b"row-a");
        s.schedule(b"row-a");
        s.schedule(b"row-b");
        assert_eq!(s.len(), 2);
        assert_eq!(s.rows_scheduled(), 2);
    }

    #[tokio::test]
    async fn test_schedule_noop_when_disabled() {
        let s = scheduler(false, Arc::new(MemoryBackend::new()));
        s.schedule(b"row-a");
        assert!(s.is_empty());
        assert_eq!(s.rows_scheduled(), 0);
    }

    #[tokio::test]
    async fn test_flush_merges_row_and_deletes_originals() {
        let store = Arc::new(MemoryBackend::new());
        store
            .put("tsdb", b"row", b"t", &[0x00, 0x17], Bytes::from_static(b"BBBBBBBB"))
            .await
            .unwrap();
        store
            .put("tsdb", b"row", b"t", &[0x00, 0x07], Bytes::from_static(b"AAAAAAAA"))
            .await
            .unwrap();

        let s = scheduler(true, store.clone());
        s.schedule(b"row");
        s.flush().await.unwrap();

        let cells = store.get("tsdb", b"row").await.unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].qualifier, Bytes::from_static(&[0x00, 0x07, 0x00, 0x17]));
        assert_eq!(cells[0].value, Bytes::from_static(b"AAAAAAAABBBBBBBB"));
        assert!(s.is_empty());
        assert_eq!(s.rows_compacted(), 1);
    }

    #[tokio::test]
    async fn test_flush_skips_single_cell_rows() {
        let store = Arc::new(MemoryBackend::new());
        store
            .put("tsdb", b"row", b"t", &[0x00, 0x07], Bytes::from_static(b"AAAAAAAA"))
            .await
            .unwrap();

        let s = scheduler(true, store.clone());
        s.schedule(b"row");
        s.flush().await.unwrap();

        let cells = store.get("tsdb", b"row").await.unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].qualifier, Bytes::from_static(&[0x00, 0x07]));
        assert_eq!(s.rows_compacted(), 0);
    }

    #[tokio::test]
    async fn test_flush_aggregates_failures_without_stopping() {
        let store = Arc::new(MemoryBackend::new());
        // One healthy two-cell row.
        store
            .put("tsdb", b"good", b"t", &[0x00, 0x07], Bytes::from_static(b"AAAAAAAA"))
            .await
            .unwrap();
        store
            .put("tsdb", b"good", b"t", &[0x00, 0x17], Bytes::from_static(b"BBBBBBBB"))
            .await
            .unwrap();

        struct FailOnRow {
            inner: Arc<MemoryBackend>,
            bad: Bytes,
        }

        #[async_trait::async_trait]
        impl StorageBackend for FailOnRow {
            async fn get(&self, table: &str, row: &[u8]) -> Result<Vec<Cell>> {
                if row == self.bad {
                    return Err(WindrowError::storage("region offline"));
                }
                self.inner.get(table, row).await
            }
            async fn put(
                &self,
                table: &str,
                row: &[u8],
                family: &[u8],
                qualifier: &[u8],
                value: Bytes,
            ) -> Result<()> {
                self.inner.put(table, row, family, qualifier, value).await
            }
            async fn delete(
                &self,
                table: &str,
                row: &[u8],
                family: &[u8],
                qualifiers: &[Bytes],
            ) -> Result<()> {
                self.inner.delete(table, row, family, qualifiers).await
            }
            async fn scan_rows(
                &self,
                table: &str,
                family: &[u8],
                qualifier: &[u8],
                prefix: &[u8],
                limit: usize,
            ) -> Result<Vec<(Bytes, Bytes)>> {
                self.inner.scan_rows(table, family, qualifier, prefix, limit).await
            }
            async fn flush(&self) -> Result<()> {
                self.inner.flush().await
            }
            async fn shutdown(&self) -> Result<()> {
                self.inner.shutdown().await
            }
        }

        let failing = Arc::new(FailOnRow {
            inner: store.clone(),
            bad: Bytes::from_static(b"bad"),
        });
        let s = scheduler(true, failing);
        s.schedule(b"good");
        s.schedule(b"bad");

        let err = s.flush().await.unwrap_err();
        assert_eq!(err.partial_failures().len(), 1);
        assert_eq!(s.rows_failed(), 1);

        // The healthy row still compacted.
        let cells = store.get("tsdb", b"good").await.unwrap();
        assert_eq!(cells.len(), 1);
        assert_eq!(s.rows_compacted(), 1);
    }
}
