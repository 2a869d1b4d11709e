//! In-memory storage backend.
//!
//! A sorted, concurrency-safe store used for embedding and tests. Rows live
//! in per-table B-tree maps so scans come back in row-key order, matching
//! what a real sorted store returns.

use super::backend::{Cell, StorageBackend};
use crate::core::{Result, WindrowError};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

type Row = BTreeMap<(Bytes, Bytes), Bytes>;
type Table = Arc<RwLock<BTreeMap<Bytes, Row>>>;

/// Operation counters exposed for stats collection.
#[derive(Debug, Default)]
pub struct MemoryBackendStats {
    /// Number of get operations served.
    pub gets: u64,
    /// Number of put operations served.
    pub puts: u64,
    /// Number of delete operations served.
    pub deletes: u64,
    /// Number of flush operations served.
    pub flushes: u64,
}

/// In-memory [`StorageBackend`] implementation.
#[derive(Default)]
pub struct MemoryBackend {
    tables: DashMap<String, Table>,
    closed: AtomicBool,
    gets: AtomicU64,
    puts: AtomicU64,
    deletes: AtomicU64,
    flushes: AtomicU64,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the operation counters.
    pub fn stats(&self) -> MemoryBackendStats {
        MemoryBackendStats {
            gets: self.gets.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }

    /// Number of rows currently stored in a table.
    pub fn row_count(&self, table: &str) -> usize {
        self.tables
            .get(table)
            .map(|t| t.read().len())
            .unwrap_or(0)
    }

    fn table(&self, name: &str) -> Table {
        self.tables
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(BTreeMap::new())))
            .clone()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WindrowError::storage("backend is shut down"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, table: &str, row: &[u8]) -> Result<Vec<Cell>> {
        self.check_open()?;
        self.gets.fetch_add(1, Ordering::Relaxed);
        let table = self.table(table);
        let guard = table.read();
        let cells = guard
            .get(row)
            .map(|cells| {
                cells
                    .iter()
                    .map(|((family, qualifier), value)| Cell {
                        family: family.clone(),
                        qualifier: qualifier.clone(),
                        value: value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(cells)
    }

    async fn put(
        &self,
        table: &str,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        value: Bytes,
    ) -> Result<()> {
        self.check_open()?;
        self.puts.fetch_add(1, Ordering::Relaxed);
        let table = self.table(table);
        let mut guard = table.write();
        guard.entry(Bytes::copy_from_slice(row)).or_default().insert(
            (
                Bytes::copy_from_slice(family),
                Bytes::copy_from_slice(qualifier),
            ),
            value,
        );
        Ok(())
    }

    async fn delete(
        &self,
        table: &str,
        row: &[u8],
        family: &[u8],
        qualifiers: &[Bytes],
    ) -> Result<()> {
        self.check_open()?;
        self.deletes.fetch_add(1, Ordering::Relaxed);
        let table = self.table(table);
        let mut guard = table.write();
        if let Some(cells) = guard.get_mut(row) {
            for qualifier in qualifiers {
                cells.remove(&(Bytes::copy_from_slice(family), qualifier.clone()));
            }
            if cells.is_empty() {
                guard.remove(row);
            }
        }
        Ok(())
    }

    async fn scan_rows(
        &self,
        table: &str,
        family: &[u8],
        qualifier: &[u8],
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Bytes, Bytes)>> {
        self.check_open()?;
        self.gets.fetch_add(1, Ordering::Relaxed);
        let table = self.table(table);
        let guard = table.read();
        let wanted = (
            Bytes::copy_from_slice(family),
            Bytes::copy_from_slice(qualifier),
        );
        let mut out = Vec::new();
        for (row, cells) in guard.range(Bytes::copy_from_slice(prefix)..) {
            if !row.starts_with(prefix) {
                break;
            }
            if let Some(value) = cells.get(&wanted) {
                out.push((row.clone(), value.clone()));
                if out.len() == limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    async fn flush(&self) -> Result<()> {
        self.check_open()?;
        self.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
