//! Shared test fixtures.
#![allow(dead_code)]

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use windrow::storage::{Cell, MemoryBackend, StorageBackend};
use windrow::{Result, WindrowError};

/// Backend wrapper with failure injection and shutdown counting.
///
/// Delegates to an in-memory backend until a failure mode is switched on.
pub struct ControlledBackend {
    pub inner: Arc<MemoryBackend>,
    fail_gets: AtomicBool,
    fail_puts: AtomicBool,
    shutdown_calls: AtomicU64,
}

impl ControlledBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryBackend::new()),
            fail_gets: AtomicBool::new(false),
            fail_puts: AtomicBool::new(false),
            shutdown_calls: AtomicU64::new(0),
        }
    }

    pub fn fail_gets(&self, on: bool) {
        self.fail_gets.store(on, Ordering::SeqCst);
    }

    pub fn fail_puts(&self, on: bool) {
        self.fail_puts.store(on, Ordering::SeqCst);
    }

    pub fn shutdown_calls(&self) -> u64 {
        self.shutdown_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StorageBackend for ControlledBackend {
    async fn get(&self, table: &str, row: &[u8]) -> Result<Vec<Cell>> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(WindrowError::storage("injected get failure"));
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
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(WindrowError::storage("injected put failure"));
        }
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
        self.inner
            .scan_rows(table, family, qualifier, prefix, limit)
            .await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }

    async fn shutdown(&self) -> Result<()> {
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.shutdown().await
    }
}

/// Builds a tag map from string pairs.
pub fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|&(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
