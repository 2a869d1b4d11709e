//! Storage backend trait.

use crate::core::Result;
use bytes::Bytes;

/// One stored cell of a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Column family the cell lives in.
    pub family: Bytes,
    /// Qualifier within the family.
    pub qualifier: Bytes,
    /// Cell value.
    pub value: Bytes,
}

impl Cell {
    /// Builds a cell from raw parts.
    pub fn new(family: impl Into<Bytes>, qualifier: impl Into<Bytes>, value: impl Into<Bytes>) -> Self {
        Self {
            family: family.into(),
            qualifier: qualifier.into(),
            value: value.into(),
        }
    }
}

/// Asynchronous sorted key-value store the database is layered on.
///
/// Cells are keyed by (table, row, column family, qualifier). The store is
/// responsible for durability, batching, and retries; failures surface as
/// opaque `Storage` errors and are never retried by this crate. All
/// operations after [`shutdown`] fail.
///
/// [`shutdown`]: StorageBackend::shutdown
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read every cell of a row, ordered by (family, qualifier).
    async fn get(&self, table: &str, row: &[u8]) -> Result<Vec<Cell>>;

    /// Write one cell. Last write wins for a given (row, family, qualifier).
    async fn put(
        &self,
        table: &str,
        row: &[u8],
        family: &[u8],
        qualifier: &[u8],
        value: Bytes,
    ) -> Result<()>;

    /// Delete the listed qualifiers of a row within one family.
    async fn delete(
        &self,
        table: &str,
        row: &[u8],
        family: &[u8],
        qualifiers: &[Bytes],
    ) -> Result<()>;

    /// Scan rows whose key starts with `prefix`, in row-key order, returning
    /// `(row, value)` for rows that carry a cell at (family, qualifier).
    /// At most `limit` rows are returned.
    async fn scan_rows(
        &self,
        table: &str,
        family: &[u8],
        qualifier: &[u8],
        prefix: &[u8],
        limit: usize,
    ) -> Result<Vec<(Bytes, Bytes)>>;

    /// Force buffered writes out to durable storage.
    async fn flush(&self) -> Result<()>;

    /// Flush and release every resource held by the client.
    async fn shutdown(&self) -> Result<()>;
}
