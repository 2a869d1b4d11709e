//! Windrow - write-path core of a time series database.
//!
//! Windrow turns (metric, timestamp, tags, value) tuples into a compact
//! binary row/qualifier encoding, writes them through an asynchronous
//! sorted key-value store, and keeps the bookkeeping around them honest:
//! UID assignment, compaction scheduling, and a safe flush/shutdown
//! sequence.
//!
//! # Architecture
//!
//! - `codec`: pure row-key and qualifier encoding
//! - `uid`: name ↔ UID resolution with per-kind caches
//! - `storage`: the key-value store trait and an in-memory backend
//! - `compaction`: pending-row tracking and the flush drain
//! - `db`: the `Tsdb` handle tying the write path and lifecycle together
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use windrow::{Config, MemoryBackend, Tsdb};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Tsdb::open(Config::default(), Arc::new(MemoryBackend::new()))?;
//!     let tags = HashMap::from([("host".to_string(), "web01".to_string())]);
//!     db.add_point("sys.cpu.user", 1356998400, 42, &tags).await?;
//!     db.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod codec;
pub mod compaction;
pub mod core;
pub mod db;
pub mod stats;
pub mod storage;
pub mod uid;

// Re-export the main surface for convenience
pub use crate::core::{Config, Result, Uid, UidKind, WindrowError};
pub use crate::db::Tsdb;
pub use crate::storage::{MemoryBackend, StorageBackend};
