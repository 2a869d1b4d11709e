//! Storage backend for time series rows and UID mappings.
//!
//! This module defines the asynchronous key-value store the database is
//! layered on, plus an in-memory implementation for embedding and tests.

pub mod backend;
pub mod memory;

pub use backend::{Cell, StorageBackend};
pub use memory::{MemoryBackend, MemoryBackendStats};
