//! Core domain types for windrow.
//!
//! This module contains the error taxonomy, configuration, and the UID
//! primitives shared by every other module.

pub mod config;
pub mod error;
pub mod types;

pub use config::{CompactionConfig, Config, StorageConfig, UidConfig};
pub use error::{Result, WindrowError};
pub use types::{validate_uid_name, Uid, UidKind};
