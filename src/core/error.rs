use crate::core::types::UidKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WindrowError {
    #[error("invalid {field} name: {name:?}")]
    InvalidName { field: &'static str, name: String },

    #[error("invalid timestamp {0}: must fit in an unsigned 32-bit quantity")]
    InvalidTimestamp(i64),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid value width {0}: must be 4 or 8 bytes")]
    InvalidValueWidth(usize),

    #[error("malformed row key: {0}")]
    MalformedRowKey(String),

    #[error("unknown UID type: {0:?}")]
    UnknownUidType(String),

    #[error("no such {kind} name: {name:?}")]
    NameNotFound { kind: UidKind, name: String },

    #[error("no such {kind} UID: {uid}")]
    UidNotFound { kind: UidKind, uid: String },

    #[error("name {name:?} already exists with UID: {uid}")]
    NameAlreadyExists { name: String, uid: String },

    #[error("all {kind} UIDs of width {width} are exhausted")]
    UidExhausted { kind: UidKind, width: usize },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{} row(s) failed to flush from the compaction queue", .0.len())]
    PartialFlush(Vec<WindrowError>),
}

/// Result type alias for windrow operations
pub type Result<T> = std::result::Result<T, WindrowError>;

impl WindrowError {
    /// Creates a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new invalid-value error
    pub fn invalid_value<S: Into<String>>(msg: S) -> Self {
        Self::InvalidValue(msg.into())
    }

    /// The individual failures contained in a partial flush, empty otherwise.
    pub fn partial_failures(&self) -> &[WindrowError] {
        match self {
            Self::PartialFlush(failures) => failures,
            _ => &[],
        }
    }

    /// Returns true if this error might succeed on retry by the caller
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::PartialFlush(_))
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidName { .. }
            | Self::InvalidTimestamp(_)
            | Self::InvalidValue(_)
            | Self::InvalidValueWidth(_) => "validation",
            Self::MalformedRowKey(_) => "corruption",
            Self::UnknownUidType(_) => "dispatch",
            Self::NameNotFound { .. } | Self::UidNotFound { .. } => "not_found",
            Self::NameAlreadyExists { .. } | Self::UidExhausted { .. } => "assignment",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::PartialFlush(_) => "compaction",
        }
    }
}
