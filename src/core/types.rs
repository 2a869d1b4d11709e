use crate::core::error::{Result, WindrowError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The three kinds of names a UID can stand in for.
///
/// Dispatch on UID kind goes through this enum everywhere in the core;
/// the string tokens only appear at the external assignment surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UidKind {
    /// Metric names.
    Metric,
    /// Tag keys.
    TagKey,
    /// Tag values.
    TagValue,
}

impl UidKind {
    /// The external-facing token for this kind.
    pub fn token(self) -> &'static str {
        match self {
            UidKind::Metric => "metric",
            UidKind::TagKey => "tagk",
            UidKind::TagValue => "tagv",
        }
    }

    /// Parses an external kind token, case-insensitively.
    pub fn parse_token(token: &str) -> Result<Self> {
        match token.to_lowercase().as_str() {
            "metric" => Ok(UidKind::Metric),
            "tagk" => Ok(UidKind::TagKey),
            "tagv" => Ok(UidKind::TagValue),
            _ => Err(WindrowError::UnknownUidType(token.to_string())),
        }
    }

    /// All kinds, in canonical order.
    pub fn all() -> [UidKind; 3] {
        [UidKind::Metric, UidKind::TagKey, UidKind::TagValue]
    }
}

impl fmt::Display for UidKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.token())
    }
}

/// Fixed-width big-endian binary identifier substituting for a name.
///
/// The width is fixed per kind at database-open time; a `Uid` value always
/// carries exactly that many bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(Vec<u8>);

impl Uid {
    /// Wraps raw UID bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Uid(bytes)
    }

    /// Encodes `value` big-endian into `width` bytes.
    ///
    /// Returns `None` when the value does not fit in the width, which is how
    /// the allocator detects UID exhaustion.
    pub fn from_u64(value: u64, width: usize) -> Option<Self> {
        if width < 8 && value >= 1u64 << (8 * width) {
            return None;
        }
        let full = value.to_be_bytes();
        Some(Uid(full[8 - width..].to_vec()))
    }

    /// Decodes the UID back to the integer it encodes.
    pub fn to_u64(&self) -> u64 {
        let mut full = [0u8; 8];
        full[8 - self.0.len()..].copy_from_slice(&self.0);
        u64::from_be_bytes(full)
    }

    /// The raw UID bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The width of this UID in bytes.
    pub fn width(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Validates a metric name, tag key, or tag value.
///
/// Accepts ASCII alphanumerics, `-`, `_`, `.`, `/`, and non-ASCII letters.
/// `field` names the offending input in the error.
pub fn validate_uid_name(field: &'static str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(WindrowError::InvalidName {
            field,
            name: name.to_string(),
        });
    }
    for c in name.chars() {
        let ok = c.is_ascii_alphanumeric()
            || c == '-'
            || c == '_'
            || c == '.'
            || c == '/'
            || (!c.is_ascii() && c.is_alphabetic());
        if !ok {
            return Err(WindrowError::InvalidName {
                field,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}
