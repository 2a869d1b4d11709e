//! Binary row-key and qualifier encoding.
//!
//! A row key is `metric UID || base_time || (tag-key UID, tag-value UID)*`
//! with the base time floored to [`WINDOW_SECONDS`] and tag pairs sorted by
//! tag-key UID, so the same tag set always produces the same key bytes. A
//! qualifier packs the offset within the window together with the value
//! representation flags into two bytes.
//!
//! Everything here is pure: the codec holds only the configured UID widths
//! and never touches the store.

use crate::core::config::UidConfig;
use crate::core::error::{Result, WindrowError};
use crate::core::types::Uid;

/// Duration of the window of samples grouped under one row, in seconds.
pub const WINDOW_SECONDS: u32 = 3600;

/// Number of low bits in a qualifier reserved for flags.
pub const FLAG_BITS: u16 = 4;

/// Qualifier flag bit marking a floating-point value.
pub const FLAG_FLOAT: u16 = 0x8;

/// Qualifier flag mask holding `value_byte_length - 1`.
pub const LENGTH_MASK: u16 = 0x7;

/// Number of bytes the base time occupies in a row key.
pub const TIMESTAMP_BYTES: usize = 4;

/// A decoded row key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKeyParts {
    /// The metric UID.
    pub metric: Uid,
    /// Start of the window this row covers.
    pub base_time: u32,
    /// Tag pairs in stored (tag-key UID) order.
    pub tags: Vec<(Uid, Uid)>,
}

/// A decoded qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualifierParts {
    /// Offset of the sample from the row's base time, in seconds.
    pub delta: u32,
    /// Whether the cell value is a floating-point bit pattern.
    pub is_float: bool,
    /// Length of the cell value in bytes.
    pub value_len: usize,
}

/// Pure row-key and qualifier codec, parameterized by the UID widths
/// configured at open time.
#[derive(Debug, Clone, Copy)]
pub struct RowCodec {
    metric_width: usize,
    tag_key_width: usize,
    tag_value_width: usize,
}

impl RowCodec {
    /// Builds a codec from the configured UID widths.
    pub fn new(uid: &UidConfig) -> Self {
        Self {
            metric_width: uid.metric_width,
            tag_key_width: uid.tag_key_width,
            tag_value_width: uid.tag_value_width,
        }
    }

    /// Floors a timestamp to the start of its window.
    pub fn base_time(timestamp: u32) -> u32 {
        timestamp - (timestamp % WINDOW_SECONDS)
    }

    /// Encodes a row key from a metric UID, a base time, and tag pairs.
    ///
    /// Tag pairs are sorted by tag-key UID so the key is independent of
    /// insertion order. The caller must pass UIDs of the configured widths.
    pub fn row_key(&self, metric: &Uid, base_time: u32, tags: &[(Uid, Uid)]) -> Vec<u8> {
        debug_assert_eq!(metric.width(), self.metric_width);
        let mut sorted: Vec<&(Uid, Uid)> = tags.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        let mut key = Vec::with_capacity(
            self.metric_width
                + TIMESTAMP_BYTES
                + sorted.len() * (self.tag_key_width + self.tag_value_width),
        );
        key.extend_from_slice(metric.as_bytes());
        key.extend_from_slice(&base_time.to_be_bytes());
        for (tagk, tagv) in sorted {
            debug_assert_eq!(tagk.width(), self.tag_key_width);
            debug_assert_eq!(tagv.width(), self.tag_value_width);
            key.extend_from_slice(tagk.as_bytes());
            key.extend_from_slice(tagv.as_bytes());
        }
        key
    }

    /// Decodes a row key back into its parts. Exact inverse of [`row_key`].
    ///
    /// [`row_key`]: RowCodec::row_key
    pub fn decode_row_key(&self, key: &[u8]) -> Result<RowKeyParts> {
        let header = self.metric_width + TIMESTAMP_BYTES;
        let pair = self.tag_key_width + self.tag_value_width;
        if key.len() < header || (key.len() - header) % pair != 0 {
            return Err(WindrowError::MalformedRowKey(format!(
                "length {} does not fit {}-byte header plus {}-byte tag pairs",
                key.len(),
                header,
                pair
            )));
        }

        let metric = Uid::from_bytes(key[..self.metric_width].to_vec());
        let mut ts = [0u8; TIMESTAMP_BYTES];
        ts.copy_from_slice(&key[self.metric_width..header]);
        let base_time = u32::from_be_bytes(ts);

        let mut tags = Vec::with_capacity((key.len() - header) / pair);
        let mut offset = header;
        while offset < key.len() {
            let tagk = Uid::from_bytes(key[offset..offset + self.tag_key_width].to_vec());
            offset += self.tag_key_width;
            let tagv = Uid::from_bytes(key[offset..offset + self.tag_value_width].to_vec());
            offset += self.tag_value_width;
            tags.push((tagk, tagv));
        }
        Ok(RowKeyParts {
            metric,
            base_time,
            tags,
        })
    }

    /// Reads the base time out of an encoded row key without a full decode.
    pub fn row_base_time(&self, key: &[u8]) -> Result<u32> {
        let header = self.metric_width + TIMESTAMP_BYTES;
        if key.len() < header {
            return Err(WindrowError::MalformedRowKey(format!(
                "length {} is shorter than the {}-byte header",
                key.len(),
                header
            )));
        }
        let mut ts = [0u8; TIMESTAMP_BYTES];
        ts.copy_from_slice(&key[self.metric_width..header]);
        Ok(u32::from_be_bytes(ts))
    }

    /// Encodes a qualifier from a window offset and value representation.
    pub fn qualifier(delta: u32, is_float: bool, value_len: usize) -> Result<[u8; 2]> {
        if delta >= WINDOW_SECONDS {
            return Err(WindrowError::InvalidTimestamp(i64::from(delta)));
        }
        if value_len != 4 && value_len != 8 {
            return Err(WindrowError::InvalidValueWidth(value_len));
        }
        let mut flags = (value_len as u16 - 1) & LENGTH_MASK;
        if is_float {
            flags |= FLAG_FLOAT;
        }
        let qualifier = ((delta as u16) << FLAG_BITS) | flags;
        Ok(qualifier.to_be_bytes())
    }

    /// Decodes a qualifier. Exact inverse of [`qualifier`].
    ///
    /// [`qualifier`]: RowCodec::qualifier
    pub fn decode_qualifier(qualifier: [u8; 2]) -> QualifierParts {
        let packed = u16::from_be_bytes(qualifier);
        QualifierParts {
            delta: u32::from(packed >> FLAG_BITS),
            is_float: packed & FLAG_FLOAT != 0,
            value_len: usize::from(packed & LENGTH_MASK) + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> RowCodec {
        RowCodec::new(&UidConfig::default())
    }

    fn uid(value: u64, width: usize) -> Uid {
        Uid::from_u64(value, width).unwrap()
    }

    #[test]
    fn test_base_time_is_window_aligned() {
        assert_eq!(RowCodec::base_time(1356998400), 1356998400);
        assert_eq!(RowCodec::base_time(1356998401), 1356998400);
        assert_eq!(RowCodec::base_time(1356998400 + 3599), 1356998400);
        assert_eq!(RowCodec::base_time(1356998400 + 3600), 1357002000);
        assert_eq!(RowCodec::base_time(0), 0);
        let max = RowCodec::base_time(u32::MAX);
        assert_eq!(max % WINDOW_SECONDS, 0);
        assert!(max <= u32::MAX);
    }

    #[test]
    fn test_row_key_round_trip() {
        let c = codec();
        let metric = uid(7, 3);
        let tags = vec![(uid(2, 3), uid(9, 3)), (uid(1, 3), uid(4, 3))];
        let key = c.row_key(&metric, 1356998400, &tags);
        assert_eq!(key.len(), 3 + 4 + 2 * 6);

        let parts = c.decode_row_key(&key).unwrap();
        assert_eq!(parts.metric, metric);
        assert_eq!(parts.base_time, 1356998400);
        // Stored order is sorted by tag-key UID.
        assert_eq!(parts.tags, vec![(uid(1, 3), uid(4, 3)), (uid(2, 3), uid(9, 3))]);
    }

    #[test]
    fn test_row_key_independent_of_tag_order() {
        let c = codec();
        let metric = uid(7, 3);
        let forward = vec![(uid(1, 3), uid(4, 3)), (uid(2, 3), uid(9, 3))];
        let reversed = vec![(uid(2, 3), uid(9, 3)), (uid(1, 3), uid(4, 3))];
        assert_eq!(
            c.row_key(&metric, 1356998400, &forward),
            c.row_key(&metric, 1356998400, &reversed)
        );
    }

    #[test]
    fn test_row_key_no_tags() {
        let c = codec();
        let key = c.row_key(&uid(1, 3), 7200, &[]);
        let parts = c.decode_row_key(&key).unwrap();
        assert!(parts.tags.is_empty());
        assert_eq!(c.row_base_time(&key).unwrap(), 7200);
    }

    #[test]
    fn test_decode_malformed_row_key() {
        let c = codec();
        assert!(c.decode_row_key(&[0x01, 0x02]).is_err());
        // Header plus half a tag pair.
        assert!(c.decode_row_key(&[0u8; 3 + 4 + 3]).is_err());
        assert!(c.row_base_time(&[0u8; 5]).is_err());
    }

    #[test]
    fn test_decode_respects_configured_widths() {
        let wide = RowCodec::new(&UidConfig {
            metric_width: 4,
            tag_key_width: 2,
            tag_value_width: 5,
        });
        let metric = uid(0xDEAD, 4);
        let tags = vec![(uid(3, 2), uid(0xBEEF, 5))];
        let key = wide.row_key(&metric, 3600, &tags);
        let parts = wide.decode_row_key(&key).unwrap();
        assert_eq!(parts.metric, metric);
        assert_eq!(parts.tags, tags);
    }

    #[test]
    fn test_qualifier_round_trip() {
        for (delta, is_float, len) in [(0, false, 8), (1, true, 4), (3599, false, 4), (42, true, 8)]
        {
            let q = RowCodec::qualifier(delta, is_float, len).unwrap();
            let parts = RowCodec::decode_qualifier(q);
            assert_eq!(parts.delta, delta);
            assert_eq!(parts.is_float, is_float);
            assert_eq!(parts.value_len, len);
        }
    }

    #[test]
    fn test_qualifier_flag_layout() {
        // An 8-byte integer at the start of the window: flags are 0x7.
        assert_eq!(RowCodec::qualifier(0, false, 8).unwrap(), [0x00, 0x07]);
        // A 4-byte float one second in: 1 << 4 | 0x8 | 0x3.
        assert_eq!(RowCodec::qualifier(1, true, 4).unwrap(), [0x00, 0x1B]);
    }

    #[test]
    fn test_qualifier_rejects_out_of_window_delta() {
        let err = RowCodec::qualifier(WINDOW_SECONDS, false, 8).unwrap_err();
        assert!(matches!(err, WindrowError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_qualifier_rejects_bad_value_width() {
        for len in [0, 1, 2, 3, 5, 6, 7, 9] {
            let err = RowCodec::qualifier(0, false, len).unwrap_err();
            assert!(matches!(err, WindrowError::InvalidValueWidth(l) if l == len));
        }
    }
}
