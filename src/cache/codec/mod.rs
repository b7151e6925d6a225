//! Packed item payload codec
//!
//! Every stored item is one opaque MessagePack map with up to three keys:
//!
//! - `"$"` - the serialized user value (required, byte-string)
//! - `"#"` - attached tag versions, tag name to version token (only when
//!   the item carries tags)
//! - `"^"` - packed metadata: expiry as big-endian u32 Unix seconds
//!   followed by creation cost as little-endian u32 milliseconds with
//!   trailing zero bytes stripped
//!
//! Anything that does not match this shape is rejected; the read path
//! treats rejection as invalid-structure and evicts the record. ctime is
//! capped at `0xFFFF_FFFF` ms (about 49.7 days of compute cost).

use std::collections::BTreeMap;

use rmpv::Value;

use crate::cache::traits::types_and_enums::CacheOperationError;

const VALUE_KEY: &str = "$";
const TAGS_KEY: &str = "#";
const META_KEY: &str = "^";

/// Decoded form of a stored payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedItem {
    /// Opaque serialized user value
    pub value: Vec<u8>,
    /// Tag name to version token the item was saved with
    pub tag_versions: BTreeMap<String, Vec<u8>>,
    /// Absolute expiry in Unix seconds; `None` means no wall-clock bound
    pub expiry: Option<u32>,
    /// Cost of producing the value, in milliseconds
    pub ctime_ms: u32,
}

/// Pack a value with its tag versions and metadata into one payload
///
/// An expiry of `Some(0)` is normalized to `None`; the metadata field is
/// omitted entirely when there is neither an expiry nor a ctime.
pub fn pack(
    value: &[u8],
    tag_versions: &BTreeMap<String, Vec<u8>>,
    expiry: Option<u32>,
    ctime_ms: u32,
) -> Result<Vec<u8>, CacheOperationError> {
    let mut entries: Vec<(Value, Value)> = Vec::with_capacity(3);
    entries.push((Value::from(VALUE_KEY), Value::Binary(value.to_vec())));

    if !tag_versions.is_empty() {
        let tags: Vec<(Value, Value)> = tag_versions
            .iter()
            .map(|(tag, version)| (Value::from(tag.as_str()), Value::Binary(version.clone())))
            .collect();
        entries.push((Value::from(TAGS_KEY), Value::Map(tags)));
    }

    let expiry = expiry.filter(|&e| e != 0);
    if expiry.is_some() || ctime_ms != 0 {
        entries.push((
            Value::from(META_KEY),
            Value::Binary(pack_meta(expiry.unwrap_or(0), ctime_ms)),
        ));
    }

    let mut payload = Vec::with_capacity(value.len() + 32);
    rmpv::encode::write_value(&mut payload, &Value::Map(entries))
        .map_err(|e| CacheOperationError::serialization_failed(e.to_string()))?;
    Ok(payload)
}

/// Unpack and structurally validate a stored payload
pub fn unpack(payload: &[u8]) -> Result<PackedItem, CacheOperationError> {
    let mut cursor = payload;
    let value = rmpv::decode::read_value(&mut cursor)
        .map_err(|e| CacheOperationError::deserialization_failed(e.to_string()))?;
    if !cursor.is_empty() {
        return Err(CacheOperationError::deserialization_failed(
            "trailing bytes after payload map",
        ));
    }

    let entries = value
        .as_map()
        .ok_or_else(|| CacheOperationError::deserialization_failed("payload is not a map"))?;

    let mut user_value: Option<Vec<u8>> = None;
    let mut tag_versions = BTreeMap::new();
    let mut meta: Option<&[u8]> = None;

    for (key, field) in entries {
        match key.as_str() {
            Some(VALUE_KEY) => {
                let bytes = field.as_slice().ok_or_else(|| {
                    CacheOperationError::deserialization_failed("value field is not a byte-string")
                })?;
                user_value = Some(bytes.to_vec());
            }
            Some(TAGS_KEY) => {
                let tags = field.as_map().ok_or_else(|| {
                    CacheOperationError::deserialization_failed("tags field is not a map")
                })?;
                for (tag, version) in tags {
                    let tag = tag.as_str().ok_or_else(|| {
                        CacheOperationError::deserialization_failed("tag name is not a string")
                    })?;
                    let version = version.as_slice().ok_or_else(|| {
                        CacheOperationError::deserialization_failed(
                            "tag version is not a byte-string",
                        )
                    })?;
                    tag_versions.insert(tag.to_string(), version.to_vec());
                }
            }
            Some(META_KEY) => {
                let bytes = field.as_slice().ok_or_else(|| {
                    CacheOperationError::deserialization_failed("meta field is not a byte-string")
                })?;
                if bytes.len() < 4 || bytes.len() > 8 {
                    return Err(CacheOperationError::deserialization_failed(format!(
                        "meta field has {} bytes, expected 4..=8",
                        bytes.len()
                    )));
                }
                meta = Some(bytes);
            }
            _ => {
                return Err(CacheOperationError::deserialization_failed(
                    "payload map contains an unknown key",
                ));
            }
        }
    }

    let value = user_value.ok_or_else(|| {
        CacheOperationError::deserialization_failed("payload map is missing the value field")
    })?;

    let (expiry, ctime_ms) = match meta {
        Some(bytes) => unpack_meta(bytes),
        None => (None, 0),
    };

    Ok(PackedItem {
        value,
        tag_versions,
        expiry,
        ctime_ms,
    })
}

/// Pack `(expiry BE, ctime LE)` into 5..=8 bytes
///
/// ctime's little-endian encoding keeps its low bytes first, so stripping
/// trailing zeros preserves the value; at least one ctime byte is always
/// emitted.
fn pack_meta(expiry: u32, ctime_ms: u32) -> Vec<u8> {
    let mut meta = Vec::with_capacity(8);
    meta.extend_from_slice(&expiry.to_be_bytes());
    let ctime = ctime_ms.to_le_bytes();
    let mut len = ctime.len();
    while len > 1 && ctime[len - 1] == 0 {
        len -= 1;
    }
    meta.extend_from_slice(&ctime[..len]);
    meta
}

/// Decode 4..=8 meta bytes, right-padding the ctime half with zeros
fn unpack_meta(bytes: &[u8]) -> (Option<u32>, u32) {
    let mut padded = [0u8; 8];
    padded[..bytes.len()].copy_from_slice(bytes);
    let expiry = u32::from_be_bytes([padded[0], padded[1], padded[2], padded[3]]);
    let ctime = u32::from_le_bytes([padded[4], padded[5], padded[6], padded[7]]);
    (if expiry == 0 { None } else { Some(expiry) }, ctime)
}
