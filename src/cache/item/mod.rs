//! Transient cache item carrier
//!
//! A `CacheItem` is created by the adapter on read, populated by the
//! caller and handed back through `save`/`save_deferred`. It carries the
//! value (or a deferred producer of it), the hit flag, the metadata the
//! item was read with and the tags staged for the next save.
//!
//! The producer, when present, runs inside `commit` after tag versions
//! have been acquired; its wall-clock runtime is added to the item's
//! creation cost.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::cache::traits::types_and_enums::CacheOperationError;

/// Deferred value producer, run at commit time after tag acquisition
///
/// Returning `None` drops the item instead of persisting it.
pub type ValueProducer = Box<dyn FnOnce() -> Option<Vec<u8>> + Send + 'static>;

/// Characters that cannot appear in tag names
const RESERVED_TAG_CHARS: &[char] = &['{', '}', '(', ')', '/', '\\', '@', ':'];

/// Transient per-key cache item
pub struct CacheItem {
    pub(crate) key: String,
    pub(crate) value: Option<Vec<u8>>,
    pub(crate) hit: bool,
    /// Absolute expiry in Unix seconds, as read or as staged
    pub(crate) expiry: Option<u32>,
    /// Cost of producing the value so far, in milliseconds
    pub(crate) ctime_ms: u32,
    /// Tag versions the item was stored with (read metadata)
    pub(crate) stored_tags: BTreeMap<String, Vec<u8>>,
    /// Tags staged for the next save
    pub(crate) staged_tags: BTreeSet<String>,
    pub(crate) producer: Option<ValueProducer>,
}

impl CacheItem {
    /// Build a miss for `key`
    pub(crate) fn miss(key: String) -> Self {
        Self {
            key,
            value: None,
            hit: false,
            expiry: None,
            ctime_ms: 0,
            stored_tags: BTreeMap::new(),
            staged_tags: BTreeSet::new(),
            producer: None,
        }
    }

    /// Build a validated hit carrying the stored payload's contents
    pub(crate) fn hit(
        key: String,
        value: Vec<u8>,
        stored_tags: BTreeMap<String, Vec<u8>>,
        expiry: Option<u32>,
        ctime_ms: u32,
    ) -> Self {
        Self {
            key,
            value: Some(value),
            hit: true,
            expiry,
            ctime_ms,
            stored_tags,
            staged_tags: BTreeSet::new(),
            producer: None,
        }
    }

    /// User key this item belongs to
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the read found a valid, unexpired, tag-current record
    pub fn is_hit(&self) -> bool {
        self.hit
    }

    /// Current value bytes, if any
    pub fn value(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Replace the value, discarding any staged producer
    pub fn set_value(&mut self, value: Vec<u8>) -> &mut Self {
        self.value = Some(value);
        self.producer = None;
        self
    }

    /// Stage a deferred producer; it replaces any direct value
    pub fn set_producer(&mut self, producer: ValueProducer) -> &mut Self {
        self.producer = Some(producer);
        self.value = None;
        self
    }

    /// Stage a tag for the next save
    pub fn tag(&mut self, tag: impl Into<String>) -> Result<&mut Self, CacheOperationError> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(CacheOperationError::invalid_item_state(
                "tag name must not be empty",
            ));
        }
        if tag.contains(RESERVED_TAG_CHARS) {
            return Err(CacheOperationError::invalid_item_state(format!(
                "tag name {:?} contains a reserved character",
                tag
            )));
        }
        self.staged_tags.insert(tag);
        Ok(self)
    }

    /// Tags staged for the next save
    pub fn staged_tags(&self) -> impl Iterator<Item = &str> {
        self.staged_tags.iter().map(String::as_str)
    }

    /// Tag names the item was stored with when it was read
    pub fn previous_tags(&self) -> impl Iterator<Item = &str> {
        self.stored_tags.keys().map(String::as_str)
    }

    /// Absolute expiry in Unix seconds, if bounded
    pub fn expiry_secs(&self) -> Option<u32> {
        self.expiry
    }

    /// Accumulated cost of producing the value, in milliseconds
    pub fn creation_cost_ms(&self) -> u32 {
        self.ctime_ms
    }

    /// Set an absolute expiry; `None` removes the wall-clock bound
    pub fn expires_at(&mut self, unix_secs: Option<u64>) -> &mut Self {
        self.expiry = unix_secs.map(|s| s.min(u32::MAX as u64) as u32);
        self
    }

    /// Set a relative expiry from now; `None` removes the bound
    pub fn expires_after(&mut self, ttl: Option<Duration>) -> &mut Self {
        self.expiry = ttl.map(|ttl| {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs();
            now.saturating_add(ttl.as_secs()).min(u32::MAX as u64) as u32
        });
        self
    }

    /// Whether the item has anything to persist
    pub(crate) fn has_payload(&self) -> bool {
        self.value.is_some() || self.producer.is_some()
    }
}

impl std::fmt::Debug for CacheItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheItem")
            .field("key", &self.key)
            .field("hit", &self.hit)
            .field("expiry", &self.expiry)
            .field("ctime_ms", &self.ctime_ms)
            .field("stored_tags", &self.stored_tags.keys())
            .field("staged_tags", &self.staged_tags)
            .field("has_value", &self.value.is_some())
            .field("has_producer", &self.producer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_validation() {
        let mut item = CacheItem::miss("k".to_string());
        assert!(item.tag("users").is_ok());
        assert!(item.tag("v1.2-x_y").is_ok());
        assert!(item.tag("").is_err());
        assert!(item.tag("a:b").is_err());
        assert!(item.tag("a{b}").is_err());

        let staged: Vec<&str> = item.staged_tags().collect();
        assert_eq!(staged, vec!["users", "v1.2-x_y"]);
    }

    #[test]
    fn test_value_and_producer_are_exclusive() {
        let mut item = CacheItem::miss("k".to_string());
        item.set_value(b"v".to_vec());
        assert!(item.value().is_some());

        item.set_producer(Box::new(|| Some(b"p".to_vec())));
        assert!(item.value().is_none());
        assert!(item.has_payload());

        item.set_value(b"v2".to_vec());
        assert!(item.producer.is_none());
        assert_eq!(item.value(), Some(&b"v2"[..]));
    }

    #[test]
    fn test_expiry_staging() {
        let mut item = CacheItem::miss("k".to_string());
        item.expires_at(Some(1_700_000_000));
        assert_eq!(item.expiry_secs(), Some(1_700_000_000));

        item.expires_at(None);
        assert_eq!(item.expiry_secs(), None);

        item.expires_after(Some(Duration::from_secs(60)));
        let expiry = item.expiry_secs().expect("expiry staged");
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as u32;
        assert!(expiry >= now + 59 && expiry <= now + 61);
    }
}
