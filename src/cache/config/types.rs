//! Core configuration types
//!
//! This module defines the configuration structures for the tag-aware
//! adapter and the retry proxy, including the key grammar shared by the
//! item pool and the tag pool.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::retry::types::RetryStrategyKind;
use crate::cache::traits::types_and_enums::CacheOperationError;

/// Reserved key prefix for item records
pub const ITEM_PREFIX: &str = "$";
/// Reserved key prefix for tag-version records
pub const TAG_PREFIX: &str = "!";

/// Lifetime floor for finite tag records, in seconds
const TAGS_LIFETIME_BASE_SECS: u64 = 28_800;

/// Retry proxy configuration
///
/// Invalid combinations do not fail construction; the proxy logs a
/// warning and degrades to `NoRetry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total retry budget in milliseconds
    pub timeout_ms: u64,
    /// Upper bound on re-reads of a missing key
    pub max_retries: u32,
    /// Distribution strategy spreading callers' re-reads in time
    pub strategy: RetryStrategyKind,
    /// Strategy-specific shape parameter (geometric growth, binomial mean)
    pub factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_retries: 4,
            strategy: RetryStrategyKind::FlatGeometricIntervals,
            factor: 2.0,
        }
    }
}

/// Tag-aware cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Key prefix partition, restricted to `[-+_.A-Za-z0-9]*`
    pub namespace: String,
    /// Item TTL hint in seconds; 0 disables both item and tag TTLs
    pub default_lifetime_secs: u64,
    /// Wall-clock window for reusing the last tag-store read, in
    /// milliseconds; 0 makes the memo one-shot
    pub known_tag_versions_ttl_ms: u64,
    /// Retry proxy settings
    pub retry: RetryConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            default_lifetime_secs: 0,
            known_tag_versions_ttl_ms: 150,
            retry: RetryConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Validate construction-time invariants
    ///
    /// Only the namespace charset is fatal here; retry parameter
    /// violations degrade at proxy construction instead.
    pub fn validate(&self) -> Result<(), CacheOperationError> {
        let valid = self
            .namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '_' | '.'));
        if !valid {
            return Err(CacheOperationError::configuration_error(format!(
                "namespace {:?} contains characters outside [-+_.A-Za-z0-9]",
                self.namespace
            )));
        }
        Ok(())
    }

    /// TTL applied to tag records
    ///
    /// `None` means unbounded tags. Finite lifetimes are at least three
    /// times the requested default item lifetime and never below one day,
    /// so tags comfortably outlive every item stamped with them.
    pub fn tags_lifetime(&self) -> Option<Duration> {
        if self.default_lifetime_secs == 0 {
            return None;
        }
        let secs = self.default_lifetime_secs.max(TAGS_LIFETIME_BASE_SECS) * 3;
        Some(Duration::from_secs(secs))
    }

    /// Full item id: `namespace ':' ITEM_PREFIX user_key`
    pub fn item_id(&self, key: &str) -> String {
        format!("{}:{}{}", self.namespace, ITEM_PREFIX, key)
    }

    /// Full tag id: `namespace ':' TAG_PREFIX tag_name`
    pub fn tag_id(&self, tag: &str) -> String {
        format!("{}:{}{}", self.namespace, TAG_PREFIX, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_charset() {
        let mut config = CacheConfig::default();
        config.namespace = "app-v1.2_cache+x".to_string();
        assert!(config.validate().is_ok());

        config.namespace = "app:cache".to_string();
        assert!(config.validate().is_err());

        config.namespace = "app cache".to_string();
        assert!(config.validate().is_err());

        config.namespace = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_tags_lifetime_derivation() {
        let mut config = CacheConfig::default();
        assert_eq!(config.tags_lifetime(), None);

        // Short item lifetimes are floored so tags live at least a day
        config.default_lifetime_secs = 60;
        assert_eq!(
            config.tags_lifetime(),
            Some(Duration::from_secs(86_400))
        );

        // Long lifetimes scale by three
        config.default_lifetime_secs = 100_000;
        assert_eq!(
            config.tags_lifetime(),
            Some(Duration::from_secs(300_000))
        );
    }

    #[test]
    fn test_key_grammar() {
        let mut config = CacheConfig::default();
        config.namespace = "ns".to_string();
        assert_eq!(config.item_id("user.42"), "ns:$user.42");
        assert_eq!(config.tag_id("users"), "ns:!users");
    }
}
