//! Cache configuration system with production-ready defaults
//!
//! Namespace partitioning, item/tag key grammar, tag-lifetime derivation
//! and retry-proxy settings.

pub mod types;

pub use types::{CacheConfig, RetryConfig};
