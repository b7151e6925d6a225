//! Core cache trait seams
//!
//! This module holds the backing-pool contract both the item pool and the
//! tag pool satisfy, plus the crate-wide error type.

// Core module declarations (crate private)
pub mod pool; // CachePool contract with pipeline support
pub mod types_and_enums; // Error type and shared enumerations

// Public API re-exports for users
pub use pool::{CachePool, PoolCommand, PoolResponse, PoolResult};
pub use types_and_enums::CacheOperationError;
