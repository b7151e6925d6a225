//! Backing-pool contract shared by the item pool and the tag pool
//!
//! Concrete pools (in-process map, filesystem, Redis client) live outside
//! the core; the adapter only ever talks to this trait. Failures surface
//! as `Err` here and are swallowed into boolean results by the core so
//! callers can degrade to the origin data source.

use std::collections::HashMap;
use std::time::Duration;

use super::types_and_enums::CacheOperationError;

/// Result alias for pool operations
pub type PoolResult<T> = Result<T, CacheOperationError>;

/// Command descriptor for pipelined execution
#[derive(Debug, Clone)]
pub enum PoolCommand {
    /// Fetch a single value
    Get { key: String },
    /// Unconditional write with optional TTL
    Set {
        key: String,
        value: Vec<u8>,
        ttl: Option<Duration>,
    },
    /// Atomic create-if-absent with optional TTL
    SetIfAbsent {
        key: String,
        value: Vec<u8>,
        ttl: Option<Duration>,
    },
    /// Multi-delete
    Delete { keys: Vec<String> },
    /// Reset the TTL of an existing key
    Expire { key: String, ttl: Duration },
}

/// Per-command outcome of a pipelined execution, parallel to the input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolResponse {
    Value(Option<Vec<u8>>),
    Status(bool),
}

impl PoolResponse {
    /// Interpret the response as a success flag
    pub fn is_ok(&self) -> bool {
        match self {
            PoolResponse::Value(v) => v.is_some(),
            PoolResponse::Status(s) => *s,
        }
    }
}

/// Minimal key/value pool contract
///
/// Both the item pool and the tag pool satisfy it; they may be the same
/// pool. `set_if_absent` must be atomic with respect to concurrent
/// writers of the same key - it is the only primitive the tag-version
/// protocol relies on for correctness.
pub trait CachePool: Send + Sync {
    /// Multi-get; absent keys are simply missing from the returned map
    fn get(&self, keys: &[String]) -> PoolResult<HashMap<String, Vec<u8>>>;

    /// Unconditional write with optional TTL
    fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> PoolResult<bool>;

    /// Atomic create-if-absent; returns true when this caller's value won
    fn set_if_absent(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> PoolResult<bool>;

    /// Atomic multi-delete; deleting an absent key is not an error
    fn delete(&self, keys: &[String]) -> PoolResult<bool>;

    /// Reset the TTL of an existing key; false when the key is absent
    fn expire(&self, key: &str, ttl: Duration) -> PoolResult<bool>;

    /// Drop every key starting with `prefix`; an empty prefix clears all
    fn clear(&self, prefix: &str) -> PoolResult<bool>;

    /// Execute a batch of commands, returning one response per command
    ///
    /// Pools with a wire pipeline (Redis MULTI-less pipelining) override
    /// this; the default dispatches command-by-command.
    fn pipeline(&self, commands: Vec<PoolCommand>) -> PoolResult<Vec<PoolResponse>> {
        let mut responses = Vec::with_capacity(commands.len());
        for command in commands {
            let response = match command {
                PoolCommand::Get { key } => {
                    let mut found = self.get(std::slice::from_ref(&key))?;
                    PoolResponse::Value(found.remove(&key))
                }
                PoolCommand::Set { key, value, ttl } => {
                    PoolResponse::Status(self.set(&key, &value, ttl)?)
                }
                PoolCommand::SetIfAbsent { key, value, ttl } => {
                    PoolResponse::Status(self.set_if_absent(&key, &value, ttl)?)
                }
                PoolCommand::Delete { keys } => PoolResponse::Status(self.delete(&keys)?),
                PoolCommand::Expire { key, ttl } => PoolResponse::Status(self.expire(&key, ttl)?),
            };
            responses.push(response);
        }
        Ok(responses)
    }
}
