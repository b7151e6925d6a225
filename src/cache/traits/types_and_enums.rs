//! Error type and shared enumerations for the cache system

/// Cache operation error covering configuration, codec and pool failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOperationError {
    /// Bad namespace charset, bad retry parameters or an otherwise
    /// unusable configuration, reported at construction
    InvalidConfiguration(String),
    /// Value could not be serialized for storage
    SerializationError(String),
    /// Stored payload could not be decoded
    DeserializationError(String),
    /// I/O failure against a backing pool
    PoolError(String),
    /// A cache item was used in a way its lifecycle does not allow
    InvalidItemState(String),
    /// Operation exceeded its wall-clock budget
    TimeoutError,
    Io(String),
}

impl CacheOperationError {
    /// Create configuration error
    #[inline(always)]
    pub fn configuration_error(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create serialization error
    #[inline(always)]
    pub fn serialization_failed(msg: impl Into<String>) -> Self {
        Self::SerializationError(msg.into())
    }

    /// Create deserialization error
    #[inline(always)]
    pub fn deserialization_failed(msg: impl Into<String>) -> Self {
        Self::DeserializationError(msg.into())
    }

    /// Create pool error
    #[inline(always)]
    pub fn pool_failed(msg: impl Into<String>) -> Self {
        Self::PoolError(msg.into())
    }

    /// Create invalid item state error
    #[inline(always)]
    pub fn invalid_item_state(msg: impl Into<String>) -> Self {
        Self::InvalidItemState(msg.into())
    }

    /// Create IO error
    #[inline(always)]
    pub fn io_failed(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }
}

impl std::fmt::Display for CacheOperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheOperationError::InvalidConfiguration(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
            CacheOperationError::SerializationError(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
            CacheOperationError::DeserializationError(msg) => {
                write!(f, "Deserialization error: {}", msg)
            }
            CacheOperationError::PoolError(msg) => write!(f, "Pool error: {}", msg),
            CacheOperationError::InvalidItemState(msg) => {
                write!(f, "Invalid item state: {}", msg)
            }
            CacheOperationError::TimeoutError => write!(f, "Operation timed out"),
            CacheOperationError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for CacheOperationError {}
