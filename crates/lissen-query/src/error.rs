use thiserror::Error;

/// Unified error type for all data source operations
#[derive(Error, Debug)]
pub enum DataError {
    /// Connection failed (authentication, network, etc.)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Query did not finish in time
    #[error("Query timeout after {0}ms")]
    QueryTimeout(u64),

    /// Invalid query syntax or parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Table, file or job not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not supported by this backend
    #[error("Operation not supported: {0}")]
    OperationNotSupported(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Generic backend error
    #[error("Backend error: {0}")]
    BackendError(String),
}

impl DataError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        DataError::NotFound(msg.into())
    }

    pub fn operation_not_supported(msg: impl Into<String>) -> Self {
        DataError::OperationNotSupported(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        DataError::InvalidConfiguration(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        DataError::PermissionDenied(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
