use thiserror::Error;

/// Custom error types for treenet
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Routing table is full")]
    TableFull,

    #[error("Routing table is empty")]
    TableEmpty,

    #[error("Edge does not exist")]
    DoesNotExist,

    #[error("Invalid edge")]
    InvalidEdge,

    #[error("No route to destination")]
    NotFound,

    #[error("Cycle detected while resolving route")]
    CycleDetected,

    #[error("Malformed routing update: {0}")]
    MalformedUpdate(String),

    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new malformed update error
    pub fn malformed_update(msg: impl Into<String>) -> Self {
        Error::MalformedUpdate(msg.into())
    }

    /// Creates a new integrity error
    pub fn integrity(msg: impl Into<String>) -> Self {
        Error::Integrity(msg.into())
    }

    /// Creates a new codec error
    pub fn codec(msg: impl Into<String>) -> Self {
        Error::Codec(msg.into())
    }

    /// Creates a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::codec("short frame");
        assert!(matches!(err, Error::Codec(_)));
        assert_eq!(err.to_string(), "Codec error: short frame");
    }

    #[test]
    fn test_buffer_error_message() {
        let err = Error::BufferTooSmall { needed: 2, available: 1 };
        assert_eq!(err.to_string(), "Buffer too small: need 2 bytes, have 1");
    }
}
