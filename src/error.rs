use std::sync::Arc;
use thiserror::Error;

/// Unified error type for the discovery engine.
#[derive(Debug, Clone, Error)]
pub enum DiscoveryError {
    // IO errors
    #[error("IO error: {0}")]
    Io(String),
    #[error("IO error: {0}")]
    IoError(Arc<std::io::Error>),

    // Lookup backend errors
    #[error("lookup backend init failed: {0}")]
    BackendInit(String),

    // Configuration errors
    #[error("invalid lookup mode: {0}")]
    InvalidLookupMode(String),
    #[error("invalid bind address: {0}")]
    InvalidBindAddress(String),
    #[error("invalid name server: {0}")]
    InvalidNameServer(String),
    #[error("invalid filter pattern: {0}")]
    InvalidFilterPattern(String),

    // Facade errors
    #[error("no such service query: {0}")]
    UnknownQuery(u64),
    #[error("discovery engine is stopped")]
    EngineStopped,
}

impl From<std::io::Error> for DiscoveryError {
    fn from(err: std::io::Error) -> Self {
        DiscoveryError::IoError(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, DiscoveryError>;
