//! Error types shared across the crate.

use crate::codec::CodecError;
use crate::name::NameError;

/// Errors surfaced to callers of the store.
///
/// Naming, registration and configuration mistakes are returned directly.
/// Backend failures only reach the caller from the maintenance operations;
/// during lazy resolution and write-behind persistence they are logged and
/// swallowed instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The name is malformed.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName {
        name: String,
        #[source]
        reason: NameError,
    },

    /// The namespace would overlap the keys of other namespaces.
    #[error("invalid namespace {namespace:?}: {reason}")]
    InvalidNamespace {
        namespace: String,
        #[source]
        reason: NameError,
    },

    /// An entry with the same fully-qualified key already exists.
    #[error("entry already registered: {0}")]
    DuplicateName(String),

    /// No entry is registered under this name.
    #[error("no entry registered under {0:?}")]
    NotFound(String),

    /// The process-wide store was already configured.
    #[error("configuration may only be applied once")]
    ConfigurationAlreadySet,

    /// The persistence backend failed.
    #[error("backend failure: {0}")]
    Backend(#[from] BackendError),

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by persistence backends.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend could not be opened.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A transaction against the backend failed.
    #[error("transaction failed: {0}")]
    Transaction(String),

    /// I/O error from a file-backed table.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A file-backed table holds something other than a string map.
    #[error("malformed table file: {0}")]
    Format(#[from] serde_json::Error),
}

/// Result alias for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;
