//! Persistence backends.
//!
//! Two interchangeable contracts cover the same four operations:
//!
//! - [`SyncBackend`] answers immediately. [`TextBackend`] implements it over
//!   any string-keyed [`TextTable`], running values through the text codec.
//! - [`AsyncBackend`] answers later. [`TransactionalBackend`] implements it
//!   over a [`Database`] whose single object store is opened for every
//!   operation and touched by exactly one transaction.
//!
//! Both list and clear keys by prefix so that one backend can be shared by
//! several namespaces.

mod text;
mod transactional;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::BackendResult;
use crate::value::Value;

pub use text::{FileTable, MemoryTable, TextBackend, TextTable};
pub use transactional::{
    Connection, Database, KeyRange, MemoryDatabase, Mode, Record, Request, Response,
    TransactionalBackend, OBJECT_STORE,
};

/// Backend whose operations complete before returning.
pub trait SyncBackend: Send + Sync {
    /// Load a value; `Ok(None)` when nothing is stored under `key`.
    fn load(&self, key: &str) -> BackendResult<Option<Value>>;

    fn save(&self, key: &str, value: &Value) -> BackendResult<()>;

    /// Keys starting with `prefix`, sorted.
    fn list_keys(&self, prefix: &str) -> BackendResult<Vec<String>>;

    /// Remove every key starting with `prefix`.
    fn remove_all(&self, prefix: &str) -> BackendResult<()>;
}

/// Backend whose operations complete asynchronously.
#[async_trait]
pub trait AsyncBackend: Send + Sync {
    /// Load a value; `Ok(None)` when nothing is stored under `key`.
    async fn load(&self, key: &str) -> BackendResult<Option<Value>>;

    async fn save(&self, key: &str, value: &Value) -> BackendResult<()>;

    /// Keys starting with `prefix`, sorted.
    async fn list_keys(&self, prefix: &str) -> BackendResult<Vec<String>>;

    /// Remove every key starting with `prefix`.
    async fn remove_all(&self, prefix: &str) -> BackendResult<()>;
}

/// The backend a store persists through.
#[derive(Clone)]
pub enum Persistence {
    Sync(Arc<dyn SyncBackend>),
    Async(Arc<dyn AsyncBackend>),
}

impl Persistence {
    pub fn text(table: impl TextTable + 'static) -> Self {
        Persistence::Sync(Arc::new(TextBackend::new(table)))
    }

    pub fn transactional(database: impl Database + 'static) -> Self {
        Persistence::Async(Arc::new(TransactionalBackend::new(database)))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, Persistence::Async(_))
    }
}

impl fmt::Debug for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Persistence::Sync(_) => f.write_str("Persistence::Sync"),
            Persistence::Async(_) => f.write_str("Persistence::Async"),
        }
    }
}
