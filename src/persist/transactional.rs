use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{BackendError, BackendResult};
use crate::value::Value;

use super::AsyncBackend;

/// Name of the single object store every operation opens.
pub const OBJECT_STORE: &str = "entries";

/// A stored record, keyed by `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub value: Value,
}

/// Range over record names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Bound<String>,
    pub upper: Bound<String>,
}

impl KeyRange {
    /// Every name starting with `prefix`.
    pub fn prefix(prefix: &str) -> Self {
        Self {
            lower: Bound::Included(prefix.to_owned()),
            upper: Bound::Excluded(format!("{prefix}{}", char::MAX)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        let above = match &self.lower {
            Bound::Included(l) => name >= l.as_str(),
            Bound::Excluded(l) => name > l.as_str(),
            Bound::Unbounded => true,
        };
        let below = match &self.upper {
            Bound::Included(u) => name <= u.as_str(),
            Bound::Excluded(u) => name < u.as_str(),
            Bound::Unbounded => true,
        };
        above && below
    }
}

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ReadOnly,
    ReadWrite,
}

/// One request, issued as its own transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Get(String),
    List,
    Match(KeyRange),
    Put(Record),
    Delete(String),
    Clear,
}

impl Request {
    pub fn mode(&self) -> Mode {
        match self {
            Request::Get(_) | Request::List | Request::Match(_) => Mode::ReadOnly,
            Request::Put(_) | Request::Delete(_) | Request::Clear => Mode::ReadWrite,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Value(Option<Value>),
    Records(Vec<Record>),
    Done,
}

/// A transactional database holding named object stores.
#[async_trait]
pub trait Database: Send + Sync {
    async fn open(&self, store: &str) -> BackendResult<Box<dyn Connection>>;
}

/// An open handle on one object store.
#[async_trait]
pub trait Connection: Send {
    async fn execute(&mut self, request: Request) -> BackendResult<Response>;
}

/// In-process database.
///
/// Clones share their records, so handing a clone to a second store
/// behaves like reopening the same database after a restart.
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    stores: Arc<RwLock<BTreeMap<String, Arc<RwLock<BTreeMap<String, Value>>>>>>,
    available: Arc<AtomicBool>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            stores: Arc::default(),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Make every subsequent `open` fail (or succeed again).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn open(&self, store: &str) -> BackendResult<Box<dyn Connection>> {
        tokio::task::yield_now().await;
        if !self.available.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable(format!(
                "cannot open object store {store:?}"
            )));
        }
        let records = {
            let mut stores = self.stores.write().await;
            Arc::clone(stores.entry(store.to_owned()).or_default())
        };
        Ok(Box::new(MemoryConnection { records }))
    }
}

struct MemoryConnection {
    records: Arc<RwLock<BTreeMap<String, Value>>>,
}

fn to_records<'a>(items: impl Iterator<Item = (&'a String, &'a Value)>) -> Vec<Record> {
    items
        .map(|(name, value)| Record {
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&mut self, request: Request) -> BackendResult<Response> {
        let response = match request {
            Request::Get(name) => Response::Value(self.records.read().await.get(&name).cloned()),
            Request::List => Response::Records(to_records(self.records.read().await.iter())),
            Request::Match(range) => {
                let records = self.records.read().await;
                Response::Records(to_records(
                    records.range((range.lower.clone(), range.upper.clone())),
                ))
            }
            Request::Put(record) => {
                self.records.write().await.insert(record.name, record.value);
                Response::Done
            }
            Request::Delete(name) => {
                self.records.write().await.remove(&name);
                Response::Done
            }
            Request::Clear => {
                self.records.write().await.clear();
                Response::Done
            }
        };
        tokio::task::yield_now().await;
        Ok(response)
    }
}

/// Asynchronous backend over a [`Database`].
///
/// Values are stored structurally, so no text encoding is involved and a
/// stored `undefined` loads back as such.
pub struct TransactionalBackend {
    database: Box<dyn Database>,
}

impl TransactionalBackend {
    pub fn new(database: impl Database + 'static) -> Self {
        Self {
            database: Box::new(database),
        }
    }

    async fn run(&self, request: Request) -> BackendResult<Response> {
        let mut connection = self.database.open(OBJECT_STORE).await?;
        connection.execute(request).await
    }

    /// Every record in the object store, across all namespaces.
    pub async fn records(&self) -> BackendResult<Vec<Record>> {
        match self.run(Request::List).await? {
            Response::Records(records) => Ok(records),
            other => Err(unexpected(&other)),
        }
    }

    /// Records whose names fall in `range`.
    pub async fn matching(&self, range: KeyRange) -> BackendResult<Vec<Record>> {
        match self.run(Request::Match(range)).await? {
            Response::Records(records) => Ok(records),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn remove(&self, key: &str) -> BackendResult<()> {
        self.run(Request::Delete(key.to_owned())).await.map(drop)
    }

    /// Drop every record in the object store, across all namespaces.
    pub async fn clear(&self) -> BackendResult<()> {
        self.run(Request::Clear).await.map(drop)
    }
}

fn unexpected(response: &Response) -> BackendError {
    BackendError::Transaction(format!("unexpected response {response:?}"))
}

#[async_trait]
impl AsyncBackend for TransactionalBackend {
    async fn load(&self, key: &str) -> BackendResult<Option<Value>> {
        match self.run(Request::Get(key.to_owned())).await? {
            Response::Value(value) => Ok(value),
            other => Err(unexpected(&other)),
        }
    }

    async fn save(&self, key: &str, value: &Value) -> BackendResult<()> {
        let record = Record {
            name: key.to_owned(),
            value: value.clone(),
        };
        self.run(Request::Put(record)).await.map(drop)
    }

    async fn list_keys(&self, prefix: &str) -> BackendResult<Vec<String>> {
        let records = self.matching(KeyRange::prefix(prefix)).await?;
        Ok(records.into_iter().map(|r| r.name).collect())
    }

    async fn remove_all(&self, prefix: &str) -> BackendResult<()> {
        for key in self.list_keys(prefix).await? {
            self.remove(&key).await?;
        }
        Ok(())
    }
}
