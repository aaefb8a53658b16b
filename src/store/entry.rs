use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::future::{BoxFuture, FutureExt};

use crate::name::QualifiedName;
use crate::value::Value;

pub(crate) type Resolution = crate::runtime::Work;
pub(crate) type Listener = Arc<dyn Fn() + Send + Sync>;

type SyncProducer = Arc<dyn Fn() -> Value + Send + Sync>;
type AsyncProducer = Arc<dyn Fn() -> BoxFuture<'static, Value> + Send + Sync>;

/// Where an entry's first value comes from.
#[derive(Clone)]
pub enum InitSpec {
    Literal(Value),
    SyncProducer(SyncProducer),
    AsyncProducer(AsyncProducer),
}

impl fmt::Debug for InitSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitSpec::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            InitSpec::SyncProducer(_) => f.write_str("SyncProducer(..)"),
            InitSpec::AsyncProducer(_) => f.write_str("AsyncProducer(..)"),
        }
    }
}

/// What to register under a name: an initial value or producer, and whether
/// the value is persisted.
///
/// ```
/// use cupboard::{Declaration, Value};
///
/// let comment = Declaration::value("").persist(true);
/// let quotes = Declaration::async_producer(|| async { Value::from("{}") });
/// ```
#[derive(Debug, Clone)]
pub struct Declaration {
    pub(crate) init: InitSpec,
    pub(crate) persist: bool,
}

impl Declaration {
    pub fn value(value: impl Into<Value>) -> Self {
        Self::from_spec(InitSpec::Literal(value.into()))
    }

    /// Computed on first access, at most once per process.
    ///
    /// The producer runs while the entry is locked, so it must not read or
    /// write its own entry; doing so deadlocks.
    pub fn producer<F>(produce: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self::from_spec(InitSpec::SyncProducer(Arc::new(produce)))
    }

    /// Awaited on first access; the entry stays pending meanwhile.
    pub fn async_producer<F, Fut>(produce: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Value> + Send + 'static,
    {
        Self::from_spec(InitSpec::AsyncProducer(Arc::new(move || produce().boxed())))
    }

    pub fn from_spec(init: InitSpec) -> Self {
        Self {
            init,
            persist: false,
        }
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }
}

impl Default for Declaration {
    fn default() -> Self {
        Self::value(Value::Undefined)
    }
}

/// A write applied to an entry.
pub enum Update {
    Replace(Value),
    /// Receives the latest stored value, not one the caller read earlier.
    /// Runs while the entry is locked and must not touch the same entry.
    Apply(Box<dyn FnOnce(&Value) -> Value + Send>),
}

impl Update {
    pub fn apply<F>(update: F) -> Self
    where
        F: FnOnce(&Value) -> Value + Send + 'static,
    {
        Update::Apply(Box::new(update))
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Update::Replace(value)
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Replace(value) => f.debug_tuple("Replace").field(value).finish(),
            Update::Apply(_) => f.write_str("Apply(..)"),
        }
    }
}

/// Lifecycle of an entry's first value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Uninitialized,
    Resolving,
    Ready,
}

pub(crate) enum Phase {
    Uninitialized,
    Resolving(Resolution),
    Ready,
}

/// Work issued against an entry while it was resolving.
pub(crate) enum Deferred {
    Write(Update),
    /// Restore the declared value.
    Reset,
}

pub(crate) struct EntryState {
    pub(crate) phase: Phase,
    pub(crate) value: Value,
    /// Declared value once evaluated; what a plain reset restores.
    pub(crate) initial: Option<Value>,
    pub(crate) deferred: Vec<Deferred>,
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    slots: Vec<(u64, Listener)>,
}

/// One named slot in a store.
pub(crate) struct Entry {
    name: QualifiedName,
    key: String,
    init: InitSpec,
    persist: bool,
    state: Mutex<EntryState>,
    listeners: Mutex<Listeners>,
}

impl Entry {
    pub(crate) fn new(name: QualifiedName, key: String, declaration: Declaration) -> Self {
        Self {
            name,
            key,
            init: declaration.init,
            persist: declaration.persist,
            state: Mutex::new(EntryState {
                phase: Phase::Uninitialized,
                // neutral placeholder until the first value resolves
                value: Value::String(String::new()),
                initial: None,
                deferred: Vec::new(),
            }),
            listeners: Mutex::new(Listeners::default()),
        }
    }

    pub(crate) fn name(&self) -> &QualifiedName {
        &self.name
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn init(&self) -> &InitSpec {
        &self.init
    }

    pub(crate) fn persist(&self) -> bool {
        self.persist
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn value(&self) -> Value {
        self.state().value.clone()
    }

    pub(crate) fn readiness(&self) -> Readiness {
        match self.state().phase {
            Phase::Uninitialized => Readiness::Uninitialized,
            Phase::Resolving(_) => Readiness::Resolving,
            Phase::Ready => Readiness::Ready,
        }
    }

    /// The resolution in flight, if any.
    pub(crate) fn resolution(&self) -> Option<Resolution> {
        match &self.state().phase {
            Phase::Resolving(resolution) => Some(resolution.clone()),
            _ => None,
        }
    }

    /// Queue `item` if the entry is resolving; otherwise hand it back.
    pub(crate) fn defer_with<T>(&self, item: T, wrap: impl FnOnce(T) -> Deferred) -> Option<T> {
        let mut state = self.state();
        if matches!(state.phase, Phase::Resolving(_)) {
            state.deferred.push(wrap(item));
            None
        } else {
            Some(item)
        }
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn subscribe(self: &Arc<Self>, listener: Listener) -> Subscription {
        let mut listeners = self.listeners();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.slots.push((id, listener));
        Subscription {
            entry: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: u64) {
        self.listeners().slots.retain(|(slot, _)| *slot != id);
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners().slots.len()
    }

    /// Call every current listener once. No lock is held while they run.
    pub(crate) fn notify(&self) {
        let listeners: Vec<Listener> = self
            .listeners()
            .slots
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

/// Keeps a listener registered until dropped.
#[must_use = "dropping a Subscription removes its listener"]
pub struct Subscription {
    entry: Weak<Entry>,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.upgrade() {
            entry.unsubscribe(self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
