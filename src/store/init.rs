//! Lazy resolution of an entry's first value.
//!
//! Runs once per entry, on the first read, write or subscription:
//!
//! 1. A persisted entry on the synchronous backend loads immediately. A hit
//!    makes the entry ready without writing the value back.
//! 2. A persisted entry on the asynchronous backend always loads
//!    asynchronously and stays resolving until the load settles. A stored
//!    `undefined` counts as a miss there.
//! 3. Otherwise, or on a miss, the declaration is evaluated and the result
//!    is persisted when the entry is persisted.
//!
//! Writes and resets issued while an entry resolves are queued. The queue
//! is drained into the resolved value under the entry lock, before the
//! entry turns ready, so any write issued afterwards lands on top of it.

use std::mem;
use std::sync::{Arc, MutexGuard, Weak};

use futures::future::FutureExt;

use crate::persist::Persistence;
use crate::value::Value;

use super::entry::{Deferred, Entry, EntryState, InitSpec, Phase, Resolution, Update};
use super::store::StoreInner;
use super::Store;

pub(crate) enum Start {
    Ready,
    Pending(Resolution),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Persisted,
    Declared,
}

impl Store {
    /// Make sure the entry has begun resolving, and report whether it is ready.
    pub(crate) fn initialize(&self, entry: &Arc<Entry>) -> Start {
        let mut state = entry.state();
        match &state.phase {
            Phase::Ready => return Start::Ready,
            Phase::Resolving(resolution) => return Start::Pending(resolution.clone()),
            Phase::Uninitialized => {}
        }

        if entry.persist() {
            match &self.inner.persistence {
                Persistence::Sync(backend) => match backend.load(entry.key()) {
                    Ok(Some(value)) => {
                        self.install(entry, state, value, Origin::Persisted);
                        return Start::Ready;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(key = %entry.key(), error = %e, "ignoring unreadable persisted value");
                    }
                },
                Persistence::Async(_) => {
                    return Start::Pending(self.begin_resolution(entry, &mut state, true));
                }
            }
        }

        self.evaluate(entry, state)
    }

    /// Evaluate the declaration, skipping any persisted copy.
    pub(crate) fn evaluate(&self, entry: &Arc<Entry>, mut state: MutexGuard<'_, EntryState>) -> Start {
        let value = match entry.init() {
            InitSpec::Literal(value) => value.clone(),
            InitSpec::SyncProducer(produce) => produce(),
            InitSpec::AsyncProducer(_) => {
                return Start::Pending(self.begin_resolution(entry, &mut state, false));
            }
        };
        self.install(entry, state, value, Origin::Declared);
        Start::Ready
    }

    fn begin_resolution(&self, entry: &Arc<Entry>, state: &mut EntryState, load_first: bool) -> Resolution {
        tracing::debug!(key = %entry.key(), load_first, "resolving entry");
        let resolution = resolve(Arc::downgrade(&self.inner), Arc::clone(entry), load_first)
            .boxed()
            .shared();
        state.phase = Phase::Resolving(resolution.clone());
        self.inner.background.spawn(resolution.clone());
        resolution
    }

    /// Store the first value, replay queued work, then mark the entry ready.
    ///
    /// Listeners hear once for the installed value and once per replayed
    /// write. If a queued reset needs the async producer again, the entry
    /// starts resolving anew and keeps the rest of the queue; persisting
    /// waits for that resolution.
    pub(crate) fn install(
        &self,
        entry: &Arc<Entry>,
        mut state: MutexGuard<'_, EntryState>,
        value: Value,
        origin: Origin,
    ) {
        if origin == Origin::Declared {
            state.initial = Some(value.clone());
        }
        state.value = self.inner.guard.apply(value);

        let mut replayed = 0;
        let mut restarted = false;
        let mut queue = mem::take(&mut state.deferred).into_iter();
        while let Some(item) = queue.next() {
            let next = match item {
                Deferred::Write(Update::Replace(value)) => value,
                Deferred::Write(Update::Apply(f)) => f(&state.value),
                Deferred::Reset => match declared(entry, &mut state) {
                    Some(value) => value,
                    None => {
                        self.begin_resolution(entry, &mut state, false);
                        state.deferred = queue.collect();
                        restarted = true;
                        break;
                    }
                },
            };
            state.value = self.inner.guard.apply(next);
            replayed += 1;
        }
        if !restarted {
            state.phase = Phase::Ready;
        }
        drop(state);

        tracing::debug!(key = %entry.key(), ?origin, replayed, restarted, "entry installed");
        for _ in 0..=replayed {
            entry.notify();
        }
        if entry.persist() && !restarted && (origin == Origin::Declared || replayed > 0) {
            self.persist(entry, entry.value());
        }
    }
}

/// The declared value, evaluating a literal or sync producer on demand.
/// `None` when only the async producer can supply it.
fn declared(entry: &Entry, state: &mut EntryState) -> Option<Value> {
    if let Some(initial) = &state.initial {
        return Some(initial.clone());
    }
    let value = match entry.init() {
        InitSpec::Literal(value) => value.clone(),
        InitSpec::SyncProducer(produce) => produce(),
        InitSpec::AsyncProducer(_) => return None,
    };
    state.initial = Some(value.clone());
    Some(value)
}

fn upgrade(store: &Weak<StoreInner>, entry: &Entry) -> Option<Store> {
    match store.upgrade() {
        Some(inner) => Some(Store { inner }),
        None => {
            tracing::warn!(key = %entry.key(), "store dropped before the entry resolved");
            None
        }
    }
}

async fn resolve(store: Weak<StoreInner>, entry: Arc<Entry>, load_first: bool) {
    if load_first {
        let Some(persistence) = upgrade(&store, &entry).map(|s| s.inner.persistence.clone()) else {
            return;
        };
        if let Persistence::Async(backend) = persistence {
            match backend.load(entry.key()).await {
                Ok(Some(value)) if !value.is_undefined() => {
                    if let Some(store) = upgrade(&store, &entry) {
                        store.install(&entry, entry.state(), value, Origin::Persisted);
                    }
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(key = %entry.key(), error = %e, "persisted value unavailable, using declared value");
                }
            }
        }
    }

    let value = match entry.init() {
        InitSpec::Literal(value) => value.clone(),
        InitSpec::SyncProducer(produce) => produce(),
        InitSpec::AsyncProducer(produce) => produce().await,
    };
    if let Some(store) = upgrade(&store, &entry) {
        store.install(&entry, entry.state(), value, Origin::Declared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryDatabase;
    use crate::store::Declaration;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transactional(database: &MemoryDatabase) -> Store {
        Store::builder()
            .namespace("/init")
            .persistence(Persistence::transactional(database.clone()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn queued_reset_reruns_the_async_producer() {
        let database = MemoryDatabase::new();
        let first = transactional(&database);
        first.create("quote", Declaration::value("stored").persist(true)).unwrap();
        assert_eq!(first.get("quote").unwrap().await, Value::from("stored"));
        first.settle().await;

        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let second = transactional(&database);
        second
            .create(
                "quote",
                Declaration::async_producer(move || {
                    r.fetch_add(1, Ordering::SeqCst);
                    async { Value::from("fresh") }
                })
                .persist(true),
            )
            .unwrap();

        let fetch = second.get("quote").unwrap();
        second.set("quote", "manual").unwrap();
        second.reset("quote", None).unwrap();
        second
            .update("quote", |v| Value::from(format!("{}!", v.as_str().unwrap_or_default())))
            .unwrap();

        assert_eq!(fetch.await, Value::from("fresh!"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        second.settle().await;

        let third = transactional(&database);
        third.create("quote", Declaration::value("unused").persist(true)).unwrap();
        assert_eq!(third.get("quote").unwrap().await, Value::from("fresh!"));
    }

    #[tokio::test]
    async fn queued_writes_land_before_listeners_run() {
        let store = Store::builder().namespace("/init-listen").build().unwrap();
        store
            .create(
                "quote",
                Declaration::async_producer(|| async {
                    tokio::task::yield_now().await;
                    Value::from(1)
                }),
            )
            .unwrap();

        let fetch = store.get("quote").unwrap();
        store.update("quote", |v| Value::from(v.as_f64().unwrap_or(0.0) + 1.0)).unwrap();

        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let handle = store.clone();
        let s = seen.clone();
        let _subscription = store
            .subscribe("quote", move || {
                s.lock().unwrap().push(handle.get("quote").unwrap().ready());
            })
            .unwrap();

        assert_eq!(fetch.await, Value::from(2));
        // both notifications see the replayed value, never the bare resolution
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some(Value::from(2)), Some(Value::from(2))]
        );
    }
}
