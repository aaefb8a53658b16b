use std::collections::btree_map::{self, BTreeMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

use futures::future::FutureExt;

use crate::config::{BackendKind, Config};
use crate::error::{Error, Result};
use crate::name::{self, KeySpace, QualifiedName};
use crate::persist::{FileTable, MemoryDatabase, MemoryTable, Persistence};
use crate::runtime::Background;
use crate::value::{ImmutabilityGuard, Value};

use super::access::Accessor;
use super::entry::{Declaration, Deferred, Entry, Readiness, Resolution, Subscription, Update};
use super::fetch::Fetch;
use super::group::Group;
use super::init::Start;

pub(crate) struct StoreInner {
    pub(crate) namespace: String,
    pub(crate) keys: KeySpace,
    pub(crate) guard: ImmutabilityGuard,
    pub(crate) expose_debug: bool,
    pub(crate) persistence: Persistence,
    pub(crate) entries: RwLock<BTreeMap<String, Arc<Entry>>>,
    pub(crate) background: Background,
    /// Last asynchronous write; each new write waits for it.
    last_write: Mutex<Option<Resolution>>,
}

/// A registry of named reactive entries.
///
/// Cloning a store yields another handle on the same registry. Stores are
/// independent of one another, so tests can build as many as they like;
/// [`crate::global`] holds the process-wide one.
///
/// # Examples
///
/// ```
/// use cupboard::{Declaration, Store, Value};
///
/// let store = Store::builder().namespace("/docs").build().unwrap();
/// store.create("crypto_comment", Declaration::value("")).unwrap();
///
/// store.set("crypto_comment", "rising").unwrap();
/// let value = store.get("crypto.comment").unwrap().ready().unwrap();
/// assert_eq!(value, Value::from("rising"));
/// ```
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

/// Options for [`Store::list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Only list entries directly in the group.
    pub exclude_subgroups: bool,
}

impl ListOptions {
    pub fn direct() -> Self {
        Self {
            exclude_subgroups: true,
        }
    }
}

/// Point-in-time view of one entry, for debugging.
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub name: QualifiedName,
    pub key: String,
    pub readiness: Readiness,
    pub persist: bool,
    pub listeners: usize,
    pub value: Value,
}

/// Builds a [`Store`].
#[derive(Debug, Default)]
pub struct StoreBuilder {
    config: Config,
    persistence: Option<Persistence>,
}

impl StoreBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = Some(namespace.into());
        self
    }

    pub fn immutable_updates(mut self, enabled: bool) -> Self {
        self.config.immutable_updates = enabled;
        self
    }

    pub fn expose_debug(mut self, enabled: bool) -> Self {
        self.config.expose_debug = enabled;
        self
    }

    /// Persist through this backend instead of the configured default.
    pub fn persistence(mut self, persistence: Persistence) -> Self {
        self.config.backend = if persistence.is_async() {
            BackendKind::Transactional
        } else {
            BackendKind::Text
        };
        self.persistence = Some(persistence);
        self
    }

    pub fn build(self) -> Result<Store> {
        let persistence = match self.persistence {
            Some(persistence) => persistence,
            None => match (self.config.backend, &self.config.text_path) {
                (BackendKind::Text, Some(path)) => Persistence::text(FileTable::open(path)?),
                (BackendKind::Text, None) => Persistence::text(MemoryTable::new()),
                (BackendKind::Transactional, _) => Persistence::transactional(MemoryDatabase::new()),
            },
        };
        Store::with_persistence(&self.config, persistence)
    }
}

fn resolve(name: &str) -> Result<QualifiedName> {
    name::split(name).map_err(|reason| Error::InvalidName {
        name: name.to_owned(),
        reason,
    })
}

impl Store {
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    pub fn from_config(config: Config) -> Result<Store> {
        Store::builder().config(config).build()
    }

    /// Build a store over an already opened backend.
    ///
    /// Fails with [`Error::InvalidNamespace`] when the configured namespace
    /// contains the key divider.
    pub fn with_persistence(config: &Config, persistence: Persistence) -> Result<Store> {
        let namespace = config.resolved_namespace();
        name::validate_namespace(&namespace).map_err(|reason| Error::InvalidNamespace {
            namespace: namespace.clone(),
            reason,
        })?;
        Ok(Store::assemble(config, namespace, persistence))
    }

    pub(crate) fn assemble(config: &Config, namespace: String, persistence: Persistence) -> Store {
        if config.expose_debug {
            tracing::debug!(?config, %namespace, ?persistence, "store configured");
        }
        Store {
            inner: Arc::new(StoreInner {
                keys: KeySpace::new(&namespace),
                namespace,
                guard: ImmutabilityGuard::new(config.immutable_updates),
                expose_debug: config.expose_debug,
                persistence,
                entries: RwLock::default(),
                background: Background::default(),
                last_write: Mutex::default(),
            }),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.inner.namespace
    }

    pub fn key_space(&self) -> &KeySpace {
        &self.inner.keys
    }

    fn entries(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<Entry>>> {
        self.inner.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> Vec<Arc<Entry>> {
        self.entries().values().cloned().collect()
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<Arc<Entry>> {
        let key = self.inner.keys.full_key(&resolve(name)?);
        self.entries()
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_owned()))
    }

    /// Register a new entry and return its resolved name.
    ///
    /// Fails with [`Error::DuplicateName`] when the name is taken, whatever
    /// the declaration.
    pub fn create(&self, name: &str, declaration: Declaration) -> Result<QualifiedName> {
        let qualified = resolve(name)?;
        let key = self.inner.keys.full_key(&qualified);
        let mut entries = self.inner.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.entry(key) {
            btree_map::Entry::Occupied(_) => Err(Error::DuplicateName(qualified.to_string())),
            btree_map::Entry::Vacant(slot) => {
                tracing::debug!(key = %slot.key(), persist = declaration.persist, "entry registered");
                let entry = Entry::new(qualified.clone(), slot.key().clone(), declaration);
                slot.insert(Arc::new(entry));
                Ok(qualified)
            }
        }
    }

    /// Read an entry, resolving it on first access.
    pub fn get(&self, name: &str) -> Result<Fetch> {
        let entry = self.lookup(name)?;
        Ok(self.fetch(&entry))
    }

    pub(crate) fn fetch(&self, entry: &Arc<Entry>) -> Fetch {
        match self.initialize(entry) {
            Start::Ready => Fetch::Ready(entry.value()),
            Start::Pending(resolution) => Fetch::pending(resolution, Arc::clone(entry)),
        }
    }

    pub fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let entry = self.lookup(name)?;
        self.write_entry(&entry, Update::Replace(value.into()));
        Ok(())
    }

    /// Replace the value with `f(latest)`.
    ///
    /// `f` runs while the entry is locked, so it must not read or write the
    /// same entry; doing so deadlocks. Other entries are fine.
    pub fn update<F>(&self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&Value) -> Value + Send + 'static,
    {
        let entry = self.lookup(name)?;
        self.write_entry(&entry, Update::apply(f));
        Ok(())
    }

    pub(crate) fn write_entry(&self, entry: &Arc<Entry>, update: Update) {
        self.initialize(entry);
        if let Some(update) = entry.defer_with(update, Deferred::Write) {
            self.commit(entry, update);
        }
    }

    /// Apply a write to a ready entry: guard, store, notify, then persist.
    ///
    /// The latest value is persisted, so a write made by a listener is not
    /// overwritten by the one that triggered it.
    pub(crate) fn commit(&self, entry: &Entry, update: Update) {
        {
            let mut state = entry.state();
            let next = match update {
                Update::Replace(value) => value,
                Update::Apply(f) => f(&state.value),
            };
            state.value = self.inner.guard.apply(next);
        }
        entry.notify();
        if entry.persist() {
            self.persist(entry, entry.value());
        }
    }

    pub(crate) fn persist(&self, entry: &Entry, value: Value) {
        match &self.inner.persistence {
            Persistence::Sync(backend) => {
                if let Err(e) = backend.save(entry.key(), &value) {
                    tracing::warn!(key = %entry.key(), error = %e, "persistence write skipped");
                }
            }
            Persistence::Async(backend) => {
                let backend = Arc::clone(backend);
                let key = entry.key().to_owned();
                let mut last_write = self.inner.last_write.lock().unwrap_or_else(PoisonError::into_inner);
                let previous = last_write.take();
                let write = async move {
                    if let Some(previous) = previous {
                        previous.await;
                    }
                    if let Err(e) = backend.save(&key, &value).await {
                        tracing::warn!(key = %key, error = %e, "persistence write skipped");
                    }
                }
                .boxed()
                .shared();
                *last_write = Some(write.clone());
                drop(last_write);
                self.inner.background.spawn(write);
            }
        }
    }

    /// Register a listener, called after every write to the entry.
    pub fn subscribe<F>(&self, name: &str, listener: F) -> Result<Subscription>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let entry = self.lookup(name)?;
        let subscription = entry.subscribe(Arc::new(listener));
        self.initialize(&entry);
        Ok(subscription)
    }

    /// Bind a component to an entry; `on_change` runs after each write for
    /// as long as the accessor lives.
    pub fn read<F>(&self, name: &str, on_change: F) -> Result<Accessor>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let entry = self.lookup(name)?;
        self.initialize(&entry);
        let subscription = entry.subscribe(Arc::new(on_change));
        Ok(Accessor::new(self.clone(), entry, subscription))
    }

    pub fn readiness(&self, name: &str) -> Result<Readiness> {
        Ok(self.lookup(name)?.readiness())
    }

    /// Names registered under `group`, or every name when `group` is `None`.
    ///
    /// Names come back in underscored form relative to the group: direct
    /// members as `leaf`, members of subgroups as `sub_leaf`. Without a
    /// group, ungrouped entries show only their leaf.
    pub fn list(&self, group: Option<&str>, options: ListOptions) -> Result<Vec<String>> {
        let group = group
            .map(|g| {
                name::canonical_group(g).map_err(|reason| Error::InvalidName {
                    name: g.to_owned(),
                    reason,
                })
            })
            .transpose()?;
        Ok(self
            .entries()
            .values()
            .filter_map(|entry| listed_name(entry.name(), group.as_deref(), options))
            .collect())
    }

    /// Restore the declared value, or write `with` instead.
    pub fn reset(&self, name: &str, with: Option<Value>) -> Result<()> {
        let entry = self.lookup(name)?;
        self.reset_entry(&entry, with);
        Ok(())
    }

    pub fn reset_all(&self, with: Option<Value>) {
        self.reset_where(with, |_| true);
    }

    pub(crate) fn reset_where(&self, with: Option<Value>, matches: impl Fn(&QualifiedName) -> bool) {
        for entry in self.snapshot() {
            if matches(entry.name()) {
                self.reset_entry(&entry, with.clone());
            }
        }
    }

    pub(crate) fn reset_entry(&self, entry: &Arc<Entry>, with: Option<Value>) {
        if let Some(value) = with {
            self.write_entry(entry, Update::Replace(value));
            return;
        }
        if entry.defer_with((), |()| Deferred::Reset).is_none() {
            return;
        }
        let state = entry.state();
        match state.initial.clone() {
            Some(initial) => {
                drop(state);
                self.commit(entry, Update::Replace(initial));
            }
            None => {
                self.evaluate(entry, state);
            }
        }
    }

    /// Handle on a group of entries.
    pub fn group(&self, name: &str) -> Result<Group> {
        Group::new(self.clone(), name)
    }

    /// Persisted names of this namespace in `group.leaf` form.
    ///
    /// Reads the backend only; in-memory state is not consulted.
    pub async fn list_persisted_keys(&self) -> Result<Vec<String>> {
        let prefix = self.inner.keys.prefix();
        let keys = match &self.inner.persistence {
            Persistence::Sync(backend) => backend.list_keys(prefix)?,
            Persistence::Async(backend) => backend.list_keys(prefix).await?,
        };
        let mut names: Vec<String> = keys
            .iter()
            .filter_map(|key| self.inner.keys.parse(key))
            .map(|name| name.dotted())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Remove this namespace's persisted copies, leaving memory untouched.
    pub async fn remove_all_persisted(&self) -> Result<()> {
        let prefix = self.inner.keys.prefix();
        match &self.inner.persistence {
            Persistence::Sync(backend) => backend.remove_all(prefix)?,
            Persistence::Async(backend) => backend.remove_all(prefix).await?,
        }
        Ok(())
    }

    /// Wait for outstanding resolutions and persistence writes.
    pub async fn settle(&self) {
        self.inner.background.settle().await;
    }

    /// The registry, when the store was configured with `expose_debug`.
    pub fn inspect(&self) -> Option<Vec<EntrySnapshot>> {
        if !self.inner.expose_debug {
            return None;
        }
        let snapshots = self
            .snapshot()
            .into_iter()
            .map(|entry| EntrySnapshot {
                name: entry.name().clone(),
                key: entry.key().to_owned(),
                readiness: entry.readiness(),
                persist: entry.persist(),
                listeners: entry.listener_count(),
                value: entry.value(),
            })
            .collect();
        Some(snapshots)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("namespace", &self.inner.namespace)
            .field("persistence", &self.inner.persistence)
            .field("entries", &self.entries().len())
            .field("background", &self.inner.background.outstanding())
            .finish()
    }
}

fn listed_name(name: &QualifiedName, group: Option<&str>, options: ListOptions) -> Option<String> {
    match group {
        None if name.is_ungrouped() => Some(name.leaf().to_owned()),
        None => Some(name.to_string()),
        Some(group) if name.group() == group => Some(name.leaf().to_owned()),
        Some(_) if options.exclude_subgroups => None,
        Some(group) => {
            let sub = name.group().strip_prefix(group)?.strip_prefix('.')?;
            Some(format!("{}_{}", sub.replace('.', "_"), name.leaf()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> Store {
        Store::builder().namespace("/unit").build().unwrap()
    }

    #[test]
    fn create_returns_resolved_name() {
        let store = store();
        let name = store.create("crypto.data", Declaration::value("")).unwrap();
        assert_eq!(name.to_string(), "crypto_data");
    }

    #[test]
    fn duplicate_names_fail_whatever_the_declaration() {
        let store = store();
        store.create("crypto_data", Declaration::value("")).unwrap();
        let again = store.create("crypto.data", Declaration::value(1).persist(true));
        assert!(matches!(again, Err(Error::DuplicateName(_))));
    }

    #[test]
    fn unknown_and_invalid_names() {
        let store = store();
        assert!(matches!(store.get("missing"), Err(Error::NotFound(_))));
        assert!(matches!(
            store.create("bad name", Declaration::default()),
            Err(Error::InvalidName { .. })
        ));
        assert!(matches!(store.set("a__b", 1), Err(Error::InvalidName { .. })));
    }

    #[test]
    fn sync_producer_runs_once() {
        let store = store();
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        store
            .create(
                "app_seed",
                Declaration::producer(move || {
                    r.fetch_add(1, Ordering::SeqCst);
                    Value::from(7)
                }),
            )
            .unwrap();

        assert_eq!(store.readiness("app_seed").unwrap(), Readiness::Uninitialized);
        assert_eq!(store.get("app_seed").unwrap().ready(), Some(Value::from(7)));
        assert_eq!(store.get("app_seed").unwrap().ready(), Some(Value::from(7)));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn update_sees_latest_value() {
        let store = store();
        store.create("counter", Declaration::value(0)).unwrap();
        for _ in 0..3 {
            store
                .update("counter", |v| Value::from(v.as_f64().unwrap_or(0.0) + 1.0))
                .unwrap();
        }
        assert_eq!(store.get("counter").unwrap().ready(), Some(Value::from(3)));
    }

    #[test]
    fn listeners_fire_once_per_write() {
        let store = store();
        store.create("ui_theme", Declaration::value("light")).unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let subscription = store
            .subscribe("ui_theme", move || {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        // the first value arrives through the listener too
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        store.set("ui_theme", "dark").unwrap();
        store.set("ui_theme", "dim").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        drop(subscription);
        store.set("ui_theme", "light").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn listener_may_read_the_store() {
        let store = store();
        store.create("mirror_source", Declaration::value(1)).unwrap();
        store.create("mirror_copy", Declaration::value(0)).unwrap();

        let handle = store.clone();
        let _subscription = store
            .subscribe("mirror_source", move || {
                let latest = handle.get("mirror_source").unwrap().ready().unwrap();
                handle.set("mirror_copy", latest).unwrap();
            })
            .unwrap();

        store.set("mirror_source", 5).unwrap();
        assert_eq!(store.get("mirror_copy").unwrap().ready(), Some(Value::from(5)));
    }

    #[test]
    fn listing_by_group() {
        let store = store();
        for name in ["crypto_data", "crypto_comment", "crypto_feed_live", "theme", "ui_dark"] {
            store.create(name, Declaration::default()).unwrap();
        }

        let mut all = store.list(None, ListOptions::default()).unwrap();
        all.sort();
        assert_eq!(
            all,
            vec!["crypto_comment", "crypto_data", "crypto_feed_live", "theme", "ui_dark"]
        );

        let mut crypto = store.list(Some("crypto"), ListOptions::default()).unwrap();
        crypto.sort();
        assert_eq!(crypto, vec!["comment", "data", "feed_live"]);

        let mut direct = store.list(Some("crypto"), ListOptions::direct()).unwrap();
        direct.sort();
        assert_eq!(direct, vec!["comment", "data"]);

        assert_eq!(
            store.list(Some("crypto_feed"), ListOptions::default()).unwrap(),
            vec!["live"]
        );
        assert!(store.list(Some("cryp"), ListOptions::default()).unwrap().is_empty());
        assert!(store.list(Some("bad group"), ListOptions::default()).is_err());
    }

    #[test]
    fn reset_restores_declared_values() {
        let store = store();
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        store.create("form_title", Declaration::value("untitled")).unwrap();
        store
            .create(
                "form_tags",
                Declaration::producer(move || {
                    r.fetch_add(1, Ordering::SeqCst);
                    Value::array([Value::from("new")])
                }),
            )
            .unwrap();

        store.set("form_title", "draft").unwrap();
        store.set("form_tags", Value::from(Vec::<Value>::new())).unwrap();

        store.reset("form_title", None).unwrap();
        assert_eq!(store.get("form_title").unwrap().ready(), Some(Value::from("untitled")));

        store.reset_all(None);
        assert_eq!(
            store.get("form_tags").unwrap().ready(),
            Some(Value::array([Value::from("new")]))
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        store.reset_all(Some(Value::Null));
        assert_eq!(store.get("form_title").unwrap().ready(), Some(Value::Null));
        assert_eq!(store.get("form_tags").unwrap().ready(), Some(Value::Null));
    }

    #[test]
    fn reset_initializes_untouched_entries() {
        let store = store();
        store.create("lazy", Declaration::value(3)).unwrap();
        store.reset("lazy", None).unwrap();
        assert_eq!(store.readiness("lazy").unwrap(), Readiness::Ready);
        assert_eq!(store.get("lazy").unwrap().ready(), Some(Value::from(3)));
    }

    #[test]
    fn guard_controls_reference_identity() {
        let on = store();
        on.create("list", Declaration::value(Value::from(Vec::<Value>::new()))).unwrap();
        let shared = Value::array([Value::from(1)]);
        on.set("list", shared.clone()).unwrap();
        let first = on.get("list").unwrap().ready().unwrap();
        on.set("list", shared.clone()).unwrap();
        let second = on.get("list").unwrap().ready().unwrap();
        assert_eq!(first, second);
        assert!(!first.same_ref(&second));
        assert!(!first.same_ref(&shared));

        let off = Store::builder()
            .namespace("/unit-off")
            .immutable_updates(false)
            .build()
            .unwrap();
        off.create("list", Declaration::value(Value::from(Vec::<Value>::new()))).unwrap();
        off.set("list", shared.clone()).unwrap();
        let first = off.get("list").unwrap().ready().unwrap();
        off.set("list", shared.clone()).unwrap();
        let second = off.get("list").unwrap().ready().unwrap();
        assert!(first.same_ref(&second));
        assert!(first.same_ref(&shared));
    }

    #[test]
    fn namespaces_holding_the_divider_are_rejected() {
        let built = Store::builder().namespace("/a_::_b").build();
        assert!(matches!(
            built,
            Err(Error::InvalidNamespace {
                reason: name::NameError::ReservedDivider,
                ..
            })
        ));

        let config = Config {
            namespace: Some("/shop_::_cart".into()),
            ..Config::default()
        };
        assert!(Store::with_persistence(&config, Persistence::text(MemoryTable::new())).is_err());
        assert!(Store::builder().namespace("/a_b").build().is_ok());
    }

    #[test]
    fn listener_write_is_the_one_persisted() {
        let table = MemoryTable::new();
        let store = Store::builder()
            .namespace("/unit-nested")
            .persistence(Persistence::text(table.clone()))
            .build()
            .unwrap();
        store.create("ui_theme", Declaration::value("light").persist(true)).unwrap();
        store.get("ui_theme").unwrap();

        let handle = store.clone();
        let _subscription = store
            .subscribe("ui_theme", move || {
                if handle.get("ui_theme").unwrap().ready() == Some(Value::from("dark")) {
                    handle.set("ui_theme", "dim").unwrap();
                }
            })
            .unwrap();
        store.set("ui_theme", "dark").unwrap();

        let key = store.key_space().full_key(&name::split("ui_theme").unwrap());
        assert_eq!(
            crate::persist::TextTable::get_item(&table, &key).unwrap(),
            Some("\"dim\"".to_owned())
        );
    }

    #[test]
    fn inspect_requires_debug_exposure() {
        let hidden = store();
        assert!(hidden.inspect().is_none());

        let exposed = Store::builder()
            .namespace("/unit-debug")
            .expose_debug(true)
            .build()
            .unwrap();
        exposed.create("sample", Declaration::value(1)).unwrap();
        let snapshot = exposed.inspect().unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].readiness, Readiness::Uninitialized);
        assert!(snapshot[0].key.ends_with("sample"));
    }
}
