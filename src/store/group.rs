use crate::error::{Error, Result};
use crate::name;
use crate::value::Value;

use super::access::Accessor;
use super::entry::{Declaration, Subscription};
use super::fetch::Fetch;
use super::store::ListOptions;
use super::Store;

/// Operations scoped to one group; leaf names are relative to it.
///
/// ```
/// use cupboard::{Declaration, Store, Value};
///
/// let store = Store::builder().namespace("/docs").build().unwrap();
/// let crypto = store.group("crypto").unwrap();
/// crypto.create("comment", Declaration::value("")).unwrap();
/// crypto.set("comment", "to the moon").unwrap();
///
/// assert_eq!(
///     store.get("crypto_comment").unwrap().ready(),
///     Some(Value::from("to the moon")),
/// );
/// ```
#[derive(Debug, Clone)]
pub struct Group {
    store: Store,
    name: String,
}

impl Group {
    pub(crate) fn new(store: Store, name: &str) -> Result<Self> {
        let name = name::canonical_group(name).map_err(|reason| Error::InvalidName {
            name: name.to_owned(),
            reason,
        })?;
        Ok(Self { store, name })
    }

    /// Canonical dotted group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn member(&self, leaf: &str) -> String {
        format!("{}.{leaf}", self.name)
    }

    pub fn subgroup(&self, name: &str) -> Result<Group> {
        Group::new(self.store.clone(), &self.member(name))
    }

    pub fn create(&self, leaf: &str, declaration: Declaration) -> Result<name::QualifiedName> {
        self.store.create(&self.member(leaf), declaration)
    }

    pub fn get(&self, leaf: &str) -> Result<Fetch> {
        self.store.get(&self.member(leaf))
    }

    pub fn set(&self, leaf: &str, value: impl Into<Value>) -> Result<()> {
        self.store.set(&self.member(leaf), value)
    }

    /// See [`Store::update`]; `f` must not touch the same entry.
    pub fn update<F>(&self, leaf: &str, f: F) -> Result<()>
    where
        F: FnOnce(&Value) -> Value + Send + 'static,
    {
        self.store.update(&self.member(leaf), f)
    }

    pub fn subscribe<F>(&self, leaf: &str, listener: F) -> Result<Subscription>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.store.subscribe(&self.member(leaf), listener)
    }

    pub fn read<F>(&self, leaf: &str, on_change: F) -> Result<Accessor>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.store.read(&self.member(leaf), on_change)
    }

    pub fn list(&self, options: ListOptions) -> Result<Vec<String>> {
        self.store.list(Some(&self.name), options)
    }

    pub fn reset(&self, leaf: &str, with: Option<Value>) -> Result<()> {
        self.store.reset(&self.member(leaf), with)
    }

    /// Reset this group's entries, subgroups included.
    pub fn reset_all(&self, with: Option<Value>) {
        let prefix = format!("{}.", self.name);
        self.store.reset_where(with, |name| {
            name.group() == self.name || name.group().starts_with(&prefix)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        Store::builder().namespace("/group").build().unwrap()
    }

    #[test]
    fn members_resolve_under_the_group() {
        let store = store();
        let crypto = store.group("crypto").unwrap();
        let name = crypto.create("data", Declaration::value("{}")).unwrap();
        assert_eq!(name.group(), "crypto");
        assert_eq!(name.leaf(), "data");

        let feed = crypto.subgroup("feed").unwrap();
        assert_eq!(feed.name(), "crypto.feed");
        feed.create("live", Declaration::value(false)).unwrap();

        let mut names = crypto.list(ListOptions::default()).unwrap();
        names.sort();
        assert_eq!(names, vec!["data", "feed_live"]);
        assert_eq!(crypto.list(ListOptions::direct()).unwrap(), vec!["data"]);
    }

    #[test]
    fn reset_all_stays_inside_the_group() {
        let store = store();
        let crypto = store.group("crypto").unwrap();
        crypto.create("comment", Declaration::value("")).unwrap();
        crypto.subgroup("feed").unwrap().create("live", Declaration::value(false)).unwrap();
        store.create("cryptography_note", Declaration::value("")).unwrap();
        store.create("theme", Declaration::value("light")).unwrap();

        crypto.set("comment", "hodl").unwrap();
        store.set("crypto_feed_live", true).unwrap();
        store.set("cryptography_note", "aes").unwrap();
        store.set("theme", "dark").unwrap();

        crypto.reset_all(None);
        assert_eq!(crypto.get("comment").unwrap().ready(), Some(Value::from("")));
        assert_eq!(store.get("crypto_feed_live").unwrap().ready(), Some(Value::from(false)));
        assert_eq!(store.get("cryptography_note").unwrap().ready(), Some(Value::from("aes")));
        assert_eq!(store.get("theme").unwrap().ready(), Some(Value::from("dark")));
    }

    #[test]
    fn rejects_invalid_group_names() {
        assert!(matches!(
            store().group("crypto data"),
            Err(Error::InvalidName { .. })
        ));
    }
}
