use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::codec;
use crate::error::BackendResult;
use crate::value::Value;

use super::SyncBackend;

/// A flat string-to-string table.
pub trait TextTable: Send + Sync {
    fn get_item(&self, key: &str) -> BackendResult<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> BackendResult<()>;

    fn remove_item(&self, key: &str) -> BackendResult<()>;

    fn keys(&self) -> BackendResult<Vec<String>>;
}

impl<T: TextTable + ?Sized> TextTable for Arc<T> {
    fn get_item(&self, key: &str) -> BackendResult<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> BackendResult<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> BackendResult<()> {
        (**self).remove_item(key)
    }

    fn keys(&self) -> BackendResult<Vec<String>> {
        (**self).keys()
    }
}

/// In-memory table. Clones share the same items.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    items: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TextTable for MemoryTable {
    fn get_item(&self, key: &str) -> BackendResult<Option<String>> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> BackendResult<()> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> BackendResult<()> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }

    fn keys(&self) -> BackendResult<Vec<String>> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        Ok(items.keys().cloned().collect())
    }
}

/// Table kept as a JSON object in a file, rewritten on every change.
///
/// The file is loaded once when the table is opened.
#[derive(Debug)]
pub struct FileTable {
    path: PathBuf,
    items: RwLock<BTreeMap<String, String>>,
}

impl FileTable {
    pub fn open(path: impl Into<PathBuf>) -> BackendResult<Self> {
        let path = path.into();
        let items = match fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            items: RwLock::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, items: &BTreeMap<String, String>) -> BackendResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let staged = self.path.with_extension("tmp");
        fs::write(&staged, serde_json::to_vec_pretty(items)?)?;
        fs::rename(&staged, &self.path)?;
        Ok(())
    }
}

impl TextTable for FileTable {
    fn get_item(&self, key: &str) -> BackendResult<Option<String>> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> BackendResult<()> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_owned(), value.to_owned());
        self.flush(&items)
    }

    fn remove_item(&self, key: &str) -> BackendResult<()> {
        let mut items = self.items.write().unwrap_or_else(PoisonError::into_inner);
        if items.remove(key).is_some() {
            self.flush(&items)?;
        }
        Ok(())
    }

    fn keys(&self) -> BackendResult<Vec<String>> {
        let items = self.items.read().unwrap_or_else(PoisonError::into_inner);
        Ok(items.keys().cloned().collect())
    }
}

/// Synchronous backend over a text table.
pub struct TextBackend {
    table: Box<dyn TextTable>,
}

impl TextBackend {
    pub fn new(table: impl TextTable + 'static) -> Self {
        Self {
            table: Box::new(table),
        }
    }

    /// The raw stored text for `key`.
    pub fn raw(&self, key: &str) -> BackendResult<Option<String>> {
        self.table.get_item(key)
    }
}

impl SyncBackend for TextBackend {
    fn load(&self, key: &str) -> BackendResult<Option<Value>> {
        match self.table.get_item(key)? {
            Some(text) => Ok(Some(codec::decode(&text)?)),
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, value: &Value) -> BackendResult<()> {
        let text = codec::encode(value)?;
        self.table.set_item(key, &text)
    }

    fn list_keys(&self, prefix: &str) -> BackendResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .table
            .keys()?
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect();
        keys.sort();
        Ok(keys)
    }

    fn remove_all(&self, prefix: &str) -> BackendResult<()> {
        for key in self.list_keys(prefix)? {
            self.table.remove_item(&key)?;
        }
        Ok(())
    }
}
