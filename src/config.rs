//! Store configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::name::DIVIDER;

/// Which persistence backend a store uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Synchronous string-keyed table.
    #[default]
    Text,
    /// Asynchronous transactional object store.
    Transactional,
}

/// Settings for a [`Store`](crate::Store).
///
/// Every field has a default, so a TOML document only names what it changes:
///
/// ```
/// use cupboard::{BackendKind, Config};
///
/// let config = Config::from_toml_str(r#"
///     backend = "transactional"
///     namespace = "/dashboard"
/// "#).unwrap();
/// assert_eq!(config.backend, BackendKind::Transactional);
/// assert!(config.immutable_updates);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendKind,
    /// Separates this application's persisted keys from others sharing the
    /// backend. Defaults to the running executable's name.
    pub namespace: Option<String>,
    /// Copy arrays and objects on every write.
    pub immutable_updates: bool,
    /// Allow [`Store::inspect`](crate::Store::inspect) to expose the registry.
    pub expose_debug: bool,
    /// Back the text table with this file instead of memory.
    pub text_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Text,
            namespace: None,
            immutable_updates: true,
            expose_debug: false,
            text_path: None,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// The configured namespace, or the default one.
    pub fn resolved_namespace(&self) -> String {
        match &self.namespace {
            Some(namespace) if !namespace.is_empty() => namespace.clone(),
            _ => default_namespace(),
        }
    }
}

/// `/` followed by the executable's name, with any key divider in the
/// name replaced by `-`.
pub(crate) fn default_namespace() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| {
            path.file_stem()
                .map(|s| format!("/{}", s.to_string_lossy().replace(DIVIDER, "-")))
        })
        .unwrap_or_else(|| "/".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::validate_namespace;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.backend, BackendKind::Text);
        assert!(config.immutable_updates);
        assert!(!config.expose_debug);
        assert!(config.resolved_namespace().starts_with('/'));
        assert_eq!(validate_namespace(&config.resolved_namespace()), Ok(()));
    }

    #[test]
    fn empty_namespace_falls_back() {
        let config = Config {
            namespace: Some(String::new()),
            ..Config::default()
        };
        assert_eq!(config.resolved_namespace(), default_namespace());
    }

    #[test]
    fn parses_toml() {
        let config = Config::from_toml_str(
            r#"
            namespace = "/crypto"
            immutable_updates = false
            expose_debug = true
            text_path = "state/table.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.resolved_namespace(), "/crypto");
        assert!(!config.immutable_updates);
        assert!(config.expose_debug);
        assert_eq!(config.text_path, Some(PathBuf::from("state/table.json")));
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(Config::from_toml_str(r#"backend = "carrier-pigeon""#).is_err());
    }
}
