//! The process-wide store.
//!
//! Configure it once at startup with [`configure`]; afterwards every caller
//! reaches the same registry through [`store`].

use std::sync::OnceLock;

use crate::config::{default_namespace, Config};
use crate::error::{Error, Result};
use crate::persist::{MemoryTable, Persistence};
use crate::store::Store;

static STORE: OnceLock<Store> = OnceLock::new();

/// Install the process-wide store.
///
/// Fails with [`Error::ConfigurationAlreadySet`] on a second call, and also
/// after [`store`] has already created the default instance.
pub fn configure(config: Config) -> Result<Store> {
    if STORE.get().is_some() {
        return Err(Error::ConfigurationAlreadySet);
    }
    let store = Store::from_config(config)?;
    STORE
        .set(store.clone())
        .map_err(|_| Error::ConfigurationAlreadySet)?;
    tracing::info!(namespace = %store.namespace(), "global store configured");
    Ok(store)
}

/// The process-wide store, created with defaults if never configured.
pub fn store() -> &'static Store {
    STORE.get_or_init(|| {
        Store::assemble(
            &Config::default(),
            default_namespace(),
            Persistence::text(MemoryTable::new()),
        )
    })
}

pub fn is_configured() -> bool {
    STORE.get().is_some()
}
