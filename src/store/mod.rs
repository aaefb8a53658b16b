//! The store engine.
//!
//! A [`Store`] maps qualified names to entries. Each entry resolves its
//! first value lazily, notifies its listeners synchronously after every
//! write, and forwards writes of persisted entries to the configured
//! backend.

mod access;
mod entry;
mod fetch;
mod group;
mod init;
mod store;

pub use access::{Accessor, Ready, Setter};
pub use entry::{Declaration, InitSpec, Readiness, Subscription, Update};
pub use fetch::{Fetch, Pending};
pub use group::Group;
pub use store::{EntrySnapshot, ListOptions, Store, StoreBuilder};
