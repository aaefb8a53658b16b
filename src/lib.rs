//! # Cupboard
//!
//! Named reactive global state with lazy initialization and pluggable
//! persistence.
//!
//! Unrelated parts of an application share values by name through a
//! [`Store`]. Every entry:
//!
//! - resolves its first value lazily, from a literal, a producer or an async
//!   producer, on the first read, write or subscription
//! - notifies its listeners synchronously after each write
//! - optionally persists through a synchronous text table or an asynchronous
//!   transactional database, and reloads from it on the next start
//!
//! ## Names
//!
//! `crypto_data` and `crypto.data` both name the leaf `data` in the group
//! `crypto`. Names without a separator land in the `ungrouped` group.
//!
//! ## Example
//!
//! ```
//! use cupboard::{Declaration, Store, Value};
//!
//! let store = Store::builder().namespace("/example").build().unwrap();
//! store.create("crypto_comment", Declaration::value("").persist(true)).unwrap();
//!
//! let _subscription = store
//!     .subscribe("crypto_comment", || println!("comment changed"))
//!     .unwrap();
//! store.set("crypto_comment", "steady").unwrap();
//!
//! assert_eq!(store.get("crypto_comment").unwrap().ready(), Some(Value::from("steady")));
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod global;
pub mod name;
pub mod persist;
pub(crate) mod runtime;
pub mod store;
pub mod value;

// Re-export main types for convenience
pub use config::{BackendKind, Config};
pub use error::{BackendError, Error, Result};
pub use name::QualifiedName;
pub use persist::Persistence;
pub use store::{
    Accessor, Declaration, EntrySnapshot, Fetch, Group, InitSpec, ListOptions, Pending, Readiness,
    Ready, Setter, Store, StoreBuilder, Subscription, Update,
};
pub use value::{ImmutabilityGuard, Opaque, Value};
