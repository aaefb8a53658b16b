use std::fmt;
use std::sync::Arc;

use crate::value::Value;

use super::entry::{Entry, Readiness, Subscription, Update};
use super::Store;

/// Readiness flag handed out with an accessor's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready {
    pub ready: bool,
}

/// A component's live binding to one entry.
///
/// Holds its change listener for as long as it lives; drop it when the
/// component goes away.
pub struct Accessor {
    setter: Setter,
    _subscription: Subscription,
}

impl Accessor {
    pub(crate) fn new(store: Store, entry: Arc<Entry>, subscription: Subscription) -> Self {
        Self {
            setter: Setter { store, entry },
            _subscription: subscription,
        }
    }

    /// Latest value; the placeholder until the entry is ready.
    pub fn value(&self) -> Value {
        self.setter.entry.value()
    }

    pub fn is_ready(&self) -> bool {
        self.setter.entry.readiness() == Readiness::Ready
    }

    pub fn setter(&self) -> Setter {
        self.setter.clone()
    }

    pub fn name(&self) -> String {
        self.setter.entry.name().to_string()
    }

    /// `(value, setter, ready)` in one call.
    pub fn parts(&self) -> (Value, Setter, Ready) {
        (
            self.value(),
            self.setter(),
            Ready {
                ready: self.is_ready(),
            },
        )
    }
}

impl fmt::Debug for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Accessor")
            .field("name", &self.setter.entry.name())
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Writes to the entry an [`Accessor`] is bound to.
#[derive(Clone)]
pub struct Setter {
    store: Store,
    entry: Arc<Entry>,
}

impl Setter {
    pub fn set(&self, value: impl Into<Value>) {
        self.store.write_entry(&self.entry, Update::Replace(value.into()));
    }

    /// Write `f(latest)`. `f` runs under the entry lock and must not read
    /// this entry.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&Value) -> Value + Send + 'static,
    {
        self.store.write_entry(&self.entry, Update::apply(f));
    }
}

impl fmt::Debug for Setter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Setter").field(self.entry.name()).finish()
    }
}
