use std::fmt;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt};

use crate::value::Value;

use super::entry::{Entry, Resolution};

/// Result of [`Store::get`](crate::Store::get).
///
/// Ready entries answer immediately. An entry still resolving hands back a
/// [`Pending`] future that yields the value once resolution settles.
///
/// ```
/// use std::future::IntoFuture;
///
/// use cupboard::{Declaration, Store, Value};
///
/// let store = Store::builder().namespace("/docs").build().unwrap();
/// store.create("greeting", Declaration::value("hello")).unwrap();
///
/// let value = futures::executor::block_on(store.get("greeting").unwrap().into_future());
/// assert_eq!(value, Value::from("hello"));
/// ```
pub enum Fetch {
    Ready(Value),
    Pending(Pending),
}

impl Fetch {
    pub(crate) fn pending(resolution: Resolution, entry: Arc<Entry>) -> Self {
        Fetch::Pending(Pending {
            future: async move {
                let mut resolution = resolution;
                // a queued reset may start a fresh resolution
                loop {
                    resolution.await;
                    match entry.resolution() {
                        Some(next) => resolution = next,
                        None => return entry.value(),
                    }
                }
            }
            .boxed(),
        })
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Fetch::Ready(_))
    }

    /// The value, when it is already available.
    pub fn ready(self) -> Option<Value> {
        match self {
            Fetch::Ready(value) => Some(value),
            Fetch::Pending(_) => None,
        }
    }
}

impl IntoFuture for Fetch {
    type Output = Value;
    type IntoFuture = BoxFuture<'static, Value>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Fetch::Ready(value) => futures::future::ready(value).boxed(),
            Fetch::Pending(pending) => pending.future,
        }
    }
}

impl fmt::Debug for Fetch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fetch::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Fetch::Pending(pending) => fmt::Debug::fmt(pending, f),
        }
    }
}

/// The value of an entry that is still resolving.
#[must_use = "futures do nothing unless awaited"]
pub struct Pending {
    future: BoxFuture<'static, Value>,
}

impl Future for Pending {
    type Output = Value;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Value> {
        self.future.as_mut().poll(cx)
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Pending(..)")
    }
}
