//! Dynamically shaped values held by store entries.

mod guard;
mod value;

pub use guard::ImmutabilityGuard;
pub use value::{Opaque, Value};
pub(crate) use value::number_to_json;
