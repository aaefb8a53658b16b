use std::sync::Arc;

use super::Value;

/// Copy-on-write policy applied to every stored value.
///
/// When enabled, arrays and objects are shallow-copied into a fresh
/// allocation so that identity-based change detection sees every write.
/// Everything else passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImmutabilityGuard {
    enabled: bool,
}

impl ImmutabilityGuard {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn apply(&self, value: Value) -> Value {
        if !self.enabled {
            return value;
        }
        match value {
            Value::Array(items) => Value::Array(Arc::new(Vec::clone(&items))),
            Value::Object(members) => Value::Object(Arc::new((*members).clone())),
            other => other,
        }
    }
}

impl Default for ImmutabilityGuard {
    fn default() -> Self {
        Self::new(true)
    }
}
