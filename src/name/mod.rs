//! Name validation and canonicalization.
//!
//! Callers name entries as `group_leaf` or `group.leaf`; both spell the same
//! entry. Groups may nest (`app.settings.theme`), and a name without any
//! delimiter lands in the [`UNGROUPED`] group.

mod resolver;

pub use resolver::{
    canonical_group, split, validate, validate_namespace, KeySpace, NameError, QualifiedName,
    DIVIDER, KEY_PREFIX, UNGROUPED,
};
