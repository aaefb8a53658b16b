use std::fmt;

/// Group assigned to names that carry no delimiter.
pub const UNGROUPED: &str = "ungrouped";

/// Token separating namespace, group and leaf inside a storage key.
///
/// Contains `_`, which canonical names never do.
pub const DIVIDER: &str = "_::_";

/// Marks keys owned by this crate inside a shared backend.
pub const KEY_PREFIX: &str = "#cupboard_::_";

const USER_DELIMITER: char = '_';
const SEPARATOR: char = '.';

/// Why a name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("name is empty")]
    Empty,

    #[error("name contains whitespace")]
    Whitespace,

    #[error("name has a blank segment (leading, trailing or doubled delimiter)")]
    BlankSegment,

    #[error("namespace contains the key divider {DIVIDER:?}")]
    ReservedDivider,
}

/// Check a user-supplied name without resolving it.
pub fn validate(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.chars().any(char::is_whitespace) {
        return Err(NameError::Whitespace);
    }
    if canonicalize(name).split(SEPARATOR).any(str::is_empty) {
        return Err(NameError::BlankSegment);
    }
    Ok(())
}

/// Check a namespace. Any text goes except the key divider, which would
/// let keys of one namespace parse as keys of another.
pub fn validate_namespace(namespace: &str) -> Result<(), NameError> {
    if namespace.contains(DIVIDER) {
        return Err(NameError::ReservedDivider);
    }
    Ok(())
}

/// Resolve a name into its group and leaf.
///
/// ```
/// use cupboard::name::{split, UNGROUPED};
///
/// let name = split("crypto_data").unwrap();
/// assert_eq!(name.group(), "crypto");
/// assert_eq!(name.leaf(), "data");
///
/// assert_eq!(split("theme").unwrap().group(), UNGROUPED);
/// ```
pub fn split(name: &str) -> Result<QualifiedName, NameError> {
    validate(name)?;
    let canonical = canonicalize(name);
    let (group, leaf) = match canonical.rsplit_once(SEPARATOR) {
        Some((group, leaf)) => (group.to_owned(), leaf.to_owned()),
        None => (UNGROUPED.to_owned(), canonical),
    };
    Ok(QualifiedName { group, leaf })
}

/// Validate and canonicalize a group name (`a_b` becomes `a.b`).
pub fn canonical_group(name: &str) -> Result<String, NameError> {
    validate(name)?;
    Ok(canonicalize(name))
}

fn canonicalize(name: &str) -> String {
    name.replace(USER_DELIMITER, ".")
}

/// A resolved `(group, leaf)` pair.
///
/// Displays in the underscored form accepted by every store operation, so
/// the display string resolves back to the same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    group: String,
    leaf: String,
}

impl QualifiedName {
    /// Group path in canonical dotted form.
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn leaf(&self) -> &str {
        &self.leaf
    }

    pub fn is_ungrouped(&self) -> bool {
        self.group == UNGROUPED
    }

    /// Dotted form, as shown when listing persisted keys.
    pub fn dotted(&self) -> String {
        format!("{}{SEPARATOR}{}", self.group, self.leaf)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{USER_DELIMITER}{}",
            self.group.replace(SEPARATOR, "_"),
            self.leaf
        )
    }
}

/// Derives storage keys for one application namespace.
///
/// Keys look like `<KEY_PREFIX><namespace><DIVIDER><group><DIVIDER><leaf>`,
/// which keeps unrelated applications sharing a backend apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(namespace: &str) -> Self {
        Self {
            prefix: format!("{KEY_PREFIX}{namespace}{DIVIDER}"),
        }
    }

    /// Prefix shared by every key of this namespace.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn full_key(&self, name: &QualifiedName) -> String {
        format!("{}{}{DIVIDER}{}", self.prefix, name.group, name.leaf)
    }

    /// Recover the name from a key of this namespace.
    pub fn parse(&self, key: &str) -> Option<QualifiedName> {
        let rest = key.strip_prefix(&self.prefix)?;
        let (group, leaf) = rest.split_once(DIVIDER)?;
        if group.is_empty() || leaf.is_empty() {
            return None;
        }
        Some(QualifiedName {
            group: group.to_owned(),
            leaf: leaf.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn underscore_and_dot_resolve_alike() {
        assert_eq!(split("crypto_data").unwrap(), split("crypto.data").unwrap());
    }

    #[test]
    fn last_delimiter_splits_group() {
        let name = split("app_settings_theme").unwrap();
        assert_eq!(name.group(), "app.settings");
        assert_eq!(name.leaf(), "theme");
        assert_eq!(name.to_string(), "app_settings_theme");
        assert_eq!(name.dotted(), "app.settings.theme");
    }

    #[test]
    fn bare_name_is_ungrouped() {
        let name = split("test").unwrap();
        assert!(name.is_ungrouped());
        assert_eq!(split("ungrouped_test").unwrap(), name);
    }

    #[test]
    fn rejects_malformed_names() {
        assert_eq!(validate(""), Err(NameError::Empty));
        assert_eq!(validate("crypto data"), Err(NameError::Whitespace));
        assert_eq!(validate("tab\tname"), Err(NameError::Whitespace));
        assert_eq!(validate("_data"), Err(NameError::BlankSegment));
        assert_eq!(validate("data_"), Err(NameError::BlankSegment));
        assert_eq!(validate("crypto__data"), Err(NameError::BlankSegment));
        assert_eq!(validate("crypto._data"), Err(NameError::BlankSegment));
        assert!(split("a..b").is_err());
    }

    #[test]
    fn key_space_round_trips() {
        let keys = KeySpace::new("/demo");
        let name = split("crypto_data").unwrap();
        let key = keys.full_key(&name);
        assert!(key.starts_with(KEY_PREFIX));
        assert!(key.starts_with(keys.prefix()));
        assert_eq!(keys.parse(&key), Some(name));
        assert_eq!(KeySpace::new("/other").parse(&key), None);
    }

    #[test]
    fn namespaces_may_not_hold_the_divider() {
        assert_eq!(validate_namespace("/crypto-board"), Ok(()));
        assert_eq!(validate_namespace(""), Ok(()));
        assert_eq!(validate_namespace("/a_b::c"), Ok(()));
        assert_eq!(validate_namespace("/a_::_b"), Err(NameError::ReservedDivider));

        // "/a" owns every key starting with its prefix
        let nested = KeySpace::new("/a_::_b").full_key(&split("c_d").unwrap());
        assert!(nested.starts_with(KeySpace::new("/a").prefix()));
    }

    #[test]
    fn namespaces_do_not_collide() {
        let name = split("crypto_data").unwrap();
        assert_ne!(
            KeySpace::new("/a").full_key(&name),
            KeySpace::new("/b").full_key(&name)
        );
    }

    fn segment() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9-]{1,8}"
    }

    fn valid_name() -> impl Strategy<Value = String> {
        (
            prop::collection::vec(segment(), 1..5),
            prop::collection::vec(prop::bool::ANY, 4),
        )
            .prop_map(|(segments, dots)| {
                let mut name = segments[0].clone();
                for (i, segment) in segments.iter().enumerate().skip(1) {
                    name.push(if dots[i - 1] { '.' } else { '_' });
                    name.push_str(segment);
                }
                name
            })
    }

    proptest! {
        #[test]
        fn resolution_is_idempotent(name in valid_name()) {
            let first = split(&name).unwrap();
            let again = split(&first.to_string()).unwrap();
            prop_assert_eq!(&again, &first);

            let keys = KeySpace::new("/prop");
            prop_assert_eq!(keys.parse(&keys.full_key(&first)), Some(first));
        }

        #[test]
        fn whitespace_is_rejected(
            head in segment(),
            tail in segment(),
            ws in prop::sample::select(vec![" ", "\t", "\n", "\u{a0}"]),
        ) {
            let name = format!("{head}{ws}{tail}");
            prop_assert_eq!(validate(&name), Err(NameError::Whitespace));
        }

        #[test]
        fn blank_segments_are_rejected(
            name in valid_name(),
            at in 0usize..3,
            delim in prop::sample::select(vec!["_", "."]),
        ) {
            let broken = match at {
                0 => format!("{delim}{name}"),
                1 => format!("{name}{delim}"),
                _ => format!("{name}{delim}{delim}x"),
            };
            prop_assert_eq!(validate(&broken), Err(NameError::BlankSegment));
        }
    }
}
