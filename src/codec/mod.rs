//! Text encoding for string-only backends.
//!
//! Grammar of an encoded value:
//!
//! ```text
//! encoded := "undefined" | "NaN" | "Infinity" | "-Infinity" | json
//! ```
//!
//! `json` is ordinary JSON text. The bare tokens carry the top-level values
//! JSON cannot express. Strings are always quoted, so a string that happens
//! to read `undefined` or `NaN` can never be mistaken for a token.
//!
//! Inside the JSON text the same values are written as tagged strings:
//!
//! ```text
//! tagged := "~undefined" | "~NaN" | "~Infinity" | "~-Infinity"
//! ```
//!
//! A string value that starts with `~` gets one more `~` in front, so it
//! never reads as a tag. Opaque host objects cannot be encoded at all.

mod text;

pub use text::{decode, encode, CodecError};
