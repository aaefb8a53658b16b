use serde_json::Value as Json;

use crate::value::{number_to_json, Value};

/// Leads every tagged string inside the JSON text.
const TAG: char = '~';

const UNDEFINED: &str = "undefined";
const NAN: &str = "NaN";
const INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

/// Encoding or decoding failure.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The value holds an opaque host object.
    #[error("opaque host objects cannot be encoded")]
    Unencodable,

    /// The stored text is neither a reserved token nor valid JSON.
    #[error("malformed encoded value: {0}")]
    Malformed(#[source] serde_json::Error),
}

pub fn encode(value: &Value) -> Result<String, CodecError> {
    if contains_opaque(value) {
        return Err(CodecError::Unencodable);
    }
    let text = match value {
        Value::Undefined => UNDEFINED.to_owned(),
        Value::Number(n) if n.is_nan() => NAN.to_owned(),
        Value::Number(n) if n.is_infinite() => {
            let token = if n.is_sign_positive() { INFINITY } else { NEG_INFINITY };
            token.to_owned()
        }
        other => to_json(other).to_string(),
    };
    Ok(text)
}

// Values JSON cannot hold become tagged strings (`"~NaN"`). Strings that
// already start with the tag get a second one.
fn to_json(value: &Value) -> Json {
    match value {
        Value::Undefined => tagged(UNDEFINED),
        Value::Null | Value::Opaque(_) => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) if n.is_nan() => tagged(NAN),
        Value::Number(n) if n.is_infinite() => {
            tagged(if n.is_sign_positive() { INFINITY } else { NEG_INFINITY })
        }
        Value::Number(n) => number_to_json(*n),
        Value::String(s) if s.starts_with(TAG) => Json::String(format!("{TAG}{s}")),
        Value::String(s) => Json::String(s.clone()),
        Value::Array(items) => Json::Array(items.iter().map(to_json).collect()),
        Value::Object(members) => {
            Json::Object(members.iter().map(|(k, v)| (k.clone(), to_json(v))).collect())
        }
    }
}

fn tagged(token: &str) -> Json {
    Json::String(format!("{TAG}{token}"))
}

fn from_json(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => match s.strip_prefix(TAG) {
            Some(UNDEFINED) => Value::Undefined,
            Some(NAN) => Value::Number(f64::NAN),
            Some(INFINITY) => Value::Number(f64::INFINITY),
            Some(NEG_INFINITY) => Value::Number(f64::NEG_INFINITY),
            Some(rest) if rest.starts_with(TAG) => Value::String(rest.to_owned()),
            // untagged text that merely starts with the tag
            _ => Value::String(s),
        },
        Json::Array(items) => Value::array(items.into_iter().map(from_json)),
        Json::Object(members) => Value::object(members.into_iter().map(|(k, v)| (k, from_json(v)))),
    }
}

pub fn decode(text: &str) -> Result<Value, CodecError> {
    match text {
        UNDEFINED => Ok(Value::Undefined),
        NAN => Ok(Value::Number(f64::NAN)),
        INFINITY => Ok(Value::Number(f64::INFINITY)),
        NEG_INFINITY => Ok(Value::Number(f64::NEG_INFINITY)),
        json => serde_json::from_str::<serde_json::Value>(json)
            .map(from_json)
            .map_err(CodecError::Malformed),
    }
}

fn contains_opaque(value: &Value) -> bool {
    match value {
        Value::Opaque(_) => true,
        Value::Array(items) => items.iter().any(contains_opaque),
        Value::Object(members) => members.values().any(contains_opaque),
        _ => false,
    }
}
