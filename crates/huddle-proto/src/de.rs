//! Lenient deserializers shared by the message types.

use serde::{Deserialize, Deserializer, de::Error};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Accept `42`, `42.0` or `"42"`; `null` and missing fields become zero.
pub(crate) fn i64_lenient<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(0),
        Some(NumberOrString::Int(value)) => Ok(value),
        Some(NumberOrString::Float(value)) => Ok(value as i64),
        Some(NumberOrString::Text(text)) if text.is_empty() => Ok(0),
        Some(NumberOrString::Text(text)) => text.parse().map_err(D::Error::custom),
    }
}

/// Accept a string or a bare number and keep its textual form.
pub(crate) fn string_lenient<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(String::new()),
        Some(NumberOrString::Int(value)) => Ok(value.to_string()),
        Some(NumberOrString::Float(value)) => Ok(value.to_string()),
        Some(NumberOrString::Text(text)) => Ok(text),
    }
}

/// Enum tag as it appears on the wire: canonical name or number.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum EnumTag {
    Number(i64),
    Name(String),
}
