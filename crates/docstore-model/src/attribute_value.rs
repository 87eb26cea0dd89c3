//! The document store's tagged attribute value.
//!
//! `AttributeValue` is a tagged union where exactly one variant is present.
//! The wire format uses single-key objects like `{"S": "hello"}`, with
//! binaries base64-encoded. A second, lossy "plain JSON" view (`from_json` /
//! `to_json`) maps ordinary JSON documents such as bulk-import records onto
//! attribute values.

use std::collections::HashMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Wire tags accepted when decoding an attribute value.
const TAGS: &[&str] = &["S", "N", "B", "SS", "NS", "BS", "BOOL", "NULL", "L", "M"];

/// A single attribute value.
///
/// Numbers are kept as decimal text so that no precision is lost between the
/// caller and the store; typed views are provided by [`crate::Item`].
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// String value.
    S(String),
    /// Number value (decimal text).
    N(String),
    /// Binary value.
    B(Bytes),
    /// String set.
    Ss(Vec<String>),
    /// Number set (decimal text).
    Ns(Vec<String>),
    /// Binary set.
    Bs(Vec<Bytes>),
    /// Boolean value.
    Bool(bool),
    /// Null value.
    Null(bool),
    /// List of values.
    L(Vec<AttributeValue>),
    /// Map of values.
    M(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Build a number value from anything that prints as a decimal.
    #[must_use]
    pub fn number(n: impl fmt::Display) -> Self {
        Self::N(n.to_string())
    }

    /// Build a string value.
    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self::S(s.into())
    }

    /// Returns `true` if this is a null value.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null(true))
    }

    /// Returns `true` for the set variants.
    #[must_use]
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Ss(_) | Self::Ns(_) | Self::Bs(_))
    }

    /// Returns `true` for the scalar variants that may be used as keys.
    #[must_use]
    pub fn is_key_scalar(&self) -> bool {
        matches!(self, Self::S(_) | Self::N(_) | Self::B(_))
    }

    /// Returns the string if this is an `S` variant.
    #[must_use]
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the number text if this is an `N` variant.
    #[must_use]
    pub fn as_n(&self) -> Option<&str> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the bytes if this is a `B` variant.
    #[must_use]
    pub fn as_b(&self) -> Option<&Bytes> {
        match self {
            Self::B(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the map if this is an `M` variant.
    #[must_use]
    pub fn as_m(&self) -> Option<&HashMap<String, AttributeValue>> {
        match self {
            Self::M(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the list if this is an `L` variant.
    #[must_use]
    pub fn as_l(&self) -> Option<&[AttributeValue]> {
        match self {
            Self::L(l) => Some(l),
            _ => None,
        }
    }

    /// Returns the boolean if this is a `Bool` variant.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The wire tag of this value (`"S"`, `"N"`, `"BOOL"`, ...).
    #[must_use]
    pub fn type_descriptor(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::Ss(_) => "SS",
            Self::Ns(_) => "NS",
            Self::Bs(_) => "BS",
            Self::Bool(_) => "BOOL",
            Self::Null(_) => "NULL",
            Self::L(_) => "L",
            Self::M(_) => "M",
        }
    }

    /// Convert a plain JSON value into an attribute value.
    ///
    /// JSON numbers become `N` (keeping their textual form), strings `S`,
    /// arrays `L`, objects `M`, booleans `Bool` and `null` becomes `Null`.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null(true),
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => Self::N(n.to_string()),
            serde_json::Value::String(s) => Self::S(s.clone()),
            serde_json::Value::Array(items) => Self::L(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(fields) => Self::M(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Render this value as plain JSON.
    ///
    /// Binaries become base64 strings, sets become arrays. Number text that
    /// JSON cannot represent is emitted as a string.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::S(s) => serde_json::Value::String(s.clone()),
            Self::N(n) => number_to_json(n),
            Self::B(b) => serde_json::Value::String(BASE64.encode(b)),
            Self::Ss(v) => v.iter().cloned().map(serde_json::Value::String).collect(),
            Self::Ns(v) => v.iter().map(|n| number_to_json(n)).collect(),
            Self::Bs(v) => v
                .iter()
                .map(|b| serde_json::Value::String(BASE64.encode(b)))
                .collect(),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Null(_) => serde_json::Value::Null,
            Self::L(v) => v.iter().map(Self::to_json).collect(),
            Self::M(m) => serde_json::Value::Object(
                m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

fn number_to_json(text: &str) -> serde_json::Value {
    if let Ok(i) = text.parse::<i64>() {
        return serde_json::Value::from(i);
    }
    text.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map_or_else(
            || serde_json::Value::String(text.to_owned()),
            serde_json::Value::Number,
        )
}

/// Format an `f64` the way the store writes numbers: integral values without
/// a fractional part, everything else in shortest round-trip form.
#[must_use]
#[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
pub fn format_number(v: f64) -> String {
    if v.is_finite() && v == v.trunc() && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::S(s.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::S(s)
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        Self::N(n.to_string())
    }
}

impl From<i32> for AttributeValue {
    fn from(n: i32) -> Self {
        Self::N(n.to_string())
    }
}

impl From<u64> for AttributeValue {
    fn from(n: u64) -> Self {
        Self::N(n.to_string())
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        Self::N(format_number(n))
    }
}

impl From<Bytes> for AttributeValue {
    fn from(b: Bytes) -> Self {
        Self::B(b)
    }
}

impl From<Vec<AttributeValue>> for AttributeValue {
    fn from(v: Vec<AttributeValue>) -> Self {
        Self::L(v)
    }
}

impl From<HashMap<String, AttributeValue>> for AttributeValue {
    fn from(m: HashMap<String, AttributeValue>) -> Self {
        Self::M(m)
    }
}

impl Eq for AttributeValue {}

impl std::hash::Hash for AttributeValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::S(s) | Self::N(s) => s.hash(state),
            Self::B(b) => b.hash(state),
            Self::Bool(b) | Self::Null(b) => b.hash(state),
            Self::Ss(v) | Self::Ns(v) => v.hash(state),
            Self::Bs(v) => v.hash(state),
            Self::L(v) => v.hash(state),
            Self::M(m) => {
                let mut pairs: Vec<_> = m.iter().collect();
                pairs.sort_by_key(|(k, _)| *k);
                for (k, v) in pairs {
                    k.hash(state);
                    v.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S(s) => write!(f, "\"{s}\""),
            Self::N(n) => write!(f, "{n}"),
            Self::B(b) => write!(f, "<{} bytes>", b.len()),
            Self::Ss(v) => write!(f, "SS{v:?}"),
            Self::Ns(v) => write!(f, "NS[{}]", v.join(", ")),
            Self::Bs(v) => write!(f, "BS<{} items>", v.len()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null(_) => write!(f, "null"),
            Self::L(v) => write!(f, "[{} items]", v.len()),
            Self::M(m) => write!(f, "{{{} keys}}", m.len()),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        let tag = self.type_descriptor();
        match self {
            Self::S(s) | Self::N(s) => map.serialize_entry(tag, s)?,
            Self::B(b) => map.serialize_entry(tag, &BASE64.encode(b))?,
            Self::Ss(v) | Self::Ns(v) => map.serialize_entry(tag, v)?,
            Self::Bs(v) => {
                let encoded: Vec<String> = v.iter().map(|b| BASE64.encode(b)).collect();
                map.serialize_entry(tag, &encoded)?;
            }
            Self::Bool(b) | Self::Null(b) => map.serialize_entry(tag, b)?,
            Self::L(list) => map.serialize_entry(tag, list)?,
            Self::M(m) => map.serialize_entry(tag, m)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(AttributeValueVisitor)
    }
}

struct AttributeValueVisitor;

impl<'de> Visitor<'de> for AttributeValueVisitor {
    type Value = AttributeValue;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("an attribute value object with exactly one type tag")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
        let Some(tag) = map.next_key::<String>()? else {
            return Err(de::Error::custom("attribute value must carry a type tag"));
        };

        let value = match tag.as_str() {
            "S" => AttributeValue::S(map.next_value()?),
            "N" => AttributeValue::N(map.next_value()?),
            "B" => AttributeValue::B(decode_binary::<M::Error>(&map.next_value::<String>()?)?),
            "SS" => AttributeValue::Ss(map.next_value()?),
            "NS" => AttributeValue::Ns(map.next_value()?),
            "BS" => {
                let encoded: Vec<String> = map.next_value()?;
                let decoded = encoded
                    .iter()
                    .map(|e| decode_binary::<M::Error>(e))
                    .collect::<Result<Vec<_>, _>>()?;
                AttributeValue::Bs(decoded)
            }
            "BOOL" => AttributeValue::Bool(map.next_value()?),
            "NULL" => AttributeValue::Null(map.next_value()?),
            "L" => AttributeValue::L(map.next_value()?),
            "M" => AttributeValue::M(map.next_value()?),
            other => return Err(de::Error::unknown_field(other, TAGS)),
        };

        if map.next_key::<String>()?.is_some() {
            return Err(de::Error::custom(
                "attribute value must carry exactly one type tag",
            ));
        }

        Ok(value)
    }
}

fn decode_binary<E: de::Error>(encoded: &str) -> Result<Bytes, E> {
    BASE64
        .decode(encoded)
        .map(Bytes::from)
        .map_err(de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_serialize_tagged_string_and_number() {
        let json = serde_json::to_string(&AttributeValue::from("hello")).unwrap();
        assert_eq!(json, r#"{"S":"hello"}"#);
        let json = serde_json::to_string(&AttributeValue::from(2015_i64)).unwrap();
        assert_eq!(json, r#"{"N":"2015"}"#);
    }

    #[test]
    fn test_should_serialize_nested_list() {
        let val = AttributeValue::L(vec![AttributeValue::from("a"), AttributeValue::from(1_i64)]);
        let json = serde_json::to_string(&val).unwrap();
        assert_eq!(json, r#"{"L":[{"S":"a"},{"N":"1"}]}"#);
    }

    #[test]
    fn test_should_decode_binary_from_base64() {
        let val: AttributeValue = serde_json::from_str(r#"{"B":"dGVzdA=="}"#).unwrap();
        assert_eq!(val, AttributeValue::B(Bytes::from_static(b"test")));
    }

    #[test]
    fn test_should_reject_unknown_tag() {
        let err = serde_json::from_str::<AttributeValue>(r#"{"X":"1"}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn test_should_reject_two_tags() {
        let result = serde_json::from_str::<AttributeValue>(r#"{"S":"a","N":"1"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_should_convert_plain_json_document() {
        let doc = serde_json::json!({
            "year": 2013,
            "title": "Rush",
            "info": { "rating": 8.3, "genres": ["Action", "Biography"], "running": true }
        });
        let AttributeValue::M(m) = AttributeValue::from_json(&doc) else {
            panic!("expected a map");
        };
        assert_eq!(m["year"], AttributeValue::N("2013".to_owned()));
        assert_eq!(m["title"], AttributeValue::S("Rush".to_owned()));
        let info = m["info"].as_m().unwrap();
        assert_eq!(info["rating"], AttributeValue::N("8.3".to_owned()));
        assert_eq!(info["genres"].as_l().unwrap().len(), 2);
        assert_eq!(info["running"], AttributeValue::Bool(true));
    }

    #[test]
    fn test_should_render_plain_json() {
        let mut info = HashMap::new();
        info.insert("rating".to_owned(), AttributeValue::from(5.5));
        info.insert("plot".to_owned(), AttributeValue::Null(true));
        let json = AttributeValue::M(info).to_json();
        assert_eq!(json, serde_json::json!({ "rating": 5.5, "plot": null }));
    }

    #[test]
    fn test_should_format_integral_floats_without_fraction() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(5.5), "5.5");
        assert_eq!(format_number(-2.0), "-2");
    }
}
