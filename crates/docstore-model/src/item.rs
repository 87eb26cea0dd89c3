//! Typed view over a schemaless document.
//!
//! An [`Item`] is an immutable snapshot of a document's attribute map. The
//! typed accessors check the stored tag and fail with
//! [`ItemError::TypeCoercion`] on a mismatch. Numbers are stored as decimal
//! text, so the integer and decimal views ([`Item::get_int`],
//! [`Item::get_number`]) are both always available for a number attribute.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::attribute_value::AttributeValue;
use crate::error::ItemError;
use crate::number::Number;

/// A document: attribute name to value.
///
/// Equality and ordering are intentionally not implemented; compare
/// [`Item::attributes`] when a test needs structural equality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item {
    attributes: HashMap<String, AttributeValue>,
}

impl Item {
    /// Create an empty item.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing attribute map.
    #[must_use]
    pub fn from_attributes(attributes: HashMap<String, AttributeValue>) -> Self {
        Self { attributes }
    }

    /// Build an item from a plain JSON object.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ItemError> {
        match AttributeValue::from_json(value) {
            AttributeValue::M(attributes) => Ok(Self { attributes }),
            _ => Err(ItemError::NotAnObject {
                found: json_type_name(value),
            }),
        }
    }

    /// Return a copy with `name` set to `value`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Return a copy with both key attributes set.
    #[must_use]
    pub fn with_primary_key(
        self,
        partition_name: impl Into<String>,
        partition_value: impl Into<AttributeValue>,
        sort_name: impl Into<String>,
        sort_value: impl Into<AttributeValue>,
    ) -> Self {
        self.with(partition_name, partition_value)
            .with(sort_name, sort_value)
    }

    /// Return a copy with `name` set to the attribute form of a JSON value.
    #[must_use]
    pub fn with_json(self, name: impl Into<String>, value: &serde_json::Value) -> Self {
        self.with(name, AttributeValue::from_json(value))
    }

    /// Raw access to an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    /// Whether the attribute is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the item has no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Borrow the underlying attribute map.
    #[must_use]
    pub fn attributes(&self) -> &HashMap<String, AttributeValue> {
        &self.attributes
    }

    /// Consume the item, returning the attribute map.
    #[must_use]
    pub fn into_attributes(self) -> HashMap<String, AttributeValue> {
        self.attributes
    }

    /// Iterate over `(name, value)` pairs in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.attributes.iter()
    }

    // -----------------------------------------------------------------------
    // Typed accessors
    // -----------------------------------------------------------------------

    /// Read a string attribute.
    pub fn get_string(&self, name: &str) -> Result<&str, ItemError> {
        match self.require(name)? {
            AttributeValue::S(s) => Ok(s),
            other => Err(coercion(name, other, "S")),
        }
    }

    /// Read a number attribute as a decimal.
    pub fn get_number(&self, name: &str) -> Result<f64, ItemError> {
        let text = self.number_text(name)?;
        text.parse::<f64>().map_err(|_| invalid_number(name, text))
    }

    /// Read a number attribute as an integer, truncating any fractional part.
    pub fn get_int(&self, name: &str) -> Result<i64, ItemError> {
        let text = self.number_text(name)?;
        text.parse::<Number>()
            .ok()
            .and_then(|n| n.trunc_to_i64())
            .ok_or_else(|| invalid_number(name, text))
    }

    /// Read the raw decimal text of a number attribute.
    pub fn number_text(&self, name: &str) -> Result<&str, ItemError> {
        match self.require(name)? {
            AttributeValue::N(n) => Ok(n),
            other => Err(coercion(name, other, "N")),
        }
    }

    /// Read a map attribute.
    pub fn get_map(&self, name: &str) -> Result<&HashMap<String, AttributeValue>, ItemError> {
        match self.require(name)? {
            AttributeValue::M(m) => Ok(m),
            other => Err(coercion(name, other, "M")),
        }
    }

    /// Read a list attribute.
    pub fn get_list(&self, name: &str) -> Result<&[AttributeValue], ItemError> {
        match self.require(name)? {
            AttributeValue::L(l) => Ok(l),
            other => Err(coercion(name, other, "L")),
        }
    }

    /// Read a binary attribute.
    pub fn get_binary(&self, name: &str) -> Result<&Bytes, ItemError> {
        match self.require(name)? {
            AttributeValue::B(b) => Ok(b),
            other => Err(coercion(name, other, "B")),
        }
    }

    /// Read a boolean attribute.
    pub fn get_bool(&self, name: &str) -> Result<bool, ItemError> {
        match self.require(name)? {
            AttributeValue::Bool(b) => Ok(*b),
            other => Err(coercion(name, other, "BOOL")),
        }
    }

    /// Whether the attribute is present and holds `NULL`.
    #[must_use]
    pub fn is_null(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(AttributeValue::is_null)
    }

    /// Render the item as a plain JSON object.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Render the item as indented plain JSON.
    #[must_use]
    pub fn to_json_pretty(&self) -> String {
        format!("{:#}", self.to_json())
    }

    fn require(&self, name: &str) -> Result<&AttributeValue, ItemError> {
        self.attributes
            .get(name)
            .ok_or_else(|| ItemError::MissingAttribute {
                attribute: name.to_owned(),
            })
    }
}

impl From<HashMap<String, AttributeValue>> for Item {
    fn from(attributes: HashMap<String, AttributeValue>) -> Self {
        Self { attributes }
    }
}

impl IntoIterator for Item {
    type Item = (String, AttributeValue);
    type IntoIter = std::collections::hash_map::IntoIter<String, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.attributes.into_iter()
    }
}

fn coercion(name: &str, stored: &AttributeValue, requested: &'static str) -> ItemError {
    ItemError::TypeCoercion {
        attribute: name.to_owned(),
        stored_type: stored.type_descriptor(),
        requested_type: requested,
    }
}

fn invalid_number(name: &str, text: &str) -> ItemError {
    ItemError::InvalidNumber {
        attribute: name.to_owned(),
        text: text.to_owned(),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
