//! Key schemas, key descriptors and sort-key ordering.
//!
//! A [`KeySchema`] is derived from a collection's definition and validates
//! the caller-supplied [`Key`] descriptors and items against it, producing a
//! typed [`PrimaryKey`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::LazyLock;

use bytes::Bytes;
use docstore_model::{
    AttributeDefinition, AttributeValue, CollectionDescription, KeySchemaElement, KeyType,
    Number, ScalarAttributeType,
};
use regex::Regex;

use crate::error::ValidationError;
use crate::expression::AttributeTypes;

static COLLECTION_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_.\-]{3,255}$").ok());

/// Check a collection name: 3 to 255 characters of `[A-Za-z0-9_.-]`.
pub fn validate_collection_name(name: &str) -> Result<(), ValidationError> {
    let valid = COLLECTION_NAME
        .as_ref()
        .is_some_and(|re| re.is_match(name));
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidCollectionName {
            name: name.to_owned(),
        })
    }
}

// ---------------------------------------------------------------------------
// Key schema
// ---------------------------------------------------------------------------

/// A key attribute and its declared scalar type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    /// Attribute name.
    pub name: String,
    /// Declared type.
    pub attr_type: ScalarAttributeType,
}

/// Partition key plus optional sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    /// The `HASH` key.
    pub partition_key: KeyAttribute,
    /// The `RANGE` key, if any.
    pub sort_key: Option<KeyAttribute>,
}

impl KeySchema {
    /// Build from key schema elements and attribute definitions.
    ///
    /// Requires exactly one `HASH` element, at most one `RANGE` element, and
    /// a type definition for each.
    pub fn from_elements(
        collection: &str,
        elements: &[KeySchemaElement],
        definitions: &[AttributeDefinition],
    ) -> Result<Self, ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidKeySchema {
            collection: collection.to_owned(),
            reason,
        };

        let hashes: Vec<_> = elements.iter().filter(|e| e.key_type == KeyType::Hash).collect();
        let ranges: Vec<_> = elements.iter().filter(|e| e.key_type == KeyType::Range).collect();
        if hashes.len() != 1 {
            return Err(invalid(format!(
                "expected exactly one HASH key, found {}",
                hashes.len()
            )));
        }
        if ranges.len() > 1 || elements.len() > 2 {
            return Err(invalid("expected at most one RANGE key".to_owned()));
        }

        let attribute = |element: &KeySchemaElement| {
            definitions
                .iter()
                .find(|d| d.attribute_name == element.attribute_name)
                .map(|d| KeyAttribute {
                    name: d.attribute_name.clone(),
                    attr_type: d.attribute_type,
                })
                .ok_or_else(|| {
                    invalid(format!(
                        "no attribute definition for key {}",
                        element.attribute_name
                    ))
                })
        };

        let partition_key = attribute(hashes[0])?;
        let sort_key = ranges.first().map(|e| attribute(*e)).transpose()?;
        if sort_key.as_ref().is_some_and(|sk| sk.name == partition_key.name) {
            return Err(invalid("HASH and RANGE keys must differ".to_owned()));
        }

        Ok(Self {
            partition_key,
            sort_key,
        })
    }

    /// Build from a collection description.
    pub fn from_description(description: &CollectionDescription) -> Result<Self, ValidationError> {
        Self::from_elements(
            &description.name,
            &description.key_schema,
            &description.attribute_definitions,
        )
    }

    /// Whether `name` is a key attribute.
    #[must_use]
    pub fn is_key_attribute(&self, name: &str) -> bool {
        self.key_attributes().any(|k| k.name == name)
    }

    /// Partition key, then sort key if present.
    pub fn key_attributes(&self) -> impl Iterator<Item = &KeyAttribute> {
        std::iter::once(&self.partition_key).chain(self.sort_key.iter())
    }

    /// Validate a caller key descriptor.
    ///
    /// Every key attribute must be present with its declared type and a
    /// non-empty value; no other attribute may be named.
    pub fn primary_key(&self, collection: &str, key: &Key) -> Result<PrimaryKey, ValidationError> {
        if let Some(extra) = key.names().find(|n| !self.is_key_attribute(n)) {
            return Err(ValidationError::UnexpectedKeyAttribute {
                collection: collection.to_owned(),
                attribute: extra.to_owned(),
            });
        }
        self.extract(collection, |name| key.get(name), |attribute| {
            ValidationError::IncompleteKey {
                collection: collection.to_owned(),
                attribute,
            }
        })
    }

    /// Extract and validate the key of a full item.
    pub fn key_of_item(
        &self,
        collection: &str,
        item: &HashMap<String, AttributeValue>,
    ) -> Result<PrimaryKey, ValidationError> {
        self.extract(collection, |name| item.get(name), |attribute| {
            ValidationError::MissingKeyAttribute {
                collection: collection.to_owned(),
                attribute,
            }
        })
    }

    fn extract<'v>(
        &self,
        collection: &str,
        lookup: impl Fn(&str) -> Option<&'v AttributeValue>,
        missing: impl Fn(String) -> ValidationError,
    ) -> Result<PrimaryKey, ValidationError> {
        let part = |attr: &KeyAttribute| -> Result<KeyPart, ValidationError> {
            let value = lookup(&attr.name).ok_or_else(|| missing(attr.name.clone()))?;
            check_key_value(collection, attr, value)?;
            Ok(KeyPart {
                name: attr.name.clone(),
                value: value.clone(),
            })
        };

        Ok(PrimaryKey {
            partition: part(&self.partition_key)?,
            sort: self.sort_key.as_ref().map(part).transpose()?,
        })
    }
}

impl AttributeTypes for KeySchema {
    fn declared_type(&self, attribute: &str) -> Option<ScalarAttributeType> {
        self.key_attributes()
            .find(|k| k.name == attribute)
            .map(|k| k.attr_type)
    }
}

/// Check a key value against its declared type and reject empty values and
/// number text that is not a storable decimal.
pub(crate) fn check_key_value(
    collection: &str,
    attr: &KeyAttribute,
    value: &AttributeValue,
) -> Result<(), ValidationError> {
    if !attr.attr_type.matches(value) {
        return Err(ValidationError::InvalidKeyType {
            collection: collection.to_owned(),
            attribute: attr.name.clone(),
            expected: attr.attr_type,
            got: value.type_descriptor(),
        });
    }
    if let AttributeValue::N(text) = value {
        text.parse::<Number>()
            .map_err(|source| ValidationError::InvalidNumber {
                collection: collection.to_owned(),
                attribute: attr.name.clone(),
                source,
            })?;
    }
    let empty = match value {
        AttributeValue::S(s) => s.is_empty(),
        AttributeValue::B(b) => b.is_empty(),
        _ => false,
    };
    if empty {
        return Err(ValidationError::EmptyKeyValue {
            collection: collection.to_owned(),
            attribute: attr.name.clone(),
        });
    }
    Ok(())
}

/// A collection name together with its key schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Collection name.
    pub name: String,
    /// Key schema.
    pub key_schema: KeySchema,
}

impl TableSchema {
    /// Pair a name with a key schema.
    #[must_use]
    pub fn new(name: impl Into<String>, key_schema: KeySchema) -> Self {
        Self {
            name: name.into(),
            key_schema,
        }
    }

    /// Build from a collection description.
    pub fn from_description(description: &CollectionDescription) -> Result<Self, ValidationError> {
        Ok(Self::new(
            description.name.clone(),
            KeySchema::from_description(description)?,
        ))
    }
}

// ---------------------------------------------------------------------------
// Key descriptors
// ---------------------------------------------------------------------------

/// A caller-supplied key: attribute names to values.
///
/// ```
/// use docstore_core::schema::Key;
///
/// let key = Key::new().with("year", 2015_i64).with("title", "The Big New Movie");
/// assert_eq!(key.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Key {
    parts: BTreeMap<String, AttributeValue>,
}

impl Key {
    /// An empty key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key attribute.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.parts.insert(name.into(), value.into());
        self
    }

    /// The value given for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.parts.get(name)
    }

    /// Attribute names in the descriptor.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.parts.keys().map(String::as_str)
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Whether the descriptor is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str("}")
    }
}

/// One validated key attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPart {
    /// Attribute name.
    pub name: String,
    /// Value, of the declared type.
    pub value: AttributeValue,
}

/// A validated primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimaryKey {
    /// Partition key.
    pub partition: KeyPart,
    /// Sort key, present iff the schema has one.
    pub sort: Option<KeyPart>,
}

impl PrimaryKey {
    /// The key as an attribute map.
    #[must_use]
    pub fn to_attributes(&self) -> HashMap<String, AttributeValue> {
        std::iter::once(&self.partition)
            .chain(self.sort.iter())
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }

    /// The sort value used for ordering within a partition.
    #[must_use]
    pub fn sort_value(&self) -> SortableAttributeValue {
        self.sort
            .as_ref()
            .and_then(|p| SortableAttributeValue::from_value(&p.value))
            .unwrap_or(SortableAttributeValue::Sentinel)
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}={}", self.partition.name, self.partition.value)?;
        if let Some(sort) = &self.sort {
            write!(f, ", {}={}", sort.name, sort.value)?;
        }
        f.write_str("}")
    }
}

// ---------------------------------------------------------------------------
// Sort-key ordering
// ---------------------------------------------------------------------------

/// A key scalar with a total order: strings by UTF-8 bytes, numbers
/// numerically, binaries by unsigned bytes.
#[derive(Debug, Clone)]
pub enum SortableAttributeValue {
    /// String.
    S(String),
    /// Number text.
    N(String),
    /// Binary.
    B(Bytes),
    /// Stands in for the sort key of collections without one.
    Sentinel,
}

impl SortableAttributeValue {
    /// Wrap a key scalar; other variants yield `None`.
    #[must_use]
    pub fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::S(s) => Some(Self::S(s.clone())),
            AttributeValue::N(n) => Some(Self::N(n.clone())),
            AttributeValue::B(b) => Some(Self::B(b.clone())),
            _ => None,
        }
    }

    /// Back to an attribute value; `None` for the sentinel.
    #[must_use]
    pub fn to_value(&self) -> Option<AttributeValue> {
        match self {
            Self::S(s) => Some(AttributeValue::S(s.clone())),
            Self::N(n) => Some(AttributeValue::N(n.clone())),
            Self::B(b) => Some(AttributeValue::B(b.clone())),
            Self::Sentinel => None,
        }
    }

    /// Whether this value starts with `prefix` (string or binary).
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        match (self, prefix) {
            (Self::S(s), Self::S(p)) => s.starts_with(p.as_str()),
            (Self::B(b), Self::B(p)) => b.starts_with(p),
            _ => false,
        }
    }
}

/// Numbers compare by exact decimal value. Text that does not parse only
/// reaches here from unchecked callers; it sorts below every number and
/// bytewise among itself.
fn compare_number_text(a: &str, b: &str) -> Ordering {
    match (a.parse::<Number>(), b.parse::<Number>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Err(_), Err(_)) => a.as_bytes().cmp(b.as_bytes()),
        (Err(_), Ok(_)) => Ordering::Less,
        (Ok(_), Err(_)) => Ordering::Greater,
    }
}

impl PartialEq for SortableAttributeValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortableAttributeValue {}

impl PartialOrd for SortableAttributeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortableAttributeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::S(a), Self::S(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Self::N(a), Self::N(b)) => compare_number_text(a, b),
            (Self::B(a), Self::B(b)) => a.as_ref().cmp(b.as_ref()),
            (Self::Sentinel, Self::Sentinel) => Ordering::Equal,
            // Mixed variants never share a partition; any fixed order works.
            (Self::S(_), _) => Ordering::Less,
            (_, Self::S(_)) => Ordering::Greater,
            (Self::N(_), _) => Ordering::Less,
            (_, Self::N(_)) => Ordering::Greater,
            (Self::B(_), _) => Ordering::Less,
            (_, Self::B(_)) => Ordering::Greater,
        }
    }
}

/// A condition on the sort key of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKeyCondition {
    /// `= v`
    Eq(SortableAttributeValue),
    /// `< v`
    Lt(SortableAttributeValue),
    /// `<= v`
    Le(SortableAttributeValue),
    /// `> v`
    Gt(SortableAttributeValue),
    /// `>= v`
    Ge(SortableAttributeValue),
    /// `BETWEEN lo AND hi`, inclusive.
    Between(SortableAttributeValue, SortableAttributeValue),
    /// `begins_with(sk, prefix)`.
    BeginsWith(SortableAttributeValue),
}

/// The resolved key condition of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCondition {
    /// Partition key equality.
    pub partition: KeyPart,
    /// Optional sort key condition.
    pub sort: Option<SortKeyCondition>,
}
