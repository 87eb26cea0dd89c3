//! Collection-level types: key schemas, throughput, status and descriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attribute_value::AttributeValue;

/// Scalar type of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarAttributeType {
    /// String.
    S,
    /// Number.
    N,
    /// Binary.
    B,
}

impl ScalarAttributeType {
    /// Wire tag.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::S => "S",
            Self::N => "N",
            Self::B => "B",
        }
    }

    /// Whether `value` carries this scalar type.
    #[must_use]
    pub fn matches(self, value: &AttributeValue) -> bool {
        matches!(
            (self, value),
            (Self::S, AttributeValue::S(_))
                | (Self::N, AttributeValue::N(_))
                | (Self::B, AttributeValue::B(_))
        )
    }
}

impl std::fmt::Display for ScalarAttributeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// Partition key.
    #[serde(rename = "HASH")]
    Hash,
    /// Sort key.
    #[serde(rename = "RANGE")]
    Range,
}

/// One entry of a collection's key schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeySchemaElement {
    /// Attribute name.
    pub attribute_name: String,
    /// Partition or sort.
    pub key_type: KeyType,
}

/// Declared scalar type of a key attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AttributeDefinition {
    /// Attribute name.
    pub attribute_name: String,
    /// Scalar type.
    pub attribute_type: ScalarAttributeType,
}

/// Requested read/write capacity. Recorded, never enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProvisionedThroughput {
    /// Read capacity units.
    pub read_capacity_units: u64,
    /// Write capacity units.
    pub write_capacity_units: u64,
}

impl Default for ProvisionedThroughput {
    fn default() -> Self {
        Self {
            read_capacity_units: 1,
            write_capacity_units: 1,
        }
    }
}

/// Returned-value policy of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ReturnValue {
    /// Nothing is returned.
    #[default]
    #[serde(rename = "NONE")]
    None,
    /// The whole item before the write.
    #[serde(rename = "ALL_OLD")]
    AllOld,
    /// Only the updated attributes, before the write.
    #[serde(rename = "UPDATED_OLD")]
    UpdatedOld,
    /// The whole item after the write.
    #[serde(rename = "ALL_NEW")]
    AllNew,
    /// Only the updated attributes, after the write.
    #[serde(rename = "UPDATED_NEW")]
    UpdatedNew,
}

impl ReturnValue {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::AllOld => "ALL_OLD",
            Self::UpdatedOld => "UPDATED_OLD",
            Self::AllNew => "ALL_NEW",
            Self::UpdatedNew => "UPDATED_NEW",
        }
    }
}

impl std::fmt::Display for ReturnValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollectionStatus {
    /// Being created; not yet accepting requests.
    #[serde(rename = "CREATING")]
    Creating,
    /// Ready.
    #[serde(rename = "ACTIVE")]
    Active,
}

/// Everything needed to create a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CollectionDefinition {
    /// Collection name.
    pub name: String,
    /// Key schema (one `HASH`, at most one `RANGE`).
    pub key_schema: Vec<KeySchemaElement>,
    /// Types of the key attributes.
    pub attribute_definitions: Vec<AttributeDefinition>,
    /// Requested capacity.
    pub provisioned_throughput: ProvisionedThroughput,
}

impl CollectionDefinition {
    /// Start a definition with no keys and default throughput.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_schema: Vec::new(),
            attribute_definitions: Vec::new(),
            provisioned_throughput: ProvisionedThroughput::default(),
        }
    }

    /// Declare the partition key.
    #[must_use]
    pub fn partition_key(self, name: impl Into<String>, ty: ScalarAttributeType) -> Self {
        self.key(name.into(), KeyType::Hash, ty)
    }

    /// Declare the sort key.
    #[must_use]
    pub fn sort_key(self, name: impl Into<String>, ty: ScalarAttributeType) -> Self {
        self.key(name.into(), KeyType::Range, ty)
    }

    /// Set the requested capacity.
    #[must_use]
    pub fn throughput(mut self, read: u64, write: u64) -> Self {
        self.provisioned_throughput = ProvisionedThroughput {
            read_capacity_units: read,
            write_capacity_units: write,
        };
        self
    }

    fn key(mut self, name: String, key_type: KeyType, ty: ScalarAttributeType) -> Self {
        self.attribute_definitions.push(AttributeDefinition {
            attribute_name: name.clone(),
            attribute_type: ty,
        });
        self.key_schema.push(KeySchemaElement {
            attribute_name: name,
            key_type,
        });
        self
    }
}

/// Description of an existing collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CollectionDescription {
    /// Collection name.
    pub name: String,
    /// Unique id assigned at creation.
    pub collection_id: String,
    /// Key schema.
    pub key_schema: Vec<KeySchemaElement>,
    /// Types of the key attributes.
    pub attribute_definitions: Vec<AttributeDefinition>,
    /// Requested capacity.
    pub provisioned_throughput: ProvisionedThroughput,
    /// Current status.
    pub status: CollectionStatus,
    /// Creation time.
    pub creation_date_time: DateTime<Utc>,
    /// Number of stored items.
    pub item_count: u64,
}
