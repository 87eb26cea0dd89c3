//! Value and document types for docstore.
//!
//! This crate holds the data model shared by the access layer and its
//! transports: the tagged [`AttributeValue`], the typed [`Item`] view, and the
//! collection-level types used when creating and describing collections.

pub mod attribute_value;
pub mod error;
pub mod item;
pub mod number;
pub mod types;

pub use attribute_value::AttributeValue;
pub use error::{ItemError, NumberError};
pub use item::Item;
pub use number::Number;
pub use types::{
    AttributeDefinition, CollectionDefinition, CollectionDescription, CollectionStatus, KeyType,
    KeySchemaElement, ProvisionedThroughput, ReturnValue, ScalarAttributeType,
};
