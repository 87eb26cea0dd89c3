//! Error types of the access layer.
//!
//! Local failures ([`BindingError`], [`ValidationError`]) are raised before
//! any transport call. [`TransportError`] is what a transport reports;
//! [`AccessError`] is what callers of the facade see, with the collection
//! and key attached.

use docstore_model::{NumberError, ReturnValue, ScalarAttributeType};

use crate::expression::ExpressionError;

/// Failure to bind an expression to its placeholder maps.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    /// A placeholder has no entry in its map.
    #[error("unresolved placeholder {token} in expression \"{expression}\"")]
    UnresolvedPlaceholder {
        /// The placeholder, sigil included.
        token: String,
        /// The full expression text.
        expression: String,
    },
    /// An operand cannot have the type the expression needs.
    #[error("type mismatch on {attribute}: expected {expected}, got {got}")]
    TypeMismatch {
        /// The attribute (or `size(...)` operand) being checked.
        attribute: String,
        /// The type the position requires.
        expected: String,
        /// The type supplied.
        got: String,
    },
    /// The expression does not parse.
    #[error("invalid expression \"{expression}\": {source}")]
    Syntax {
        /// The full expression text.
        expression: String,
        /// The parser error.
        #[source]
        source: ExpressionError,
    },
}

/// A request that is well-formed as text but invalid for its collection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The key descriptor omits a key attribute.
    #[error("incomplete key for {collection}: missing {attribute}")]
    IncompleteKey {
        /// Target collection.
        collection: String,
        /// The missing key attribute.
        attribute: String,
    },
    /// An item to write lacks a key attribute.
    #[error("item for {collection} is missing key attribute {attribute}")]
    MissingKeyAttribute {
        /// Target collection.
        collection: String,
        /// The missing key attribute.
        attribute: String,
    },
    /// A key value has the wrong scalar type.
    #[error("key attribute {attribute} of {collection} must be {expected}, got {got}")]
    InvalidKeyType {
        /// Target collection.
        collection: String,
        /// The key attribute.
        attribute: String,
        /// The declared type.
        expected: ScalarAttributeType,
        /// The supplied type tag.
        got: &'static str,
    },
    /// A number in the request is not a storable decimal.
    #[error("{attribute} of {collection} holds an invalid number: {source}")]
    InvalidNumber {
        /// Target collection.
        collection: String,
        /// The attribute holding the number.
        attribute: String,
        /// Why the text was rejected.
        #[source]
        source: NumberError,
    },
    /// A key value is an empty string or binary.
    #[error("key attribute {attribute} of {collection} must not be empty")]
    EmptyKeyValue {
        /// Target collection.
        collection: String,
        /// The key attribute.
        attribute: String,
    },
    /// The key descriptor names an attribute outside the key schema.
    #[error("{attribute} is not a key attribute of {collection}")]
    UnexpectedKeyAttribute {
        /// Target collection.
        collection: String,
        /// The offending attribute.
        attribute: String,
    },
    /// The key condition of a query is not usable.
    #[error("invalid key condition for {collection}: {reason}")]
    InvalidKeyCondition {
        /// Target collection.
        collection: String,
        /// What is wrong with it.
        reason: String,
    },
    /// An update targets a key attribute.
    #[error("cannot update attribute {attribute} of {collection}: it is part of the key")]
    KeyAttributeUpdate {
        /// Target collection.
        collection: String,
        /// The key attribute.
        attribute: String,
    },
    /// Two update targets overlap or conflict.
    #[error("update paths {first} and {second} overlap in {collection}")]
    OverlappingUpdatePaths {
        /// Target collection.
        collection: String,
        /// First path.
        first: String,
        /// Second path.
        second: String,
    },
    /// The return policy is not supported by the operation.
    #[error("return values {value} are not supported by {operation}")]
    InvalidReturnValues {
        /// Operation name.
        operation: &'static str,
        /// Requested policy.
        value: ReturnValue,
    },
    /// A query or scan asked for pages of zero items.
    #[error("page size for {collection} must be at least 1")]
    InvalidPageSize {
        /// Target collection.
        collection: String,
    },
    /// The collection name is not 3-255 characters of `[A-Za-z0-9_.-]`.
    #[error("invalid collection name {name:?}")]
    InvalidCollectionName {
        /// The rejected name.
        name: String,
    },
    /// The key schema of a collection definition is malformed.
    #[error("invalid key schema for {collection}: {reason}")]
    InvalidKeySchema {
        /// Collection name.
        collection: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Failure reported by a [`crate::transport::Transport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The write condition evaluated to false.
    #[error("the conditional request failed")]
    ConditionalCheckFailed,
    /// No collection with this name exists.
    #[error("collection {name} not found")]
    CollectionNotFound {
        /// Collection name.
        name: String,
    },
    /// A collection with this name already exists.
    #[error("collection {name} already exists")]
    CollectionInUse {
        /// Collection name.
        name: String,
    },
    /// A bound expression failed against a stored item.
    #[error("expression evaluation failed: {0}")]
    Evaluation(#[from] ExpressionError),
    /// The call did not complete in time.
    #[error("request timed out after {elapsed_ms}ms")]
    Timeout {
        /// The timeout that elapsed.
        elapsed_ms: u64,
    },
    /// Any other transport failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Error returned by the collection facade and the result iterator.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// An expression failed to bind.
    #[error(transparent)]
    Binding(#[from] BindingError),
    /// The request is invalid for its collection.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A conditional put or update was rejected.
    #[error("conditional check failed on {collection} for key {key}")]
    ConditionalCheckFailed {
        /// Target collection.
        collection: String,
        /// The item key.
        key: String,
    },
    /// A continuation page could not be fetched.
    #[error("fetching page {page} of {collection} failed: {source}")]
    Iteration {
        /// Target collection.
        collection: String,
        /// One-based number of the page that failed.
        page: usize,
        /// The transport failure.
        #[source]
        source: TransportError,
    },
    /// The iteration was cancelled.
    #[error("iteration over {collection} cancelled after {pages} page(s)")]
    Cancelled {
        /// Target collection.
        collection: String,
        /// Pages fetched before cancellation.
        pages: usize,
    },
    /// Any other transport failure.
    #[error("request to {collection} failed: {source}")]
    Transport {
        /// Target collection.
        collection: String,
        /// The transport failure.
        #[source]
        source: TransportError,
    },
    /// A bulk-load record could not be written.
    #[error("loading record {record} failed: {source}")]
    Load {
        /// Zero-based record index in the source.
        record: usize,
        /// Why the record failed.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl AccessError {
    /// Whether this is a rejected conditional write.
    #[must_use]
    pub fn is_conditional_check_failed(&self) -> bool {
        matches!(self, Self::ConditionalCheckFailed { .. })
    }

    /// Attach collection and key context to a transport failure.
    #[must_use]
    pub fn from_transport(collection: &str, key: impl FnOnce() -> String, err: TransportError) -> Self {
        match err {
            TransportError::ConditionalCheckFailed => Self::ConditionalCheckFailed {
                collection: collection.to_owned(),
                key: key(),
            },
            source => Self::Transport {
                collection: collection.to_owned(),
                source,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_map_conditional_failure_with_key() {
        let err = AccessError::from_transport(
            "Movies",
            || "{year=2015, title=\"X\"}".to_owned(),
            TransportError::ConditionalCheckFailed,
        );
        assert!(err.is_conditional_check_failed());
        assert_eq!(
            err.to_string(),
            "conditional check failed on Movies for key {year=2015, title=\"X\"}"
        );
    }

    #[test]
    fn test_should_wrap_other_transport_errors() {
        let err = AccessError::from_transport(
            "Movies",
            String::new,
            TransportError::CollectionNotFound {
                name: "Movies".to_owned(),
            },
        );
        assert!(matches!(err, AccessError::Transport { .. }));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_should_format_unresolved_placeholder() {
        let err = BindingError::UnresolvedPlaceholder {
            token: "#yr".to_owned(),
            expression: "#yr = :yyyy".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "unresolved placeholder #yr in expression \"#yr = :yyyy\""
        );
    }
}
