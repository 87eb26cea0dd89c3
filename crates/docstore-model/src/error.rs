//! Errors raised by typed document access.

/// Failure of a typed accessor on an [`Item`](crate::Item).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ItemError {
    /// The stored value has a different tag than the one requested.
    #[error("attribute '{attribute}' holds {stored_type}, cannot read it as {requested_type}")]
    TypeCoercion {
        /// Attribute name.
        attribute: String,
        /// Tag of the stored value.
        stored_type: &'static str,
        /// Tag the caller asked for.
        requested_type: &'static str,
    },
    /// The attribute is not present in the item.
    #[error("attribute '{attribute}' is not present")]
    MissingAttribute {
        /// Attribute name.
        attribute: String,
    },
    /// A number attribute holds text that is not a decimal number.
    #[error("attribute '{attribute}' holds an invalid number '{text}'")]
    InvalidNumber {
        /// Attribute name.
        attribute: String,
        /// The stored text.
        text: String,
    },
    /// A JSON document used to build an item was not an object.
    #[error("expected a JSON object, got {found}")]
    NotAnObject {
        /// JSON type that was found instead.
        found: &'static str,
    },
}

/// Number text that cannot be stored.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NumberError {
    /// Not a decimal number.
    #[error("'{text}' is not a valid number")]
    Invalid {
        /// The offending text.
        text: String,
    },
    /// More significant digits than a number can hold.
    #[error("'{text}' has more than {max} significant digits")]
    Precision {
        /// The offending text.
        text: String,
        /// The digit limit.
        max: usize,
    },
    /// Magnitude above the supported range.
    #[error("'{text}' is too large to store")]
    Overflow {
        /// The offending text.
        text: String,
    },
    /// Magnitude below the supported range.
    #[error("'{text}' is too small to store")]
    Underflow {
        /// The offending text.
        text: String,
    },
}
