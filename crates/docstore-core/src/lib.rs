//! Expression-based access layer for a partitioned document store.
//!
//! Callers describe reads and writes with parameterized expressions
//! (`#yr = :yyyy`, `set info.rating = :r`) plus name/value maps. The layer
//! binds and validates them against the collection's key schema, hands the
//! resulting requests to a [`transport::Transport`], and iterates paged
//! results lazily.
//!
//! ```no_run
//! use docstore_core::prelude::*;
//! use docstore_model::{CollectionDefinition, ScalarAttributeType};
//!
//! # async fn run() -> Result<(), AccessError> {
//! let client = DocumentClient::in_memory(DocStoreConfig::default());
//! let table = client
//!     .create_collection(
//!         CollectionDefinition::new("Movies")
//!             .partition_key("year", ScalarAttributeType::N)
//!             .sort_key("title", ScalarAttributeType::S),
//!     )
//!     .await?;
//! let mut movies = table
//!     .query(QuerySpec::new("#yr = :yyyy").name("#yr", "year").value(":yyyy", 1985_i64))
//!     .await?;
//! while let Some(item) = movies.next().await {
//!     println!("{}", item?.get_string("title").unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod expression;
pub mod iterator;
pub mod loader;
pub mod memory;
pub mod request;
pub mod schema;
pub mod transport;

/// Commonly used types.
pub mod prelude {
    pub use crate::client::{DocumentClient, Table};
    pub use crate::config::DocStoreConfig;
    pub use crate::error::{AccessError, BindingError, TransportError, ValidationError};
    pub use crate::iterator::{PagedRequest, ResultIterator};
    pub use crate::loader::{DocumentSource, JsonArraySource, bulk_load};
    pub use crate::request::{GetSpec, PutSpec, QuerySpec, ScanSpec, UpdateSpec};
    pub use crate::schema::Key;
}
