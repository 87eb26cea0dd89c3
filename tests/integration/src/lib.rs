//! End-to-end tests for the docstore access layer.
//!
//! Every test runs against a fresh in-memory transport, so no external
//! service is needed:
//! ```text
//! cargo test -p docstore-integration
//! ```

use std::sync::Once;

use docstore_core::prelude::*;
use docstore_model::{CollectionDefinition, Item, ScalarAttributeType};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A client over a fresh in-memory transport.
#[must_use]
pub fn memory_client(page_size: usize) -> DocumentClient {
    init_tracing();
    DocumentClient::in_memory(DocStoreConfig::builder().page_size(page_size).build())
}

/// Generate a unique collection name for test isolation.
#[must_use]
pub fn test_collection_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}-{}", &id[..8])
}

/// Definition of a `Movies`-shaped collection: `year` (N) plus `title` (S).
#[must_use]
pub fn movies_definition(name: &str) -> CollectionDefinition {
    CollectionDefinition::new(name)
        .partition_key("year", ScalarAttributeType::N)
        .sort_key("title", ScalarAttributeType::S)
        .throughput(10, 10)
}

/// A movie item with an `info` map.
#[must_use]
pub fn movie(year: i64, title: &str, rating: f64) -> Item {
    Item::new()
        .with("year", year)
        .with("title", title)
        .with_json(
            "info",
            &serde_json::json!({
                "rating": rating,
                "genres": ["Drama"],
                "actors": [format!("{title} lead"), format!("{title} support")],
            }),
        )
}

/// Create a `Movies`-shaped collection and put `movies` into it.
pub async fn seeded_movies(client: &DocumentClient, movies: Vec<Item>) -> Table {
    let table = client
        .create_collection(movies_definition(&test_collection_name("movies")))
        .await
        .unwrap_or_else(|e| panic!("failed to create collection: {e}"));
    for item in movies {
        table
            .put_item(PutSpec::new(item))
            .await
            .unwrap_or_else(|e| panic!("failed to seed collection: {e}"));
    }
    table
}

/// Titles of `items`, in order.
#[must_use]
pub fn titles(items: &[Item]) -> Vec<String> {
    items
        .iter()
        .map(|i| i.get_string("title").unwrap_or_default().to_owned())
        .collect()
}

#[cfg(test)]
mod test_binding;
#[cfg(test)]
mod test_items;
#[cfg(test)]
mod test_query;
#[cfg(test)]
mod test_scan;
#[cfg(test)]
mod test_walkthrough;
