//! In-memory [`Transport`].
//!
//! Evaluates conditions, filters, projections and updates server-side the
//! way a managed store does, pages with continuation tokens, and makes
//! conditional writes atomic by serializing writes per collection. Nothing
//! is persisted; reads are always consistent.

mod storage;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use docstore_model::{
    AttributeValue, CollectionDefinition, CollectionDescription, CollectionStatus, Item,
    ReturnValue,
};
use parking_lot::Mutex;
use tracing::{debug, info};

pub use self::storage::{CollectionStorage, StoragePage};
use crate::error::TransportError;
use crate::expression::ast::ResolvedPath;
use crate::expression::evaluator::{insert_at_path, lookup};
use crate::expression::{BoundExpression, Expr, Projection};
use crate::request::{GetRequest, PutRequest, QueryRequest, ScanRequest, UpdateRequest};
use crate::schema::{KeySchema, SortableAttributeValue, validate_collection_name};
use crate::transport::{ContinuationToken, ResultPage, Transport};

type Attributes = HashMap<String, AttributeValue>;

/// One collection: its description, storage and write lock.
#[derive(Debug)]
struct MemoryCollection {
    description: CollectionDescription,
    storage: CollectionStorage,
    write_lock: Mutex<()>,
}

impl MemoryCollection {
    fn describe(&self) -> CollectionDescription {
        CollectionDescription {
            item_count: self.storage.item_count(),
            ..self.description.clone()
        }
    }

    fn key_schema(&self) -> &KeySchema {
        self.storage.key_schema()
    }

    /// Build the token for the page ending at `last`, if more items follow.
    fn continuation(&self, page: &StoragePage) -> Result<Option<ContinuationToken>, TransportError> {
        if !page.has_more {
            return Ok(None);
        }
        let Some(last) = page.items.last() else {
            return Ok(None);
        };
        let key = self
            .key_schema()
            .key_of_item(&self.description.name, last)
            .map_err(anyhow::Error::new)?;
        Ok(Some(ContinuationToken::from_key(key.to_attributes())))
    }
}

/// A single-process store.
///
/// ```
/// use docstore_core::memory::MemoryTransport;
/// use docstore_core::transport::Transport;
/// use docstore_model::{CollectionDefinition, ScalarAttributeType};
///
/// # tokio_test::block_on(async {
/// let transport = MemoryTransport::new();
/// let description = transport
///     .create_collection(
///         CollectionDefinition::new("Movies")
///             .partition_key("year", ScalarAttributeType::N)
///             .sort_key("title", ScalarAttributeType::S),
///     )
///     .await
///     .unwrap();
/// assert_eq!(description.item_count, 0);
/// assert_eq!(transport.collection_count(), 1);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryTransport {
    collections: DashMap<String, Arc<MemoryCollection>>,
}

impl MemoryTransport {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of collections.
    #[must_use]
    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    fn collection(&self, name: &str) -> Result<Arc<MemoryCollection>, TransportError> {
        self.collections
            .get(name)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| TransportError::CollectionNotFound {
                name: name.to_owned(),
            })
    }
}

/// Evaluate a write condition against the stored item, or against an empty
/// item when there is none.
fn check_condition(
    condition: Option<&BoundExpression<Expr>>,
    existing: Option<&Attributes>,
) -> Result<(), TransportError> {
    let Some(condition) = condition else {
        return Ok(());
    };
    let empty = Attributes::new();
    let item = existing.unwrap_or(&empty);
    if condition.context(item).evaluate(condition.ast())? {
        Ok(())
    } else {
        Err(TransportError::ConditionalCheckFailed)
    }
}

fn project(
    projection: Option<&BoundExpression<Projection>>,
    item: Attributes,
) -> Attributes {
    match projection {
        Some(projection) => projection.context(&item).apply_projection(projection.ast()),
        None => item,
    }
}

/// Keep only `paths` of `item`, nested structure included.
fn updated_attributes(item: &Attributes, paths: &[ResolvedPath]) -> Option<Item> {
    let mut result = Attributes::new();
    for path in paths {
        if let Some(value) = lookup(item, path) {
            insert_at_path(&mut result, path, value.clone());
        }
    }
    (!result.is_empty()).then(|| Item::from_attributes(result))
}

/// Filter and project the raw items of one storage page.
fn finish_page(
    raw: Vec<Attributes>,
    filter: Option<&BoundExpression<Expr>>,
    projection: Option<&BoundExpression<Projection>>,
    continuation: Option<ContinuationToken>,
) -> Result<ResultPage, TransportError> {
    let scanned_count = raw.len();
    let mut items = Vec::with_capacity(raw.len());
    for item in raw {
        if let Some(filter) = filter {
            if !filter.context(&item).evaluate(filter.ast())? {
                continue;
            }
        }
        items.push(Item::from_attributes(project(projection, item)));
    }
    Ok(ResultPage {
        items,
        continuation,
        scanned_count,
    })
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn execute_get(&self, request: &GetRequest) -> Result<Option<Item>, TransportError> {
        let collection = self.collection(&request.collection)?;
        let item = collection.storage.get(&request.key);
        debug!(collection = %request.collection, key = %request.key, found = item.is_some(), "get item");
        Ok(item.map(|item| Item::from_attributes(project(request.projection.as_ref(), item))))
    }

    async fn execute_put(&self, request: &PutRequest) -> Result<Option<Item>, TransportError> {
        let collection = self.collection(&request.collection)?;
        let _guard = collection.write_lock.lock();

        let existing = collection.storage.get(&request.key);
        check_condition(request.condition.as_ref(), existing.as_ref())?;
        let old = collection
            .storage
            .put(&request.key, request.item.attributes().clone());

        Ok(match request.return_values {
            ReturnValue::AllOld => old.map(Item::from_attributes),
            _ => None,
        })
    }

    async fn execute_query(
        &self,
        request: &QueryRequest,
        continuation: Option<&ContinuationToken>,
    ) -> Result<ResultPage, TransportError> {
        let collection = self.collection(&request.collection)?;
        let start = match continuation {
            Some(token) => Some(query_start(collection.key_schema(), token)?),
            None => None,
        };

        let page = collection.storage.query(
            &request.key.partition.value,
            request.key.sort.as_ref(),
            request.scan_forward,
            request.page_size,
            start.as_ref(),
        );
        let next = collection.continuation(&page)?;
        finish_page(
            page.items,
            request.filter.as_ref(),
            request.projection.as_ref(),
            next,
        )
    }

    async fn execute_scan(
        &self,
        request: &ScanRequest,
        continuation: Option<&ContinuationToken>,
    ) -> Result<ResultPage, TransportError> {
        let collection = self.collection(&request.collection)?;
        let start = match continuation {
            Some(token) => Some(
                collection
                    .key_schema()
                    .key_of_item(&request.collection, &token.key())
                    .map_err(anyhow::Error::new)?,
            ),
            None => None,
        };

        let page = collection.storage.scan(request.page_size, start.as_ref());
        let next = collection.continuation(&page)?;
        finish_page(
            page.items,
            request.filter.as_ref(),
            request.projection.as_ref(),
            next,
        )
    }

    async fn execute_update(&self, request: &UpdateRequest) -> Result<Option<Item>, TransportError> {
        let collection = self.collection(&request.collection)?;
        let _guard = collection.write_lock.lock();

        let existing = collection.storage.get(&request.key);
        check_condition(request.condition.as_ref(), existing.as_ref())?;

        let base = existing
            .clone()
            .unwrap_or_else(|| request.key.to_attributes());
        let updated = request
            .update
            .context(&base)
            .apply_update(request.update.ast())?;
        collection.storage.put(&request.key, updated.clone());
        debug!(collection = %request.collection, key = %request.key, created = existing.is_none(), "updated item");

        let targets = || -> Vec<ResolvedPath> {
            request
                .update
                .ast()
                .target_paths()
                .map(|p| p.resolve(request.update.names()))
                .collect()
        };
        Ok(match request.return_values {
            ReturnValue::None => None,
            ReturnValue::AllOld => existing.map(Item::from_attributes),
            ReturnValue::AllNew => Some(Item::from_attributes(updated)),
            ReturnValue::UpdatedOld => existing
                .as_ref()
                .and_then(|old| updated_attributes(old, &targets())),
            ReturnValue::UpdatedNew => updated_attributes(&updated, &targets()),
        })
    }

    async fn create_collection(
        &self,
        definition: CollectionDefinition,
    ) -> Result<CollectionDescription, TransportError> {
        validate_collection_name(&definition.name).map_err(anyhow::Error::new)?;
        let key_schema = KeySchema::from_elements(
            &definition.name,
            &definition.key_schema,
            &definition.attribute_definitions,
        )
        .map_err(anyhow::Error::new)?;

        let entry = match self.collections.entry(definition.name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(TransportError::CollectionInUse {
                    name: definition.name,
                });
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => entry,
        };

        let description = CollectionDescription {
            name: definition.name,
            collection_id: uuid::Uuid::new_v4().to_string(),
            key_schema: definition.key_schema,
            attribute_definitions: definition.attribute_definitions,
            provisioned_throughput: definition.provisioned_throughput,
            status: CollectionStatus::Active,
            creation_date_time: chrono::Utc::now(),
            item_count: 0,
        };
        info!(
            collection = %description.name,
            id = %description.collection_id,
            "created collection"
        );
        entry.insert(Arc::new(MemoryCollection {
            description: description.clone(),
            storage: CollectionStorage::new(key_schema),
            write_lock: Mutex::new(()),
        }));
        Ok(description)
    }

    async fn describe_collection(&self, name: &str) -> Result<CollectionDescription, TransportError> {
        Ok(self.collection(name)?.describe())
    }
}

/// The sort value a query page resumes after.
fn query_start(
    schema: &KeySchema,
    token: &ContinuationToken,
) -> Result<SortableAttributeValue, TransportError> {
    let Some(sort_key) = &schema.sort_key else {
        return Ok(SortableAttributeValue::Sentinel);
    };
    token
        .get(&sort_key.name)
        .and_then(SortableAttributeValue::from_value)
        .ok_or_else(|| {
            anyhow::anyhow!("continuation token lacks sort key {}", sort_key.name).into()
        })
}

#[cfg(test)]
mod tests {
    use docstore_model::ScalarAttributeType;

    use super::*;
    use crate::config::DocStoreConfig;
    use crate::request::{GetSpec, PutSpec, QuerySpec, ScanSpec, UpdateSpec};
    use crate::schema::{Key, TableSchema};

    async fn movies() -> (MemoryTransport, TableSchema) {
        let transport = MemoryTransport::new();
        let description = transport
            .create_collection(
                CollectionDefinition::new("Movies")
                    .partition_key("year", ScalarAttributeType::N)
                    .sort_key("title", ScalarAttributeType::S)
                    .throughput(10, 10),
            )
            .await
            .unwrap();
        let table = TableSchema::from_description(&description).unwrap();
        (transport, table)
    }

    fn config() -> DocStoreConfig {
        DocStoreConfig::default()
    }

    async fn put(transport: &MemoryTransport, table: &TableSchema, item: Item) {
        let request = PutSpec::new(item).build(table, &config()).unwrap();
        transport.execute_put(&request).await.unwrap();
    }

    fn movie_key() -> Key {
        Key::new().with("year", 2015_i64).with("title", "The Big New Movie")
    }

    fn movie() -> Item {
        Item::new()
            .with("year", 2015_i64)
            .with("title", "The Big New Movie")
            .with(
                "info",
                AttributeValue::M(HashMap::from([
                    ("plot".to_owned(), AttributeValue::from("Nothing happens at all.")),
                    ("rating".to_owned(), AttributeValue::from(0_i64)),
                ])),
            )
    }

    #[tokio::test]
    async fn test_should_create_and_describe_collection() {
        let (transport, table) = movies().await;
        assert_eq!(table.key_schema.partition_key.name, "year");
        let description = transport.describe_collection("Movies").await.unwrap();
        assert_eq!(description.status, CollectionStatus::Active);
        assert_eq!(description.provisioned_throughput.read_capacity_units, 10);
        assert!(uuid::Uuid::parse_str(&description.collection_id).is_ok());

        let err = transport
            .create_collection(
                CollectionDefinition::new("Movies").partition_key("year", ScalarAttributeType::N),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::CollectionInUse { .. }));
        assert!(matches!(
            transport.describe_collection("Shows").await,
            Err(TransportError::CollectionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_put_and_get_with_projection() {
        let (transport, table) = movies().await;
        put(&transport, &table, movie()).await;

        let request = GetSpec::new(movie_key())
            .projection("title, info.rating")
            .build(&table, &config())
            .unwrap();
        let item = transport.execute_get(&request).await.unwrap().unwrap();
        assert_eq!(item.len(), 2);
        assert_eq!(item.get_map("info").unwrap().len(), 1);
        assert_eq!(
            transport.describe_collection("Movies").await.unwrap().item_count,
            1
        );
    }

    #[tokio::test]
    async fn test_should_reject_failed_put_condition() {
        let (transport, table) = movies().await;
        let request = PutSpec::new(movie())
            .condition("attribute_not_exists(#yr)")
            .name("#yr", "year")
            .build(&table, &config())
            .unwrap();
        assert!(transport.execute_put(&request).await.unwrap().is_none());
        let err = transport.execute_put(&request).await.unwrap_err();
        assert!(matches!(err, TransportError::ConditionalCheckFailed));
    }

    #[tokio::test]
    async fn test_should_return_old_item_on_put() {
        let (transport, table) = movies().await;
        put(&transport, &table, movie()).await;
        let request = PutSpec::new(movie().with("rating", 1_i64))
            .return_values(ReturnValue::AllOld)
            .build(&table, &config())
            .unwrap();
        let old = transport.execute_put(&request).await.unwrap().unwrap();
        assert!(!old.contains("rating"));
    }

    #[tokio::test]
    async fn test_should_return_updated_new_attributes() {
        let (transport, table) = movies().await;
        put(&transport, &table, movie()).await;
        let request = UpdateSpec::new(
            movie_key(),
            "set info.rating = :r, info.plot = :p, info.actors = :a",
        )
        .value(":r", 5.5_f64)
        .value(":p", "Everything happens all at once.")
        .value(
            ":a",
            AttributeValue::L(vec!["Larry".into(), "Moe".into(), "Curly".into()]),
        )
        .return_values(ReturnValue::UpdatedNew)
        .build(&table, &config())
        .unwrap();

        let returned = transport.execute_update(&request).await.unwrap().unwrap();
        assert_eq!(returned.len(), 1);
        let info = returned.get_map("info").unwrap();
        assert_eq!(info.len(), 3);
        assert_eq!(info["rating"], AttributeValue::N("5.5".to_owned()));
    }

    #[tokio::test]
    async fn test_should_create_item_on_update_of_missing_key() {
        let (transport, table) = movies().await;
        let request = UpdateSpec::new(movie_key(), "set rating = :r add views :one")
            .value(":r", 3_i64)
            .value(":one", 1_i64)
            .return_values(ReturnValue::AllNew)
            .build(&table, &config())
            .unwrap();
        let item = transport.execute_update(&request).await.unwrap().unwrap();
        assert_eq!(item.get_int("year").unwrap(), 2015);
        assert_eq!(item.get_int("views").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_should_reject_failed_update_condition() {
        let (transport, table) = movies().await;
        put(&transport, &table, movie()).await;
        let request = UpdateSpec::new(movie_key(), "set info.rating = :r")
            .condition("info.rating > :r")
            .value(":r", 9_i64)
            .build(&table, &config())
            .unwrap();
        assert!(matches!(
            transport.execute_update(&request).await,
            Err(TransportError::ConditionalCheckFailed)
        ));
    }

    #[tokio::test]
    async fn test_should_page_query_and_report_scanned_count() {
        let (transport, table) = movies().await;
        for (i, title) in ["A", "B", "C", "D", "E"].iter().enumerate() {
            put(
                &transport,
                &table,
                Item::new()
                    .with("year", 1992_i64)
                    .with("title", *title)
                    .with("rank", i64::try_from(i).unwrap()),
            )
            .await;
        }
        let request = QuerySpec::new("#yr = :yyyy")
            .filter("#rank >= :min")
            .name("#yr", "year")
            .name("#rank", "rank")
            .value(":yyyy", 1992_i64)
            .value(":min", 1_i64)
            .page_size(2)
            .build(&table, &config())
            .unwrap();

        let first = transport.execute_query(&request, None).await.unwrap();
        assert_eq!(first.scanned_count, 2);
        assert_eq!(first.items.len(), 1);
        let token = first.continuation.unwrap();
        assert_eq!(token.get("title"), Some(&AttributeValue::from("B")));

        let second = transport.execute_query(&request, Some(&token)).await.unwrap();
        assert_eq!(second.items.len(), 2);
        let third = transport
            .execute_query(&request, second.continuation.as_ref())
            .await
            .unwrap();
        assert_eq!(third.items.len(), 1);
        assert!(third.continuation.is_none());
    }

    #[tokio::test]
    async fn test_should_scan_with_projection() {
        let (transport, table) = movies().await;
        put(&transport, &table, movie()).await;
        let request = ScanSpec::new()
            .projection("#yr, info.plot")
            .name("#yr", "year")
            .build(&table, &config())
            .unwrap();
        let page = transport.execute_scan(&request, None).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.continuation.is_none());
        let item = &page.items[0];
        assert!(!item.contains("title"));
        assert_eq!(item.get_int("year").unwrap(), 2015);
    }
}
