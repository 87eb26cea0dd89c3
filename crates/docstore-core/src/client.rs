//! Collection facade.
//!
//! [`DocumentClient`] owns a shared [`Transport`] and the configuration;
//! [`Table`] is a handle to one collection that builds, validates and
//! executes requests against it.

use std::sync::Arc;

use docstore_model::{CollectionDefinition, CollectionDescription, Item};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DocStoreConfig;
use crate::error::AccessError;
use crate::iterator::ResultIterator;
use crate::memory::MemoryTransport;
use crate::request::{GetSpec, PutSpec, QuerySpec, ScanSpec, UpdateSpec};
use crate::schema::{KeySchema, TableSchema, validate_collection_name};
use crate::transport::{Transport, with_timeout};

/// Entry point: a transport plus configuration.
#[derive(Debug, Clone)]
pub struct DocumentClient {
    transport: Arc<dyn Transport>,
    config: Arc<DocStoreConfig>,
}

impl DocumentClient {
    /// Use `transport` with `config`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: DocStoreConfig) -> Self {
        Self {
            transport,
            config: Arc::new(config),
        }
    }

    /// A client over a fresh [`MemoryTransport`].
    #[must_use]
    pub fn in_memory(config: DocStoreConfig) -> Self {
        Self::new(Arc::new(MemoryTransport::new()), config)
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &DocStoreConfig {
        &self.config
    }

    /// Create a collection and return a handle once it is active.
    pub async fn create_collection(
        &self,
        definition: CollectionDefinition,
    ) -> Result<Table, AccessError> {
        let name = definition.name.clone();
        validate_collection_name(&name)?;
        KeySchema::from_elements(&name, &definition.key_schema, &definition.attribute_definitions)?;

        let description = with_timeout(
            self.config.request_timeout(),
            self.transport.create_collection(definition),
        )
        .await
        .map_err(|e| AccessError::from_transport(&name, String::new, e))?;
        self.handle(&description)
    }

    /// Describe a collection.
    pub async fn describe_collection(&self, name: &str) -> Result<CollectionDescription, AccessError> {
        with_timeout(
            self.config.request_timeout(),
            self.transport.describe_collection(name),
        )
        .await
        .map_err(|e| AccessError::from_transport(name, String::new, e))
    }

    /// A handle to an existing collection.
    pub async fn table(&self, name: &str) -> Result<Table, AccessError> {
        let description = self.describe_collection(name).await?;
        self.handle(&description)
    }

    fn handle(&self, description: &CollectionDescription) -> Result<Table, AccessError> {
        Ok(Table {
            schema: TableSchema::from_description(description)?,
            transport: Arc::clone(&self.transport),
            config: Arc::clone(&self.config),
        })
    }
}

/// Handle to one collection.
#[derive(Debug, Clone)]
pub struct Table {
    schema: TableSchema,
    transport: Arc<dyn Transport>,
    config: Arc<DocStoreConfig>,
}

impl Table {
    /// Collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.schema.name
    }

    /// Name and key schema.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Read one item; `None` if it does not exist.
    pub async fn get_item(&self, spec: GetSpec) -> Result<Option<Item>, AccessError> {
        let request = spec.build(&self.schema, &self.config)?;
        debug!(collection = %self.name(), key = %request.key, "get item");
        with_timeout(
            self.config.request_timeout(),
            self.transport.execute_get(&request),
        )
        .await
        .map_err(|e| AccessError::from_transport(self.name(), || request.key.to_string(), e))
    }

    /// Create or replace one item.
    pub async fn put_item(&self, spec: PutSpec) -> Result<Option<Item>, AccessError> {
        let request = spec.build(&self.schema, &self.config)?;
        debug!(collection = %self.name(), key = %request.key, "put item");
        with_timeout(
            self.config.request_timeout(),
            self.transport.execute_put(&request),
        )
        .await
        .map_err(|e| AccessError::from_transport(self.name(), || request.key.to_string(), e))
    }

    /// Update one item, creating it if needed.
    pub async fn update_item(&self, spec: UpdateSpec) -> Result<Option<Item>, AccessError> {
        let request = spec.build(&self.schema, &self.config)?;
        debug!(
            collection = %self.name(),
            key = %request.key,
            update = %request.update,
            "update item"
        );
        with_timeout(
            self.config.request_timeout(),
            self.transport.execute_update(&request),
        )
        .await
        .map_err(|e| AccessError::from_transport(self.name(), || request.key.to_string(), e))
    }

    /// Iterate the items matching a query.
    pub async fn query(&self, spec: QuerySpec) -> Result<ResultIterator, AccessError> {
        self.query_with_cancel(spec, CancellationToken::new()).await
    }

    /// Iterate a query until `cancel` fires.
    pub async fn query_with_cancel(
        &self,
        spec: QuerySpec,
        cancel: CancellationToken,
    ) -> Result<ResultIterator, AccessError> {
        let request = spec.build(&self.schema, &self.config)?;
        debug!(
            collection = %self.name(),
            key_condition = %request.key_condition,
            page_size = request.page_size,
            "query"
        );
        ResultIterator::start(
            Arc::clone(&self.transport),
            request,
            cancel,
            self.config.request_timeout(),
        )
        .await
    }

    /// Iterate every item, optionally filtered.
    pub async fn scan(&self, spec: ScanSpec) -> Result<ResultIterator, AccessError> {
        self.scan_with_cancel(spec, CancellationToken::new()).await
    }

    /// Iterate a scan until `cancel` fires.
    pub async fn scan_with_cancel(
        &self,
        spec: ScanSpec,
        cancel: CancellationToken,
    ) -> Result<ResultIterator, AccessError> {
        let request = spec.build(&self.schema, &self.config)?;
        debug!(collection = %self.name(), page_size = request.page_size, "scan");
        ResultIterator::start(
            Arc::clone(&self.transport),
            request,
            cancel,
            self.config.request_timeout(),
        )
        .await
    }
}
