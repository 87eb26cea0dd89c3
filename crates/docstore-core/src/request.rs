//! Request specs and the validated requests built from them.
//!
//! A spec holds what the caller wrote: raw expression text, the shared
//! name/value maps, a key descriptor or item, and the optional knobs of the
//! operation. [`GetSpec::build`] and friends bind every expression of the
//! request through one [`Binder`], check the result against the collection's
//! key schema, and return a request the transport can execute as-is. All
//! binding and validation errors surface here, before any transport call.

use docstore_model::{AttributeValue, Item, ReturnValue, ScalarAttributeType};

use crate::config::DocStoreConfig;
use crate::error::{AccessError, ValidationError};
use crate::expression::ast::{CompareOp, FunctionName, LogicalOp, ResolvedPath};
use crate::expression::{
    Binder, BoundExpression, Expr, NameMap, Operand, Projection, UpdateExpr, ValueMap,
};
use crate::schema::{
    Key, KeyAttribute, KeyCondition, KeyPart, KeySchema, PrimaryKey, SortKeyCondition,
    SortableAttributeValue, TableSchema, check_key_value,
};

// ---------------------------------------------------------------------------
// Shared setters
// ---------------------------------------------------------------------------

/// Setters for specs that take `#name` placeholders.
macro_rules! impl_name_setters {
    ($ty:ty) => {
        impl $ty {
            /// Add one `#name` placeholder.
            #[must_use]
            pub fn name(mut self, token: impl Into<String>, attribute: impl Into<String>) -> Self {
                self.names.insert(token.into(), attribute.into());
                self
            }

            /// Replace the name map.
            #[must_use]
            pub fn names(mut self, names: NameMap) -> Self {
                self.names = names;
                self
            }
        }
    };
}

/// Setters for specs that take `:value` placeholders.
macro_rules! impl_value_setters {
    ($ty:ty) => {
        impl $ty {
            /// Add one `:value` placeholder.
            #[must_use]
            pub fn value(mut self, token: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
                self.values.insert(token.into(), value.into());
                self
            }

            /// Replace the value map.
            #[must_use]
            pub fn values(mut self, values: ValueMap) -> Self {
                self.values = values;
                self
            }
        }
    };
}

fn request_binder<'a>(
    names: &'a NameMap,
    values: &'a ValueMap,
    table: &'a TableSchema,
    config: &DocStoreConfig,
) -> Binder<'a> {
    Binder::new(names, values)
        .with_types(&table.key_schema)
        .warn_unused(config.warn_unused_placeholders)
}

fn page_size(
    table: &TableSchema,
    requested: Option<usize>,
    config: &DocStoreConfig,
) -> Result<usize, ValidationError> {
    match requested.unwrap_or(config.page_size) {
        0 => Err(ValidationError::InvalidPageSize {
            collection: table.name.clone(),
        }),
        n => Ok(n),
    }
}

// ---------------------------------------------------------------------------
// Get
// ---------------------------------------------------------------------------

/// Read one item by its full key.
#[derive(Debug, Clone, Default)]
pub struct GetSpec {
    key: Key,
    projection: Option<String>,
    names: NameMap,
    consistent_read: bool,
}

impl_name_setters!(GetSpec);

impl GetSpec {
    /// Read the item with this key.
    #[must_use]
    pub fn new(key: Key) -> Self {
        Self {
            key,
            ..Self::default()
        }
    }

    /// Return only these paths.
    #[must_use]
    pub fn projection(mut self, projection: impl Into<String>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    /// Ask for a strongly consistent read.
    #[must_use]
    pub fn consistent_read(mut self, consistent: bool) -> Self {
        self.consistent_read = consistent;
        self
    }

    /// Validate against `table`.
    pub fn build(
        self,
        table: &TableSchema,
        config: &DocStoreConfig,
    ) -> Result<GetRequest, AccessError> {
        let key = table.key_schema.primary_key(&table.name, &self.key)?;
        let values = ValueMap::new();
        let mut binder = request_binder(&self.names, &values, table, config);
        let projection = binder.bind_opt::<Projection>(self.projection.as_deref())?;
        binder.finish();

        Ok(GetRequest {
            collection: table.name.clone(),
            key,
            projection,
            consistent_read: self.consistent_read,
        })
    }
}

/// A validated get.
#[derive(Debug, Clone)]
pub struct GetRequest {
    /// Target collection.
    pub collection: String,
    /// The item key.
    pub key: PrimaryKey,
    /// Optional projection.
    pub projection: Option<BoundExpression<Projection>>,
    /// Strongly consistent read.
    pub consistent_read: bool,
}

// ---------------------------------------------------------------------------
// Put
// ---------------------------------------------------------------------------

/// Create or fully replace one item.
#[derive(Debug, Clone, Default)]
pub struct PutSpec {
    item: Item,
    condition: Option<String>,
    names: NameMap,
    values: ValueMap,
    return_values: ReturnValue,
}

impl_name_setters!(PutSpec);
impl_value_setters!(PutSpec);

impl PutSpec {
    /// Write `item`.
    #[must_use]
    pub fn new(item: Item) -> Self {
        Self {
            item,
            ..Self::default()
        }
    }

    /// Only write if this condition holds for the stored item.
    #[must_use]
    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// What to return: [`ReturnValue::None`] or [`ReturnValue::AllOld`].
    #[must_use]
    pub fn return_values(mut self, return_values: ReturnValue) -> Self {
        self.return_values = return_values;
        self
    }

    /// Validate against `table`.
    pub fn build(
        self,
        table: &TableSchema,
        config: &DocStoreConfig,
    ) -> Result<PutRequest, AccessError> {
        if !matches!(self.return_values, ReturnValue::None | ReturnValue::AllOld) {
            return Err(ValidationError::InvalidReturnValues {
                operation: "put",
                value: self.return_values,
            }
            .into());
        }
        let key = table
            .key_schema
            .key_of_item(&table.name, self.item.attributes())?;
        let mut binder = request_binder(&self.names, &self.values, table, config);
        let condition = binder.bind_opt::<Expr>(self.condition.as_deref())?;
        binder.finish();

        Ok(PutRequest {
            collection: table.name.clone(),
            key,
            item: self.item,
            condition,
            return_values: self.return_values,
        })
    }
}

/// A validated put.
#[derive(Debug, Clone)]
pub struct PutRequest {
    /// Target collection.
    pub collection: String,
    /// Key of the item.
    pub key: PrimaryKey,
    /// The item to write.
    pub item: Item,
    /// Optional write condition.
    pub condition: Option<BoundExpression<Expr>>,
    /// `None` or `AllOld`.
    pub return_values: ReturnValue,
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// Read the items of one partition, optionally narrowed by the sort key.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    key_condition: String,
    filter: Option<String>,
    projection: Option<String>,
    names: NameMap,
    values: ValueMap,
    scan_forward: bool,
    page_size: Option<usize>,
    consistent_read: bool,
}

impl_name_setters!(QuerySpec);
impl_value_setters!(QuerySpec);

impl QuerySpec {
    /// Query with this key condition.
    #[must_use]
    pub fn new(key_condition: impl Into<String>) -> Self {
        Self {
            key_condition: key_condition.into(),
            filter: None,
            projection: None,
            names: NameMap::new(),
            values: ValueMap::new(),
            scan_forward: true,
            page_size: None,
            consistent_read: false,
        }
    }

    /// Drop items that do not satisfy this condition.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Return only these paths.
    #[must_use]
    pub fn projection(mut self, projection: impl Into<String>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    /// Ascending (`true`, the default) or descending sort-key order.
    #[must_use]
    pub fn scan_forward(mut self, forward: bool) -> Self {
        self.scan_forward = forward;
        self
    }

    /// Items read per page.
    #[must_use]
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Ask for strongly consistent reads.
    #[must_use]
    pub fn consistent_read(mut self, consistent: bool) -> Self {
        self.consistent_read = consistent;
        self
    }

    /// Validate against `table`.
    pub fn build(
        self,
        table: &TableSchema,
        config: &DocStoreConfig,
    ) -> Result<QueryRequest, AccessError> {
        let page_size = page_size(table, self.page_size, config)?;
        let mut binder = request_binder(&self.names, &self.values, table, config);
        let key_condition = binder.bind::<Expr>(&self.key_condition)?;
        let filter = binder.bind_opt::<Expr>(self.filter.as_deref())?;
        let projection = binder.bind_opt::<Projection>(self.projection.as_deref())?;
        binder.finish();

        let key = analyze_key_condition(&table.name, &table.key_schema, &key_condition)?;

        Ok(QueryRequest {
            collection: table.name.clone(),
            key_condition,
            key,
            filter,
            projection,
            scan_forward: self.scan_forward,
            page_size,
            consistent_read: self.consistent_read,
        })
    }
}

/// A validated query.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Target collection.
    pub collection: String,
    /// The key condition as written.
    pub key_condition: BoundExpression<Expr>,
    /// The key condition resolved against the key schema.
    pub key: KeyCondition,
    /// Optional filter.
    pub filter: Option<BoundExpression<Expr>>,
    /// Optional projection.
    pub projection: Option<BoundExpression<Projection>>,
    /// Sort-key order.
    pub scan_forward: bool,
    /// Items read per page.
    pub page_size: usize,
    /// Strongly consistent reads.
    pub consistent_read: bool,
}

// ---------------------------------------------------------------------------
// Scan
// ---------------------------------------------------------------------------

/// Read every item of a collection.
///
/// The filter runs after items are read, so filtered-out items still use up
/// the page: a page may come back short, or empty, with more pages to follow.
#[derive(Debug, Clone, Default)]
pub struct ScanSpec {
    filter: Option<String>,
    projection: Option<String>,
    names: NameMap,
    values: ValueMap,
    page_size: Option<usize>,
    consistent_read: bool,
}

impl_name_setters!(ScanSpec);
impl_value_setters!(ScanSpec);

impl ScanSpec {
    /// Scan without filter or projection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop items that do not satisfy this condition.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Return only these paths.
    #[must_use]
    pub fn projection(mut self, projection: impl Into<String>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    /// Items read per page.
    #[must_use]
    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Ask for strongly consistent reads.
    #[must_use]
    pub fn consistent_read(mut self, consistent: bool) -> Self {
        self.consistent_read = consistent;
        self
    }

    /// Validate against `table`.
    pub fn build(
        self,
        table: &TableSchema,
        config: &DocStoreConfig,
    ) -> Result<ScanRequest, AccessError> {
        let page_size = page_size(table, self.page_size, config)?;
        let mut binder = request_binder(&self.names, &self.values, table, config);
        let filter = binder.bind_opt::<Expr>(self.filter.as_deref())?;
        let projection = binder.bind_opt::<Projection>(self.projection.as_deref())?;
        binder.finish();

        Ok(ScanRequest {
            collection: table.name.clone(),
            filter,
            projection,
            page_size,
            consistent_read: self.consistent_read,
        })
    }
}

/// A validated scan.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    /// Target collection.
    pub collection: String,
    /// Optional filter.
    pub filter: Option<BoundExpression<Expr>>,
    /// Optional projection.
    pub projection: Option<BoundExpression<Projection>>,
    /// Items read per page, before filtering.
    pub page_size: usize,
    /// Strongly consistent reads.
    pub consistent_read: bool,
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

/// Modify the named attributes of one item.
#[derive(Debug, Clone)]
pub struct UpdateSpec {
    key: Key,
    update: String,
    condition: Option<String>,
    names: NameMap,
    values: ValueMap,
    return_values: ReturnValue,
}

impl_name_setters!(UpdateSpec);
impl_value_setters!(UpdateSpec);

impl UpdateSpec {
    /// Apply `update` to the item with this key.
    #[must_use]
    pub fn new(key: Key, update: impl Into<String>) -> Self {
        Self {
            key,
            update: update.into(),
            condition: None,
            names: NameMap::new(),
            values: ValueMap::new(),
            return_values: ReturnValue::None,
        }
    }

    /// Only update if this condition holds for the stored item.
    #[must_use]
    pub fn condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// What to return.
    #[must_use]
    pub fn return_values(mut self, return_values: ReturnValue) -> Self {
        self.return_values = return_values;
        self
    }

    /// Validate against `table`.
    pub fn build(
        self,
        table: &TableSchema,
        config: &DocStoreConfig,
    ) -> Result<UpdateRequest, AccessError> {
        let key = table.key_schema.primary_key(&table.name, &self.key)?;
        let mut binder = request_binder(&self.names, &self.values, table, config);
        let update = binder.bind::<UpdateExpr>(&self.update)?;
        let condition = binder.bind_opt::<Expr>(self.condition.as_deref())?;
        binder.finish();

        validate_update_paths(&table.name, &table.key_schema, &update)?;

        Ok(UpdateRequest {
            collection: table.name.clone(),
            key,
            update,
            condition,
            return_values: self.return_values,
        })
    }
}

/// A validated update.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    /// Target collection.
    pub collection: String,
    /// The item key.
    pub key: PrimaryKey,
    /// The update expression.
    pub update: BoundExpression<UpdateExpr>,
    /// Optional write condition.
    pub condition: Option<BoundExpression<Expr>>,
    /// What to return.
    pub return_values: ReturnValue,
}

// ---------------------------------------------------------------------------
// Key condition analysis
// ---------------------------------------------------------------------------

/// What one conjunct of a key condition asks of its key attribute.
enum Constraint {
    Compare(CompareOp, AttributeValue),
    Between(AttributeValue, AttributeValue),
    BeginsWith(AttributeValue),
}

fn invalid_key_condition(collection: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidKeyCondition {
        collection: collection.to_owned(),
        reason: reason.into(),
    }
}

/// Resolve a bound key condition into a partition equality and at most one
/// sort-key condition.
fn analyze_key_condition(
    collection: &str,
    schema: &KeySchema,
    bound: &BoundExpression<Expr>,
) -> Result<KeyCondition, ValidationError> {
    let mut conjuncts = Vec::new();
    flatten_and(bound.ast(), &mut conjuncts)
        .map_err(|reason| invalid_key_condition(collection, reason))?;

    let mut partition: Option<KeyPart> = None;
    let mut sort: Option<SortKeyCondition> = None;

    for conjunct in conjuncts {
        let (attr, constraint) = key_constraint(conjunct, schema, bound)
            .map_err(|reason| invalid_key_condition(collection, reason))?;

        if attr.name == schema.partition_key.name {
            if partition.is_some() {
                return Err(invalid_key_condition(
                    collection,
                    format!("more than one condition on partition key {}", attr.name),
                ));
            }
            let Constraint::Compare(CompareOp::Eq, value) = constraint else {
                return Err(invalid_key_condition(
                    collection,
                    format!("partition key {} only supports equality", attr.name),
                ));
            };
            check_key_value(collection, attr, &value)?;
            partition = Some(KeyPart {
                name: attr.name.clone(),
                value,
            });
        } else {
            if sort.is_some() {
                return Err(invalid_key_condition(
                    collection,
                    format!("more than one condition on sort key {}", attr.name),
                ));
            }
            sort = Some(sort_condition(collection, attr, constraint)?);
        }
    }

    let partition = partition.ok_or_else(|| {
        invalid_key_condition(
            collection,
            format!(
                "no equality condition on partition key {}",
                schema.partition_key.name
            ),
        )
    })?;

    Ok(KeyCondition { partition, sort })
}

fn flatten_and<'e>(expr: &'e Expr, out: &mut Vec<&'e Expr>) -> Result<(), String> {
    match expr {
        Expr::Logical {
            op: LogicalOp::And,
            left,
            right,
        } => {
            flatten_and(left, out)?;
            flatten_and(right, out)
        }
        Expr::Logical {
            op: LogicalOp::Or, ..
        } => Err("OR is not supported".to_owned()),
        Expr::Not(_) => Err("NOT is not supported".to_owned()),
        Expr::In { .. } => Err("IN is not supported".to_owned()),
        other => {
            out.push(other);
            Ok(())
        }
    }
}

fn key_constraint<'s>(
    expr: &Expr,
    schema: &'s KeySchema,
    bound: &BoundExpression<Expr>,
) -> Result<(&'s KeyAttribute, Constraint), String> {
    match expr {
        Expr::Compare { left, op, right } => {
            let (attr, value, op) = match (
                key_operand(left, schema, bound)?,
                key_operand(right, schema, bound)?,
            ) {
                (Some(attr), None) => (attr, value_operand(right, bound)?, *op),
                (None, Some(attr)) => (attr, value_operand(left, bound)?, op.flipped()),
                _ => {
                    return Err(
                        "each condition must compare one key attribute with one value".to_owned(),
                    );
                }
            };
            if op == CompareOp::Ne {
                return Err(format!("<> is not supported on key attribute {}", attr.name));
            }
            Ok((attr, Constraint::Compare(op, value)))
        }
        Expr::Between { value, low, high } => {
            let attr = key_operand(value, schema, bound)?
                .ok_or_else(|| "BETWEEN must apply to a key attribute".to_owned())?;
            Ok((
                attr,
                Constraint::Between(value_operand(low, bound)?, value_operand(high, bound)?),
            ))
        }
        Expr::Function {
            name: FunctionName::BeginsWith,
            args,
        } => {
            let (Some(target), Some(prefix)) = (args.first(), args.get(1)) else {
                return Err("begins_with takes two arguments".to_owned());
            };
            let attr = key_operand(target, schema, bound)?
                .ok_or_else(|| "begins_with must apply to a key attribute".to_owned())?;
            Ok((attr, Constraint::BeginsWith(value_operand(prefix, bound)?)))
        }
        Expr::Function { name, .. } => Err(format!("function {name} is not supported")),
        other => Err(format!("unsupported condition {other:?}")),
    }
}

/// The key attribute an operand names, `None` for a value placeholder.
fn key_operand<'s>(
    operand: &Operand,
    schema: &'s KeySchema,
    bound: &BoundExpression<Expr>,
) -> Result<Option<&'s KeyAttribute>, String> {
    match operand {
        Operand::Value(_) => Ok(None),
        Operand::Size(path) => Err(format!("size({path}) is not supported")),
        Operand::Path(path) => {
            if !path.is_top_level() {
                return Err(format!(
                    "nested path {} is not a key attribute",
                    path.resolve(bound.names())
                ));
            }
            let name = path.top_name(bound.names()).unwrap_or_default();
            schema
                .key_attributes()
                .find(|k| k.name == name)
                .map(Some)
                .ok_or_else(|| format!("{name} is not a key attribute"))
        }
    }
}

fn value_operand(operand: &Operand, bound: &BoundExpression<Expr>) -> Result<AttributeValue, String> {
    match operand {
        Operand::Value(token) => bound
            .values()
            .get(token)
            .cloned()
            .ok_or_else(|| format!("{token} is not bound")),
        other => Err(format!("{other} must be a value placeholder")),
    }
}

fn sort_condition(
    collection: &str,
    attr: &KeyAttribute,
    constraint: Constraint,
) -> Result<SortKeyCondition, ValidationError> {
    let sortable = |value: &AttributeValue| -> Result<SortableAttributeValue, ValidationError> {
        check_key_value(collection, attr, value)?;
        SortableAttributeValue::from_value(value).ok_or_else(|| {
            invalid_key_condition(collection, format!("{value} is not a key scalar"))
        })
    };

    match constraint {
        Constraint::Compare(op, value) => {
            let value = sortable(&value)?;
            Ok(match op {
                CompareOp::Eq => SortKeyCondition::Eq(value),
                CompareOp::Lt => SortKeyCondition::Lt(value),
                CompareOp::Le => SortKeyCondition::Le(value),
                CompareOp::Gt => SortKeyCondition::Gt(value),
                CompareOp::Ge => SortKeyCondition::Ge(value),
                CompareOp::Ne => {
                    return Err(invalid_key_condition(
                        collection,
                        format!("<> is not supported on key attribute {}", attr.name),
                    ));
                }
            })
        }
        Constraint::Between(low, high) => {
            let (low, high) = (sortable(&low)?, sortable(&high)?);
            if low > high {
                return Err(invalid_key_condition(
                    collection,
                    format!("BETWEEN bounds of {} are out of order", attr.name),
                ));
            }
            Ok(SortKeyCondition::Between(low, high))
        }
        Constraint::BeginsWith(prefix) => {
            if attr.attr_type == ScalarAttributeType::N {
                return Err(invalid_key_condition(
                    collection,
                    format!("begins_with is not supported on number sort key {}", attr.name),
                ));
            }
            Ok(SortKeyCondition::BeginsWith(sortable(&prefix)?))
        }
    }
}

// ---------------------------------------------------------------------------
// Update path validation
// ---------------------------------------------------------------------------

/// Reject updates of key attributes and pairs of overlapping targets.
fn validate_update_paths(
    collection: &str,
    schema: &KeySchema,
    update: &BoundExpression<UpdateExpr>,
) -> Result<(), ValidationError> {
    let names = update.names();
    let mut resolved: Vec<ResolvedPath> = Vec::new();

    for path in update.ast().target_paths() {
        let key_target = path
            .top_name(names)
            .filter(|name| path.is_top_level() && schema.is_key_attribute(name));
        if let Some(name) = key_target {
            return Err(ValidationError::KeyAttributeUpdate {
                collection: collection.to_owned(),
                attribute: name.to_owned(),
            });
        }

        let current = path.resolve(names);
        if let Some(other) = resolved
            .iter()
            .find(|p| p.overlaps(&current) || p.conflicts(&current))
        {
            return Err(ValidationError::OverlappingUpdatePaths {
                collection: collection.to_owned(),
                first: other.to_string(),
                second: current.to_string(),
            });
        }
        resolved.push(current);
    }
    Ok(())
}
