//! Partitioned in-memory storage for one collection.
//!
//! Items live in a [`DashMap`] keyed by partition value, each partition a
//! [`BTreeMap`] ordered by sort value. Reads return at most `limit` items
//! and report whether more follow, so callers can emit a continuation token
//! only when another page exists.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use dashmap::DashMap;
use docstore_model::{AttributeValue, Number};
use tracing::debug;

use crate::schema::{KeySchema, PrimaryKey, SortKeyCondition, SortableAttributeValue};

type Attributes = HashMap<String, AttributeValue>;

/// Items read by one storage call.
#[derive(Debug, Default)]
pub struct StoragePage {
    /// Items in read order.
    pub items: Vec<Attributes>,
    /// Whether more items follow the last one.
    pub has_more: bool,
}

/// In-memory storage for a single collection.
#[derive(Debug)]
pub struct CollectionStorage {
    data: DashMap<AttributeValue, BTreeMap<SortableAttributeValue, Attributes>>,
    key_schema: KeySchema,
    item_count: AtomicU64,
}

impl CollectionStorage {
    /// Empty storage for `key_schema`.
    #[must_use]
    pub fn new(key_schema: KeySchema) -> Self {
        Self {
            data: DashMap::new(),
            key_schema,
            item_count: AtomicU64::new(0),
        }
    }

    /// The key schema.
    #[must_use]
    pub fn key_schema(&self) -> &KeySchema {
        &self.key_schema
    }

    /// Number of stored items.
    #[must_use]
    pub fn item_count(&self) -> u64 {
        self.item_count.load(AtomicOrdering::Relaxed)
    }

    /// Insert or replace the item at `key`, returning the previous one.
    pub fn put(&self, key: &PrimaryKey, item: Attributes) -> Option<Attributes> {
        let old = self
            .data
            .entry(partition_id(&key.partition.value))
            .or_default()
            .insert(key.sort_value(), item);
        if old.is_none() {
            self.item_count.fetch_add(1, AtomicOrdering::Relaxed);
            debug!(key = %key, "inserted item");
        } else {
            debug!(key = %key, "replaced item");
        }
        old
    }

    /// The item at `key`.
    #[must_use]
    pub fn get(&self, key: &PrimaryKey) -> Option<Attributes> {
        self.data
            .get(&partition_id(&key.partition.value))
            .and_then(|partition| partition.get(&key.sort_value()).cloned())
    }

    /// Read one partition in sort-key order.
    ///
    /// `exclusive_start` is the sort value of the last item of the previous
    /// page.
    #[must_use]
    pub fn query(
        &self,
        partition: &AttributeValue,
        condition: Option<&SortKeyCondition>,
        scan_forward: bool,
        limit: usize,
        exclusive_start: Option<&SortableAttributeValue>,
    ) -> StoragePage {
        let Some(partition) = self.data.get(&partition_id(partition)) else {
            return StoragePage::default();
        };

        let (lower, upper) = condition_bounds(condition);
        let prefix = match condition {
            Some(SortKeyCondition::BeginsWith(prefix)) => Some(prefix),
            _ => None,
        };

        let items = collect_range(&partition, lower, upper, scan_forward, exclusive_start)
            .filter(|(sort, _)| prefix.is_none_or(|p| sort.starts_with(p)))
            .take(limit.saturating_add(1))
            .map(|(_, item)| item.clone())
            .collect();
        page_of(items, limit)
    }

    /// Read every partition, partitions in key order and items in sort-key
    /// order within each.
    ///
    /// `exclusive_start` is the key of the last item of the previous page.
    #[must_use]
    pub fn scan(&self, limit: usize, exclusive_start: Option<&PrimaryKey>) -> StoragePage {
        let mut partitions: Vec<(SortableAttributeValue, AttributeValue)> = self
            .data
            .iter()
            .map(|entry| (partition_order(entry.key()), entry.key().clone()))
            .collect();
        partitions.sort_by(|a, b| a.0.cmp(&b.0));

        let start = exclusive_start.map(|key| {
            (
                partition_order(&partition_id(&key.partition.value)),
                key.sort_value(),
            )
        });

        let wanted = limit.saturating_add(1);
        let mut items = Vec::new();
        for (order, id) in partitions {
            if items.len() >= wanted {
                break;
            }
            let lower = match &start {
                Some((start_partition, _)) if order < *start_partition => continue,
                Some((start_partition, start_sort)) if order == *start_partition => {
                    Bound::Excluded(start_sort.clone())
                }
                _ => Bound::Unbounded,
            };
            let Some(partition) = self.data.get(&id) else {
                continue;
            };
            let remaining = wanted - items.len();
            items.extend(
                partition
                    .range((lower, Bound::Unbounded))
                    .take(remaining)
                    .map(|(_, item)| item.clone()),
            );
        }
        page_of(items, limit)
    }
}

fn page_of(mut items: Vec<Attributes>, limit: usize) -> StoragePage {
    let has_more = items.len() > limit;
    items.truncate(limit);
    StoragePage { items, has_more }
}

/// Numbers that differ only in formatting address the same partition.
fn partition_id(value: &AttributeValue) -> AttributeValue {
    match value {
        AttributeValue::N(text) => text
            .parse::<Number>()
            .map_or_else(|_| value.clone(), |n| AttributeValue::N(n.to_string())),
        other => other.clone(),
    }
}

fn partition_order(value: &AttributeValue) -> SortableAttributeValue {
    SortableAttributeValue::from_value(value).unwrap_or(SortableAttributeValue::Sentinel)
}

// ---------------------------------------------------------------------------
// Range helpers
// ---------------------------------------------------------------------------

type Bounds = (Bound<SortableAttributeValue>, Bound<SortableAttributeValue>);

fn condition_bounds(condition: Option<&SortKeyCondition>) -> Bounds {
    match condition {
        None => (Bound::Unbounded, Bound::Unbounded),
        Some(SortKeyCondition::Eq(v)) => (Bound::Included(v.clone()), Bound::Included(v.clone())),
        Some(SortKeyCondition::Lt(v)) => (Bound::Unbounded, Bound::Excluded(v.clone())),
        Some(SortKeyCondition::Le(v)) => (Bound::Unbounded, Bound::Included(v.clone())),
        Some(SortKeyCondition::Gt(v)) => (Bound::Excluded(v.clone()), Bound::Unbounded),
        Some(SortKeyCondition::Ge(v)) => (Bound::Included(v.clone()), Bound::Unbounded),
        Some(SortKeyCondition::Between(lo, hi)) => {
            (Bound::Included(lo.clone()), Bound::Included(hi.clone()))
        }
        Some(SortKeyCondition::BeginsWith(prefix)) => {
            (Bound::Included(prefix.clone()), Bound::Unbounded)
        }
    }
}

/// Narrow `lower..upper` past the exclusive start and walk it in the
/// requested direction.
fn collect_range<'a>(
    partition: &'a BTreeMap<SortableAttributeValue, Attributes>,
    lower: Bound<SortableAttributeValue>,
    upper: Bound<SortableAttributeValue>,
    scan_forward: bool,
    exclusive_start: Option<&SortableAttributeValue>,
) -> Box<dyn Iterator<Item = (&'a SortableAttributeValue, &'a Attributes)> + 'a> {
    let (lower, upper) = match exclusive_start {
        Some(start) if scan_forward => (tighter_lower(lower, start), upper),
        Some(start) => (lower, tighter_upper(upper, start)),
        None => (lower, upper),
    };

    if is_empty_range(&lower, &upper) {
        return Box::new(std::iter::empty());
    }
    let range = partition.range((lower, upper));
    if scan_forward {
        Box::new(range)
    } else {
        Box::new(range.rev())
    }
}

fn tighter_lower(
    lower: Bound<SortableAttributeValue>,
    start: &SortableAttributeValue,
) -> Bound<SortableAttributeValue> {
    let keep = matches!(&lower, Bound::Included(l) | Bound::Excluded(l) if start < l);
    if keep { lower } else { Bound::Excluded(start.clone()) }
}

fn tighter_upper(
    upper: Bound<SortableAttributeValue>,
    start: &SortableAttributeValue,
) -> Bound<SortableAttributeValue> {
    let keep = matches!(&upper, Bound::Included(u) | Bound::Excluded(u) if start > u);
    if keep { upper } else { Bound::Excluded(start.clone()) }
}

/// `BTreeMap::range` panics on inverted bounds; treat them as empty.
fn is_empty_range(lower: &Bound<SortableAttributeValue>, upper: &Bound<SortableAttributeValue>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) => l >= u,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use docstore_model::{CollectionDefinition, ScalarAttributeType};

    use super::*;
    use crate::schema::KeyPart;

    fn movies() -> CollectionStorage {
        let def = CollectionDefinition::new("Movies")
            .partition_key("year", ScalarAttributeType::N)
            .sort_key("title", ScalarAttributeType::S);
        CollectionStorage::new(
            KeySchema::from_elements("Movies", &def.key_schema, &def.attribute_definitions)
                .unwrap(),
        )
    }

    fn key(year: i64, title: &str) -> PrimaryKey {
        PrimaryKey {
            partition: KeyPart {
                name: "year".to_owned(),
                value: AttributeValue::from(year),
            },
            sort: Some(KeyPart {
                name: "title".to_owned(),
                value: AttributeValue::from(title),
            }),
        }
    }

    fn put(storage: &CollectionStorage, year: i64, title: &str) {
        let pk = key(year, title);
        storage.put(&pk, pk.to_attributes());
    }

    fn titles(page: &StoragePage) -> Vec<&str> {
        page.items
            .iter()
            .map(|i| i["title"].as_s().unwrap())
            .collect()
    }

    fn s(v: &str) -> SortableAttributeValue {
        SortableAttributeValue::S(v.to_owned())
    }

    fn seeded() -> CollectionStorage {
        let storage = movies();
        for title in ["Alien", "Batman", "Casino", "Dune", "Heat", "Logan", "Rocky"] {
            put(&storage, 1992, title);
        }
        put(&storage, 1985, "Brazil");
        storage
    }

    #[test]
    fn test_should_put_replace_and_get_item() {
        let storage = movies();
        let pk = key(2015, "X");
        assert!(storage.put(&pk, pk.to_attributes()).is_none());
        let mut updated = pk.to_attributes();
        updated.insert("rating".to_owned(), AttributeValue::from(5_i64));
        assert!(storage.put(&pk, updated).is_some());
        assert_eq!(storage.item_count(), 1);
        assert!(storage.get(&pk).unwrap().contains_key("rating"));
    }

    #[test]
    fn test_should_normalize_number_partitions() {
        let storage = movies();
        put(&storage, 2015, "X");
        let mut alt = key(2015, "X");
        alt.partition.value = AttributeValue::N("2015.0".to_owned());
        assert!(storage.get(&alt).is_some());
    }

    #[test]
    fn test_should_query_sort_key_ranges() {
        let storage = seeded();
        let year = AttributeValue::from(1992_i64);
        let between = SortKeyCondition::Between(s("B"), s("H"));
        let page = storage.query(&year, Some(&between), true, 10, None);
        assert_eq!(titles(&page), vec!["Batman", "Casino", "Dune"]);
        assert!(!page.has_more);

        let page = storage.query(&year, Some(&SortKeyCondition::Eq(s("Heat"))), true, 10, None);
        assert_eq!(titles(&page), vec!["Heat"]);

        let page = storage.query(&year, Some(&SortKeyCondition::Gt(s("Heat"))), false, 10, None);
        assert_eq!(titles(&page), vec!["Rocky", "Logan"]);
    }

    #[test]
    fn test_should_query_begins_with_in_both_directions() {
        let storage = movies();
        for title in ["Star Trek", "Star Wars", "Stargate", "Superman", "Rocky"] {
            put(&storage, 1977, title);
        }
        let year = AttributeValue::from(1977_i64);
        let prefix = SortKeyCondition::BeginsWith(s("Star"));
        let page = storage.query(&year, Some(&prefix), true, 10, None);
        assert_eq!(titles(&page), vec!["Star Trek", "Star Wars", "Stargate"]);
        let page = storage.query(&year, Some(&prefix), false, 10, None);
        assert_eq!(titles(&page), vec!["Stargate", "Star Wars", "Star Trek"]);
    }

    #[test]
    fn test_should_page_query_with_exclusive_start() {
        let storage = seeded();
        let year = AttributeValue::from(1992_i64);
        let first = storage.query(&year, None, true, 3, None);
        assert_eq!(titles(&first), vec!["Alien", "Batman", "Casino"]);
        assert!(first.has_more);

        let second = storage.query(&year, None, true, 3, Some(&s("Casino")));
        assert_eq!(titles(&second), vec!["Dune", "Heat", "Logan"]);
        assert!(second.has_more);

        let third = storage.query(&year, None, true, 3, Some(&s("Logan")));
        assert_eq!(titles(&third), vec!["Rocky"]);
        assert!(!third.has_more);

        let reverse = storage.query(&year, None, false, 3, Some(&s("Dune")));
        assert_eq!(titles(&reverse), vec!["Casino", "Batman", "Alien"]);
        assert!(!reverse.has_more);
    }

    #[test]
    fn test_should_not_report_more_when_page_ends_exactly() {
        let storage = seeded();
        let page = storage.query(&AttributeValue::from(1992_i64), None, true, 7, None);
        assert_eq!(page.items.len(), 7);
        assert!(!page.has_more);
    }

    #[test]
    fn test_should_treat_start_past_range_as_empty() {
        let storage = seeded();
        let between = SortKeyCondition::Between(s("B"), s("D"));
        let page = storage.query(
            &AttributeValue::from(1992_i64),
            Some(&between),
            true,
            10,
            Some(&s("Zorro")),
        );
        assert!(page.items.is_empty());
    }

    #[test]
    fn test_should_scan_across_partitions_in_pages() {
        let storage = seeded();
        let first = storage.scan(5, None);
        assert_eq!(titles(&first), vec!["Brazil", "Alien", "Batman", "Casino", "Dune"]);
        assert!(first.has_more);

        let last = first.items.last().unwrap();
        let start = key(
            last["year"].as_n().unwrap().parse().unwrap(),
            last["title"].as_s().unwrap(),
        );
        let second = storage.scan(5, Some(&start));
        assert_eq!(titles(&second), vec!["Heat", "Logan", "Rocky"]);
        assert!(!second.has_more);
    }
}
