//! In-memory storage implementation for permissioned stores.
//!
//! This module provides an in-memory backend that keeps, per collection, the
//! stored records and their permission twins as two parallel arrays behind an
//! async-safe read-write lock.

use std::{collections::HashMap, sync::Arc};
use async_trait::async_trait;
use mea::rwlock::RwLock;
use bson::Document;

use permlayer_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{CollectionError, CollectionResult},
    path::lookup,
    permission::PermissionRecord,
    projection::project,
    query::{Query, SortDirection},
    record::{Entry, Selection, is_deleted, record_id},
};

use crate::evaluator::{compare_values, compile};

/// Records of one collection and their permission twins, index for index.
#[derive(Debug, Default)]
struct CollectionState {
    records: Vec<Document>,
    permissions: Vec<PermissionRecord>,
}

impl CollectionState {
    fn position(&self, id: &str) -> Option<usize> {
        self.permissions
            .iter()
            .position(|permissions| permissions.id() == id)
    }
}

type StoreMap = HashMap<String, CollectionState>;


/// Thread-safe in-memory storage backend.
///
/// This struct implements the [`StoreBackend`] trait entirely in memory using
/// async-aware read-write locks. Records keep their insertion order.
///
/// # Thread Safety
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, allowing
/// it to be safely shared across async tasks. Multiple clones of the same instance
/// share the same underlying data. A selection holds the read lock from filtering
/// to projection, so it always observes one snapshot of a collection.
///
/// # Performance
///
/// Selections scan every record of a collection; there is no indexing.
///
/// # Example
///
/// ```ignore
/// use permlayer_memory::InMemoryStore;
/// use permlayer::backend::StoreBackend;
/// use permlayer::query::Query;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = InMemoryStore::new();
///
///     store.create_collection("users").await?;
///     store.insert_entries(entries, "users").await?;
///
///     let selection = store.select_entries(&Query::new(), "users").await?;
///     assert_eq!(selection.entries.len(), 1);
///
///     Ok(())
/// }
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    /// collection_name -> records and permission twins
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    /// Creates a builder for constructing an `InMemoryStore`.
    ///
    /// ```ignore
    /// use permlayer_memory::InMemoryStore;
    ///
    /// let store = InMemoryStore::builder().build().await.unwrap();
    /// ```
    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

fn not_found(collection: &str) -> CollectionError {
    CollectionError::CollectionNotFound(collection.to_string())
}


#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_entries(&self, entries: Vec<Entry>, collection: &str) -> CollectionResult<()> {
        let mut store = self.store.write().await;
        let state = store.get_mut(collection).ok_or_else(|| not_found(collection))?;

        for (index, entry) in entries.iter().enumerate() {
            let duplicate = state.position(entry.id()).is_some()
                || entries[..index].iter().any(|earlier| earlier.id() == entry.id());

            if duplicate {
                return Err(CollectionError::RecordAlreadyExists(
                    entry.id().to_string(),
                    collection.to_string(),
                ));
            }
        }

        for Entry { record, permissions } in entries {
            state.records.push(record);
            state.permissions.push(permissions);
        }

        Ok(())
    }

    async fn replace_records(&self, records: Vec<Document>, collection: &str) -> CollectionResult<()> {
        let mut store = self.store.write().await;
        let state = store.get_mut(collection).ok_or_else(|| not_found(collection))?;

        let mut positions = Vec::with_capacity(records.len());

        for record in &records {
            let id = record_id(record).ok_or_else(|| {
                CollectionError::InvalidRecord("record has no `_id`".to_string())
            })?;

            match state.position(id) {
                Some(position) => positions.push(position),
                None => {
                    return Err(CollectionError::RecordNotFound(
                        id.to_string(),
                        collection.to_string(),
                    ));
                }
            }
        }

        for (position, record) in positions.into_iter().zip(records) {
            state.records[position] = record;
        }

        Ok(())
    }

    async fn select_entries(&self, query: &Query, collection: &str) -> CollectionResult<Selection> {
        let store = self.store.read().await;
        let state = store.get(collection).ok_or_else(|| not_found(collection))?;

        let predicate = query.filter.as_ref().map(compile);

        let mut matched = state
            .records
            .iter()
            .zip(&state.permissions)
            .filter(|&(record, permissions)| {
                (query.include_deleted || !is_deleted(record))
                    && query
                        .ids
                        .as_ref()
                        .is_none_or(|ids| ids.iter().any(|id| id == permissions.id()))
                    && predicate.as_ref().is_none_or(|test| test(record))
            })
            .collect::<Vec<_>>();

        if let Some(sort) = &query.sort {
            matched.sort_by(|&(a, _), &(b, _)| {
                let ordering = compare_values(lookup(a, &sort.field), lookup(b, &sort.field));

                match sort.direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }

        let remaining = matched.len().saturating_sub(query.offset.unwrap_or(0));
        let limit = query.limit.unwrap_or(usize::MAX);

        let entries = matched
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(limit)
            .map(|(record, permissions)| {
                Entry::new(project(record, &query.projection), permissions.clone())
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            collection,
            scanned = state.records.len(),
            selected = entries.len(),
            "in-memory selection"
        );

        Ok(Selection {
            entries,
            is_limited: remaining > limit,
        })
    }

    async fn create_collection(&self, name: &str) -> CollectionResult<()> {
        self.store
            .write()
            .await
            .entry(name.to_string())
            .or_default();

        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> CollectionResult<()> {
        let mut store = self.store.write().await;

        if store.remove(name).is_none() {
            return Err(not_found(name));
        }

        Ok(())
    }

    async fn list_collections(&self) -> CollectionResult<Vec<String>> {
        let mut names = self
            .store
            .read()
            .await
            .keys()
            .cloned()
            .collect::<Vec<_>>();

        names.sort();

        Ok(names)
    }
}


/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    /// Builds and returns a new [`InMemoryStore`] instance.
    ///
    /// This always succeeds and returns a freshly initialized store.
    async fn build(self) -> CollectionResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use permlayer_core::{
        permission::FieldPermissions,
        query::Query,
        record::{stamp_created, stamp_deleted},
    };

    fn entry(record: Document) -> Entry {
        let stored = stamp_created(&record, "tester");
        let id = record_id(&stored).unwrap().to_string();
        let permissions = PermissionRecord::new(id).with("age", FieldPermissions::open());

        Entry::new(stored, permissions)
    }

    async fn seeded(ages: &[i32]) -> (InMemoryStore, Vec<String>) {
        let store = InMemoryStore::builder().build().await.unwrap();
        store.create_collection("people").await.unwrap();

        let entries = ages
            .iter()
            .map(|age| entry(doc! { "age": *age, "data": { "age": *age, "city": "Lyon" } }))
            .collect::<Vec<_>>();
        let ids = entries.iter().map(|entry| entry.id().to_string()).collect();

        store.insert_entries(entries, "people").await.unwrap();

        (store, ids)
    }

    fn ages(selection: &Selection) -> Vec<i32> {
        selection
            .entries
            .iter()
            .filter_map(|entry| entry.record.get_i32("age").ok())
            .collect()
    }

    #[tokio::test]
    async fn selects_by_filter_in_insertion_order() {
        let (store, _) = seeded(&[5, 1, 9, 3]).await;
        let query = Query::builder().filter_doc(doc! { "age": { "$gt": 2 } }).build();

        let selection = store.select_entries(&query, "people").await.unwrap();

        assert_eq!(ages(&selection), vec![5, 9, 3]);
        assert!(!selection.is_limited);
    }

    #[tokio::test]
    async fn sorts_slices_and_reports_limit() {
        let (store, _) = seeded(&[5, 1, 9, 3]).await;
        let query = Query::builder()
            .sort("data.age", SortDirection::Desc)
            .offset(1)
            .limit(2)
            .build();

        let selection = store.select_entries(&query, "people").await.unwrap();

        assert_eq!(ages(&selection), vec![5, 3]);
        assert!(selection.is_limited);

        let exact = Query::builder().offset(2).limit(2).build();
        assert!(!store.select_entries(&exact, "people").await.unwrap().is_limited);
    }

    #[tokio::test]
    async fn selects_by_ids_and_projects() {
        let (store, ids) = seeded(&[5, 1]).await;
        let query = Query::builder().ids([ids[1].clone()]).project(["data.city"]).build();

        let selection = store.select_entries(&query, "people").await.unwrap();

        assert_eq!(selection.entries.len(), 1);
        assert_eq!(selection.entries[0].record, doc! { "data": { "city": "Lyon" } });
        assert_eq!(selection.entries[0].id(), ids[1]);
    }

    #[tokio::test]
    async fn soft_deleted_records_are_hidden_unless_requested() {
        let (store, _) = seeded(&[5, 1]).await;
        let mut first = store
            .select_entries(&Query::new(), "people")
            .await
            .unwrap()
            .entries
            .remove(0)
            .record;

        stamp_deleted(&mut first, "tester");
        store.replace_records(vec![first], "people").await.unwrap();

        let live = store.select_entries(&Query::new(), "people").await.unwrap();
        let all = store
            .select_entries(&Query::builder().include_deleted().build(), "people")
            .await
            .unwrap();

        assert_eq!(ages(&live), vec![1]);
        assert_eq!(ages(&all), vec![5, 1]);
    }

    #[tokio::test]
    async fn insert_rejects_duplicates_atomically() {
        let (store, _) = seeded(&[]).await;
        let first = entry(doc! { "age": 1 });
        let again = first.clone();

        let result = store.insert_entries(vec![first, again], "people").await;

        assert!(matches!(result, Err(CollectionError::RecordAlreadyExists(_, _))));
        assert!(store.select_entries(&Query::new(), "people").await.unwrap().entries.is_empty());
    }

    #[tokio::test]
    async fn replace_requires_known_records() {
        let (store, _) = seeded(&[1]).await;
        let stranger = stamp_created(&doc! { "age": 2 }, "tester");

        assert!(matches!(
            store.replace_records(vec![stranger], "people").await,
            Err(CollectionError::RecordNotFound(_, _))
        ));
        assert!(matches!(
            store.replace_records(vec![doc! { "age": 2 }], "people").await,
            Err(CollectionError::InvalidRecord(_))
        ));
    }

    #[tokio::test]
    async fn collection_lifecycle() {
        let store = InMemoryStore::new();

        store.create_collection("b").await.unwrap();
        store.create_collection("a").await.unwrap();
        store.create_collection("a").await.unwrap();

        assert_eq!(store.list_collections().await.unwrap(), vec!["a", "b"]);
        assert!(matches!(
            store.insert_entries(vec![entry(doc! {})], "missing").await,
            Err(CollectionError::CollectionNotFound(_))
        ));
        assert!(matches!(
            store.select_entries(&Query::new(), "missing").await,
            Err(CollectionError::CollectionNotFound(_))
        ));

        store.drop_collection("a").await.unwrap();

        assert!(store.drop_collection("a").await.is_err());
        assert_eq!(store.list_collections().await.unwrap(), vec!["b"]);
    }
}
