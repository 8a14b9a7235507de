//! Storage backend abstraction for the permissioned store.
//!
//! This module defines the traits that abstract over storage implementations.
//! A backend keeps, per collection, the stored records and their permission
//! twins side by side, and answers [`Query`] selections against one consistent
//! snapshot of both.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use permlayer::backend::StoreBackend;
//! use permlayer::query::Query;
//!
//! let backend = MyBackendImpl::new();
//!
//! backend.create_collection("users").await?;
//! backend.insert_entries(entries, "users").await?;
//!
//! let selection = backend.select_entries(&Query::new(), "users").await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document;
use std::fmt::Debug;

use crate::{
    error::CollectionResult,
    query::Query,
    record::{Entry, Selection},
};

/// Abstract interface for record storage backends.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from
/// multiple async tasks. A single [`select_entries`](Self::select_entries) call
/// must observe one consistent snapshot of a collection: filtering, ordering,
/// slicing and projection never interleave with a mutation.
///
/// # Record Identity
///
/// Records are keyed by their `_id` field. The permission twin of an entry
/// carries the same identifier.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts records together with their permission twins.
    ///
    /// # Errors
    ///
    /// - [`CollectionError::CollectionNotFound`](crate::error::CollectionError::CollectionNotFound) if the collection does not exist
    /// - [`CollectionError::RecordAlreadyExists`](crate::error::CollectionError::RecordAlreadyExists) if any identifier is taken;
    ///   nothing is inserted in that case
    async fn insert_entries(&self, entries: Vec<Entry>, collection: &str) -> CollectionResult<()>;

    /// Replaces stored records by identifier. Permission twins are left unchanged.
    ///
    /// # Errors
    ///
    /// - [`CollectionError::CollectionNotFound`](crate::error::CollectionError::CollectionNotFound) if the collection does not exist
    /// - [`CollectionError::RecordNotFound`](crate::error::CollectionError::RecordNotFound) if any record is not stored;
    ///   nothing is replaced in that case
    /// - [`CollectionError::InvalidRecord`](crate::error::CollectionError::InvalidRecord) if a record has no `_id`
    async fn replace_records(&self, records: Vec<Document>, collection: &str) -> CollectionResult<()>;

    /// Selects the entries matching `query`.
    ///
    /// The filter, identifier list and soft-delete exclusion are applied first,
    /// then the sort, offset and limit, and finally the projection.
    /// [`Selection::is_limited`] is set when the limit cut further matches off.
    async fn select_entries(&self, query: &Query, collection: &str) -> CollectionResult<Selection>;

    /// Creates an empty collection. Creating an existing collection is a no-op.
    async fn create_collection(&self, name: &str) -> CollectionResult<()>;

    /// Drops a collection with all its records and permission twins.
    async fn drop_collection(&self, name: &str) -> CollectionResult<()>;

    /// Lists collection names in lexicographic order.
    async fn list_collections(&self) -> CollectionResult<Vec<String>>;

    /// Gracefully shuts down the backend.
    async fn shutdown(self) -> CollectionResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn insert_entries(&self, entries: Vec<Entry>, collection: &str) -> CollectionResult<()> {
        (*self).insert_entries(entries, collection).await
    }

    async fn replace_records(&self, records: Vec<Document>, collection: &str) -> CollectionResult<()> {
        (*self).replace_records(records, collection).await
    }

    async fn select_entries(&self, query: &Query, collection: &str) -> CollectionResult<Selection> {
        (*self).select_entries(query, collection).await
    }

    async fn create_collection(&self, name: &str) -> CollectionResult<()> {
        (*self).create_collection(name).await
    }

    async fn drop_collection(&self, name: &str) -> CollectionResult<()> {
        (*self).drop_collection(name).await
    }

    async fn list_collections(&self) -> CollectionResult<Vec<String>> {
        (*self).list_collections().await
    }
}

/// Factory trait for constructing backends asynchronously.
#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> CollectionResult<Self::Backend>;
}
