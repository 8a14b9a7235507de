//! Permission-aware collection operations.
//!
//! A [`Collection`] is a handle on one registered collection of a
//! [`DocumentStore`](crate::store::DocumentStore). Every operation runs on
//! behalf of an actor: the actor is resolved first, the backend selects the
//! matching records, and the selection is reduced by the actor's permissions
//! for the kind of operation performed.
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use permlayer::prelude::*;
//!
//! let users = store.collection("users").await?;
//!
//! users.create("alice", vec![doc! { "login": "alice", "age": 30 }]).await?;
//!
//! let outcome = users
//!     .read("bob", Query::builder().filter_doc(doc! { "age": { "$gte": 18 } }).build())
//!     .await?;
//!
//! if outcome.status == Status::Partial {
//!     println!("withheld: {:?}", outcome.not_permitted);
//! }
//! ```

use std::{collections::BTreeMap, sync::Arc};

use bson::{Bson, Document};
use mea::mutex::Mutex;

use crate::{
    actor::{Actor, ActorRegistry},
    backend::StoreBackend,
    config::CollectionConfig,
    error::{CollectionError, CollectionResult},
    intersect::intersect,
    path::{PATH_SEPARATOR, decompose, is_within, lookup, recompose},
    permission::{FieldPermissions, OperationKind, PermissionRecord, Reduction, redact, reduce},
    query::Query,
    record::{
        Entry, merge, record_id, stamp_created, stamp_deleted, stamp_updated,
        without_system_fields,
    },
};

/// Status of an operation outcome, mirroring HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Every selected field was returned.
    Ok,
    /// Some fields were withheld.
    Partial,
    /// Nothing was returned.
    NotFound,
}

impl Status {
    pub fn code(&self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::Partial => 206,
            Status::NotFound => 404,
        }
    }
}

/// Result of a collection operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: Status,
    pub payload: Vec<Document>,
    pub is_restricted: bool,
    pub is_limited: bool,
    /// How many times each field path was withheld.
    pub not_permitted: BTreeMap<String, usize>,
}

impl Outcome {
    fn new(
        payload: Vec<Document>,
        is_restricted: bool,
        is_limited: bool,
        not_permitted: BTreeMap<String, usize>,
    ) -> Self {
        let status = if payload.is_empty() {
            Status::NotFound
        } else if is_restricted {
            Status::Partial
        } else {
            Status::Ok
        };

        Self {
            status,
            payload,
            is_restricted,
            is_limited,
            not_permitted,
        }
    }
}

impl From<Reduction> for Outcome {
    fn from(reduction: Reduction) -> Self {
        let payload = reduction.payload();
        Outcome::new(
            payload,
            reduction.is_restricted,
            reduction.is_limited,
            reduction.not_permitted,
        )
    }
}

/// A handle on one registered collection.
#[derive(Debug)]
pub struct Collection<'a, B: StoreBackend> {
    config: Arc<CollectionConfig>,
    backend: &'a B,
    actors: &'a ActorRegistry,
    write_gate: &'a Mutex<()>,
}

impl<'a, B: StoreBackend> Collection<'a, B> {
    pub(crate) fn new(
        config: Arc<CollectionConfig>,
        backend: &'a B,
        actors: &'a ActorRegistry,
        write_gate: &'a Mutex<()>,
    ) -> Self {
        Self {
            config,
            backend,
            actors,
            write_gate,
        }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Creates records with the collection's default permissions.
    ///
    /// See [`create_with_permissions`](Self::create_with_permissions).
    pub async fn create(&self, actor_id: &str, records: Vec<Document>) -> CollectionResult<Outcome> {
        self.create_with_permissions(actor_id, records, &BTreeMap::new())
            .await
    }

    /// Creates records, replacing the default permission triple of the paths
    /// named in `overrides`.
    ///
    /// Caller-supplied system fields are discarded and every record is stamped
    /// with a fresh `_id`, `_created`, `_updated` and `_deleted`. The payload
    /// holds the stored records.
    ///
    /// # Errors
    ///
    /// - [`CollectionError::ActorNotFound`] for an unknown actor
    /// - [`CollectionError::InvalidRecord`] when a record does not match the
    ///   collection shape; nothing is created in that case
    pub async fn create_with_permissions(
        &self,
        actor_id: &str,
        records: Vec<Document>,
        overrides: &BTreeMap<String, FieldPermissions>,
    ) -> CollectionResult<Outcome> {
        self.actors.resolve(actor_id).await?;

        let mut entries = Vec::with_capacity(records.len());

        for record in &records {
            let content = without_system_fields(record);

            if let Some(shape) = &self.config.shape {
                shape.validate(&content)?;
            }

            let stored = stamp_created(&content, actor_id);
            let id = record_id(&stored)
                .ok_or_else(|| CollectionError::InvalidRecord("record has no identifier".to_string()))?
                .to_string();
            let paths = decompose(&content);
            let permissions = self.config.permission_record(&id, paths.keys(), overrides);

            entries.push(Entry::new(stored, permissions));
        }

        let payload = entries
            .iter()
            .map(|entry| entry.record.clone())
            .collect::<Vec<_>>();

        {
            let _gate = self.write_gate.lock().await;
            self.backend.insert_entries(entries, self.name()).await?;
        }

        tracing::debug!(collection = self.name(), actor = actor_id, created = payload.len(), "records created");

        Ok(Outcome::new(payload, false, false, BTreeMap::new()))
    }

    /// Reads the records matching `query`, redacted to what the actor may read.
    pub async fn read(&self, actor_id: &str, query: Query) -> CollectionResult<Outcome> {
        let actor = self.actors.resolve(actor_id).await?;

        Ok(self
            .reduce_by_permissions(&actor, &query, OperationKind::Read)
            .await?
            .into())
    }

    /// Applies `patch` to the records matching `query`.
    ///
    /// For each matching record, the patch is intersected with the fields the
    /// actor may update, deep-merged into the stored record, and `_updated` is
    /// restamped. A patch path is dropped when a restricted field sits at or
    /// below it, or when it would swap a sub-document for a plain value (or the
    /// reverse). Records the patch leaves unchanged are skipped. The payload
    /// holds the updated records without the fields the actor may not update
    /// or read.
    ///
    /// # Errors
    ///
    /// - [`CollectionError::ActorNotFound`] for an unknown actor
    /// - [`CollectionError::InvalidRecord`] when an updated record no longer
    ///   matches the collection shape; nothing is updated in that case
    pub async fn update(&self, actor_id: &str, query: Query, patch: Document) -> CollectionResult<Outcome> {
        let actor = self.actors.resolve(actor_id).await?;
        let patch = without_system_fields(&patch);
        let _gate = self.write_gate.lock().await;

        let (stored, reduction) = self.select_for_write(&actor, query, OperationKind::Update).await?;
        let Reduction {
            records,
            mut is_restricted,
            is_limited,
            mut not_permitted,
        } = reduction;

        let mut updated = Vec::new();
        let mut payload = Vec::new();

        for redacted in &records {
            let Some(entry) = stored.get(&redacted.id) else {
                continue;
            };

            let Some(allowed) = intersect([&redacted.record, &patch]) else {
                continue;
            };
            let allowed = permitted_patch(&allowed, &entry.record, &redacted.restricted_keys);

            if allowed.is_empty() {
                continue;
            }

            let mut record = entry.record.clone();
            merge(&mut record, allowed);
            stamp_updated(&mut record, actor_id);

            if let Some(shape) = &self.config.shape {
                shape.validate(&without_system_fields(&record))?;
            }

            let view = redact(&record, &redacted.restricted_keys);
            let (view, unreadable) =
                readable_view(&actor, &entry.permissions, &view, &redacted.restricted_keys, &mut not_permitted);

            is_restricted |= unreadable;
            payload.push(view);
            updated.push(record);
        }

        if !updated.is_empty() {
            self.backend.replace_records(updated, self.name()).await?;
        }

        tracing::debug!(collection = self.name(), actor = actor_id, updated = payload.len(), "records updated");

        Ok(Outcome::new(payload, is_restricted, is_limited, not_permitted))
    }

    /// Soft-deletes the records matching `query`.
    ///
    /// Only records without any field the actor may not remove are deleted;
    /// the others are reported through the restriction fields of the outcome.
    /// The payload holds the deleted records without the fields the actor may
    /// not read.
    pub async fn remove(&self, actor_id: &str, query: Query) -> CollectionResult<Outcome> {
        let actor = self.actors.resolve(actor_id).await?;
        let _gate = self.write_gate.lock().await;

        let (stored, reduction) = self.select_for_write(&actor, query, OperationKind::Remove).await?;
        let Reduction {
            records,
            mut is_restricted,
            is_limited,
            mut not_permitted,
        } = reduction;

        let mut removed = Vec::new();
        let mut payload = Vec::new();

        for redacted in records.iter().filter(|redacted| !redacted.is_restricted()) {
            let Some(entry) = stored.get(&redacted.id) else {
                continue;
            };

            let mut record = entry.record.clone();
            stamp_deleted(&mut record, actor_id);

            let (view, unreadable) = readable_view(&actor, &entry.permissions, &record, &[], &mut not_permitted);

            is_restricted |= unreadable;
            payload.push(view);
            removed.push(record);
        }

        if !removed.is_empty() {
            self.backend.replace_records(removed, self.name()).await?;
        }

        tracing::debug!(collection = self.name(), actor = actor_id, removed = payload.len(), "records removed");

        Ok(Outcome::new(payload, is_restricted, is_limited, not_permitted))
    }

    /// Selects the records matching `query` and reduces them to what `actor`
    /// may see for `kind`.
    pub async fn reduce_by_permissions(
        &self,
        actor: &Actor,
        query: &Query,
        kind: OperationKind,
    ) -> CollectionResult<Reduction> {
        let selection = self.backend.select_entries(query, self.name()).await?;

        tracing::debug!(
            collection = self.name(),
            selected = selection.entries.len(),
            limited = selection.is_limited,
            "records selected"
        );

        Ok(reduce(actor, selection, kind))
    }

    /// Selects full entries for a mutation. Projection is ignored so that the
    /// permission check sees every stored field.
    async fn select_for_write(
        &self,
        actor: &Actor,
        mut query: Query,
        kind: OperationKind,
    ) -> CollectionResult<(BTreeMap<String, Entry>, Reduction)> {
        query.projection.clear();

        let selection = self.backend.select_entries(&query, self.name()).await?;
        let stored = selection
            .entries
            .iter()
            .map(|entry| (entry.id().to_string(), entry.clone()))
            .collect();

        Ok((stored, reduce(actor, selection, kind)))
    }
}

/// Keeps the paths of `allowed` that may be merged into `stored`.
///
/// A path is dropped when one of the `restricted` paths lies at or below it,
/// or when it would put a plain value where `stored` holds a sub-document (or
/// the reverse).
fn permitted_patch(allowed: &Document, stored: &Document, restricted: &[String]) -> Document {
    let flat = decompose(allowed)
        .into_iter()
        .filter(|(path, value)| {
            !restricted.iter().any(|denied| is_within(denied, path)) && fits_stored(stored, path, value)
        })
        .collect();

    recompose(&flat)
}

fn fits_stored(stored: &Document, path: &str, value: &Bson) -> bool {
    let mut ancestors = path.match_indices(PATH_SEPARATOR).map(|(at, _)| &path[..at]);

    if ancestors.any(|ancestor| lookup(stored, ancestor).is_some_and(|held| !matches!(held, Bson::Document(_)))) {
        return false;
    }

    match (lookup(stored, path), value) {
        (Some(Bson::Document(_)), _) => false,
        (Some(_), Bson::Document(_)) => false,
        _ => true,
    }
}

/// Strips from `record` the fields `actor` may not read. Paths not already
/// covered by `reported` are tallied in `not_permitted`. Returns the view and
/// whether anything was withheld.
fn readable_view(
    actor: &Actor,
    permissions: &PermissionRecord,
    record: &Document,
    reported: &[String],
    not_permitted: &mut BTreeMap<String, usize>,
) -> (Document, bool) {
    let Actor::Simple(actor) = actor else {
        return (record.clone(), false);
    };

    let unreadable = permissions.restricted_paths(&decompose(record), actor, OperationKind::Read);

    for path in unreadable
        .iter()
        .filter(|path| !reported.iter().any(|parent| is_within(path, parent)))
    {
        *not_permitted.entry(path.clone()).or_default() += 1;
    }

    (redact(record, &unreadable), !unreadable.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn status_codes() {
        assert_eq!(Status::Ok.code(), 200);
        assert_eq!(Status::Partial.code(), 206);
        assert_eq!(Status::NotFound.code(), 404);
    }

    #[test]
    fn outcome_status_follows_payload_and_restriction() {
        let empty = Outcome::new(Vec::new(), true, false, BTreeMap::new());
        let partial = Outcome::new(vec![doc! { "a": 1 }], true, false, BTreeMap::new());
        let full = Outcome::new(vec![doc! { "a": 1 }], false, true, BTreeMap::new());

        assert_eq!(empty.status, Status::NotFound);
        assert_eq!(partial.status, Status::Partial);
        assert_eq!(full.status, Status::Ok);
        assert!(full.is_limited);
    }
}
