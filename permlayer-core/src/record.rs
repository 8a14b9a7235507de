//! Stored records, their system fields and their permission twins.
//!
//! Every stored record carries four system fields:
//!
//! - `_id` - unique string identifier
//! - `_created` - `{ at, by }`, set once
//! - `_updated` - `{ at, by }`, restamped on every update
//! - `_deleted` - `false`, or `{ at, by }` once soft-deleted

use bson::{Bson, DateTime, Document, doc, ser::serialize_to_bson};
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{CollectionError, CollectionResult},
    permission::PermissionRecord,
};

pub const ID_FIELD: &str = "_id";
pub const CREATED_FIELD: &str = "_created";
pub const UPDATED_FIELD: &str = "_updated";
pub const DELETED_FIELD: &str = "_deleted";

/// All system fields, in the order they are stamped.
pub const SYSTEM_FIELDS: [&str; 4] = [ID_FIELD, CREATED_FIELD, UPDATED_FIELD, DELETED_FIELD];

/// A record together with its permission twin.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub record: Document,
    pub permissions: PermissionRecord,
}

impl Entry {
    pub fn new(record: Document, permissions: PermissionRecord) -> Self {
        Self { record, permissions }
    }

    /// The record identifier, as carried by the permission twin.
    pub fn id(&self) -> &str {
        self.permissions.id()
    }
}

/// The entries a backend matched for a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub entries: Vec<Entry>,
    /// Whether the query limit cut off further matches.
    pub is_limited: bool,
}

pub fn is_system_field(key: &str) -> bool {
    SYSTEM_FIELDS.contains(&key)
}

/// Returns a copy of `record` without its system fields.
pub fn without_system_fields(record: &Document) -> Document {
    record
        .iter()
        .filter(|(key, _)| !is_system_field(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

pub fn record_id(record: &Document) -> Option<&str> {
    record.get(ID_FIELD).and_then(Bson::as_str)
}

/// Whether the record carries a deletion stamp.
pub fn is_deleted(record: &Document) -> bool {
    matches!(record.get(DELETED_FIELD), Some(Bson::Document(_)))
}

/// Converts a JSON object into a record.
///
/// # Errors
///
/// Returns [`CollectionError::InvalidRecord`] when the value is not an object.
pub fn from_json(value: Value) -> CollectionResult<Document> {
    match serialize_to_bson(&value)? {
        Bson::Document(record) => Ok(record),
        other => Err(CollectionError::InvalidRecord(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Converts a record into JSON.
pub fn to_json(record: &Document) -> CollectionResult<Value> {
    Ok(serde_json::to_value(record)?)
}

fn stamp(actor_id: &str) -> Document {
    doc! { "at": DateTime::from_chrono(Utc::now()), "by": actor_id }
}

/// Prepends fresh system fields to `record`, dropping any caller-supplied ones.
pub fn stamp_created(record: &Document, actor_id: &str) -> Document {
    let created = stamp(actor_id);
    let mut stamped = Document::new();
    stamped.insert(ID_FIELD, Uuid::new_v4().to_string());
    stamped.insert(CREATED_FIELD, created.clone());
    stamped.insert(UPDATED_FIELD, created);
    stamped.insert(DELETED_FIELD, false);

    for (key, value) in without_system_fields(record) {
        stamped.insert(key, value);
    }

    stamped
}

pub fn stamp_updated(record: &mut Document, actor_id: &str) {
    record.insert(UPDATED_FIELD, stamp(actor_id));
}

pub fn stamp_deleted(record: &mut Document, actor_id: &str) {
    let deleted = stamp(actor_id);
    record.insert(UPDATED_FIELD, deleted.clone());
    record.insert(DELETED_FIELD, deleted);
}

/// Deep-merges `patch` into `target`: sub-documents merge key by key, any
/// other value replaces the target's.
pub fn merge(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        match value {
            Bson::Document(nested) => {
                if let Some(Bson::Document(existing)) = target.get_mut(&key) {
                    merge(existing, nested);
                } else {
                    target.insert(key, nested);
                }
            }
            value => {
                target.insert(key, value);
            }
        }
    }
}
