//! Field-level permissions and the reduction of query results.
//!
//! Every record has a [`PermissionRecord`] twin mapping its field paths to a
//! [`FieldPermissions`] triple. Reducing a selection checks, for each field,
//! that the actor was granted every token the requested [`OperationKind`]
//! requires, and strips the fields that fail.

use std::collections::BTreeMap;

use bson::Document;
use serde::{Deserialize, Serialize};

use crate::{
    actor::{Actor, SimpleActor},
    path::{FlatRecord, decompose, is_within, recompose},
    record::Selection,
};

/// The operation a permission check is performed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Update,
    Remove,
}

/// Tokens required to read, update or remove one field.
///
/// An empty list means the operation needs no token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPermissions {
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub update: Vec<String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl FieldPermissions {
    /// A triple requiring no token for any operation.
    pub fn open() -> Self {
        Self::default()
    }

    pub fn with_read<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_update<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.update = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_remove<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Tokens required for `kind`.
    pub fn required(&self, kind: OperationKind) -> &[String] {
        match kind {
            OperationKind::Read => &self.read,
            OperationKind::Update => &self.update,
            OperationKind::Remove => &self.remove,
        }
    }

    /// `true` when no operation requires any token.
    pub fn is_open(&self) -> bool {
        self.read.is_empty() && self.update.is_empty() && self.remove.is_empty()
    }
}

/// The permission twin of a stored record.
///
/// Field paths are dotted and kept sorted, so a container path always comes
/// before its children. A container's triple applies to everything below it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    id: String,
    fields: BTreeMap<String, FieldPermissions>,
}

impl PermissionRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldPermissions> {
        &self.fields
    }

    pub fn get(&self, path: &str) -> Option<&FieldPermissions> {
        self.fields.get(path)
    }

    /// Sets the triple of `path`, replacing any previous one.
    pub fn set(&mut self, path: impl Into<String>, permissions: FieldPermissions) {
        self.fields.insert(path.into(), permissions);
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, path: impl Into<String>, permissions: FieldPermissions) -> Self {
        self.set(path, permissions);
        self
    }

    /// `true` when no field requires any token for any operation.
    pub fn is_open(&self) -> bool {
        self.fields.values().all(FieldPermissions::is_open)
    }

    /// Paths of `flat` that `actor` may not touch for `kind`.
    ///
    /// A path is only reported when the record actually holds something at or
    /// below it, and never when a parent path was already reported.
    pub fn restricted_paths(
        &self,
        flat: &FlatRecord,
        actor: &SimpleActor,
        kind: OperationKind,
    ) -> Vec<String> {
        let mut restricted: Vec<String> = Vec::new();

        for (path, permissions) in &self.fields {
            if restricted.iter().any(|parent| is_within(path, parent)) {
                continue;
            }

            let present = flat.keys().any(|key| is_within(key, path));

            if present && !actor.grants(permissions.required(kind)) {
                restricted.push(path.clone());
            }
        }

        restricted
    }
}

/// One record of a reduced selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Redacted {
    /// Identifier of the stored record.
    pub id: String,
    /// The record, minus its restricted fields.
    pub record: Document,
    /// Paths removed from the record.
    pub restricted_keys: Vec<String>,
}

impl Redacted {
    pub fn is_restricted(&self) -> bool {
        !self.restricted_keys.is_empty()
    }
}

/// Result of reducing a selection by the actor's permissions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reduction {
    pub records: Vec<Redacted>,
    /// Whether any field of any record was withheld.
    pub is_restricted: bool,
    /// Whether the query limit cut off further matches.
    pub is_limited: bool,
    /// How many times each field path was withheld across the batch.
    pub not_permitted: BTreeMap<String, usize>,
}

impl Reduction {
    /// The redacted records, in selection order.
    pub fn payload(&self) -> Vec<Document> {
        self.records
            .iter()
            .map(|redacted| redacted.record.clone())
            .collect()
    }
}

fn without_paths(flat: FlatRecord, paths: &[String]) -> FlatRecord {
    flat.into_iter()
        .filter(|(key, _)| !paths.iter().any(|denied| is_within(key, denied)))
        .collect()
}

/// Returns `record` without the given paths and everything below them.
pub fn redact(record: &Document, paths: &[String]) -> Document {
    if paths.is_empty() {
        return record.clone();
    }

    recompose(&without_paths(decompose(record), paths))
}

/// Reduces a selection to what `actor` may see for `kind`.
///
/// The superadmin receives the selection unchanged. For a simple actor, each
/// record whose permission twin requires no token at all passes through;
/// otherwise every field the actor lacks a required token for is removed and
/// tallied in [`Reduction::not_permitted`].
pub fn reduce(actor: &Actor, selection: Selection, kind: OperationKind) -> Reduction {
    let Selection { entries, is_limited } = selection;
    let mut reduction = Reduction {
        is_limited,
        ..Reduction::default()
    };

    let actor = match actor {
        Actor::Simple(actor) if !entries.is_empty() => actor,
        _ => {
            reduction.records = entries
                .into_iter()
                .map(|entry| Redacted {
                    id: entry.id().to_string(),
                    record: entry.record,
                    restricted_keys: Vec::new(),
                })
                .collect();
            return reduction;
        }
    };

    for entry in entries {
        let id = entry.id().to_string();

        if entry.permissions.is_open() {
            reduction.records.push(Redacted {
                id,
                record: entry.record,
                restricted_keys: Vec::new(),
            });
            continue;
        }

        let flat = decompose(&entry.record);
        let restricted_keys = entry.permissions.restricted_paths(&flat, actor, kind);

        if restricted_keys.is_empty() {
            reduction.records.push(Redacted {
                id,
                record: entry.record,
                restricted_keys,
            });
            continue;
        }

        for key in &restricted_keys {
            *reduction.not_permitted.entry(key.clone()).or_default() += 1;
        }

        reduction.is_restricted = true;
        reduction.records.push(Redacted {
            id,
            record: recompose(&without_paths(flat, &restricted_keys)),
            restricted_keys,
        });
    }

    tracing::debug!(
        actor = actor.id(),
        ?kind,
        records = reduction.records.len(),
        restricted = reduction.is_restricted,
        "selection reduced"
    );

    reduction
}
