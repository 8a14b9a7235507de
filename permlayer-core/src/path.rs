//! Dotted field paths over nested records.
//!
//! [`decompose`] flattens a record into a `path -> leaf` map and [`recompose`]
//! rebuilds the nested record from such a map. Projection and permission
//! masking both work on the flat form.
//!
//! ```ignore
//! use bson::doc;
//! use permlayer_core::path::{decompose, recompose};
//!
//! let record = doc! { "login": "alice", "data": { "age": 30 } };
//! let flat = decompose(&record);
//!
//! assert_eq!(flat, doc! { "login": "alice", "data.age": 30 });
//! assert_eq!(recompose(&flat), record);
//! ```

use bson::{Bson, Document};

/// Separator between the segments of a field path.
pub const PATH_SEPARATOR: char = '.';

/// A record flattened into `dotted path -> leaf value` pairs, in record order.
pub type FlatRecord = Document;

/// Flattens `record` into a [`FlatRecord`].
///
/// Non-empty sub-documents are expanded into `parent.child` paths. Every other
/// value is a leaf, including arrays and empty sub-documents (keeping empty
/// documents as leaves is what lets [`recompose`] restore them).
pub fn decompose(record: &Document) -> FlatRecord {
    let mut flat = FlatRecord::new();
    decompose_into(record, None, &mut flat);
    flat
}

fn decompose_into(record: &Document, prefix: Option<&str>, flat: &mut FlatRecord) {
    for (key, value) in record {
        let path = join(prefix, key);

        match value {
            Bson::Document(nested) if !nested.is_empty() => {
                decompose_into(nested, Some(&path), flat)
            }
            _ => {
                flat.insert(path, value.clone());
            }
        }
    }
}

/// Rebuilds a nested record from a [`FlatRecord`].
///
/// Paths are assigned in order. When a later path needs a sub-document where a
/// leaf already sits, the leaf is replaced (last write wins).
pub fn recompose(flat: &FlatRecord) -> Document {
    let mut record = Document::new();

    for (path, value) in flat {
        assign(&mut record, path, value.clone());
    }

    record
}

/// Writes `value` at `path` inside `record`, creating intermediate documents.
pub fn assign(record: &mut Document, path: &str, value: Bson) {
    match path.split_once(PATH_SEPARATOR) {
        None => {
            record.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(record.get(head), Some(Bson::Document(_))) {
                record.insert(head, Document::new());
            }

            if let Some(Bson::Document(child)) = record.get_mut(head) {
                assign(child, rest, value);
            }
        }
    }
}

/// Resolves a dotted `path` against a nested record.
///
/// A key that literally contains the separator is preferred over descending.
pub fn lookup<'a>(record: &'a Document, path: &str) -> Option<&'a Bson> {
    if let Some(value) = record.get(path) {
        return Some(value);
    }

    let (head, rest) = path.split_once(PATH_SEPARATOR)?;

    match record.get(head)? {
        Bson::Document(child) => lookup(child, rest),
        _ => None,
    }
}

/// Returns `true` when `path` is `parent` itself or one of its sub-paths.
pub fn is_within(path: &str, parent: &str) -> bool {
    path.strip_prefix(parent)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(PATH_SEPARATOR))
}

/// Joins an optional prefix and a key into a dotted path.
pub fn join(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}{PATH_SEPARATOR}{key}"),
        None => key.to_string(),
    }
}
