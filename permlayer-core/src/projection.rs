//! Restricting records to a requested set of field paths.

use bson::Document;

use crate::path::{FlatRecord, decompose, is_within, recompose};

/// Returns `record` restricted to the requested field `paths`.
///
/// Paths are dotted; requesting a parent path keeps all of its children. An
/// empty path list returns the record unchanged.
///
/// # Example
///
/// ```ignore
/// use bson::doc;
/// use permlayer_core::projection::project;
///
/// let record = doc! { "login": "alice", "data": { "age": 30, "city": "Lyon" } };
///
/// assert_eq!(project(&record, &["data.age"]), doc! { "data": { "age": 30 } });
/// ```
pub fn project<S: AsRef<str>>(record: &Document, paths: &[S]) -> Document {
    if paths.is_empty() {
        return record.clone();
    }

    recompose(&project_flat(&decompose(record), paths))
}

/// Same selection as [`project`] on an already decomposed record.
pub fn project_flat<S: AsRef<str>>(flat: &FlatRecord, paths: &[S]) -> FlatRecord {
    if paths.is_empty() {
        return flat.clone();
    }

    let roots = surviving_paths(paths);

    flat.iter()
        .filter(|(key, _)| roots.iter().any(|root| is_within(key, root)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Drops duplicates and every path already covered by a requested parent.
fn surviving_paths<S: AsRef<str>>(paths: &[S]) -> Vec<&str> {
    let mut surviving: Vec<&str> = Vec::with_capacity(paths.len());

    for path in paths.iter().map(AsRef::as_ref) {
        let subsumed = paths
            .iter()
            .map(AsRef::as_ref)
            .any(|other| other != path && is_within(path, other));

        if !subsumed && !surviving.contains(&path) {
            surviving.push(path);
        }
    }

    surviving
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn sample() -> Document {
        doc! {
            "login": "alice",
            "password": "secret",
            "data": { "firstName": "Alice", "lastName": "Doe", "age": 30 },
        }
    }

    #[test]
    fn empty_projection_is_identity() {
        let paths: [&str; 0] = [];

        assert_eq!(project(&sample(), &paths), sample());
    }

    #[test]
    fn projects_top_level_and_nested_paths() {
        let projected = project(&sample(), &["login", "data.age"]);

        assert_eq!(projected, doc! { "login": "alice", "data": { "age": 30 } });
    }

    #[test]
    fn parent_path_keeps_children() {
        let projected = project(&sample(), &["data.age", "data"]);

        assert_eq!(
            projected,
            doc! { "data": { "firstName": "Alice", "lastName": "Doe", "age": 30 } }
        );
    }

    #[test]
    fn unknown_paths_are_ignored() {
        assert_eq!(project(&sample(), &["nope", "data.nope"]), Document::new());
    }

    #[test]
    fn projection_is_idempotent() {
        let paths = ["password", "data.lastName"];
        let once = project(&sample(), &paths);

        assert_eq!(project(&once, &paths), once);
    }

    #[test]
    fn flat_projection_skips_round_trip() {
        let flat = doc! { "login": "alice", "data.age": 30, "database": 1 };

        assert_eq!(project_flat(&flat, &["data"]), doc! { "data.age": 30 });
    }
}
