//! Field-wise intersection of records.
//!
//! The update path uses this to keep only the parts of a patch that land on
//! fields the actor is allowed to touch.

use bson::{Bson, Document};

/// Intersects any number of records field by field.
///
/// - no input gives `None`, a single input is returned unchanged;
/// - a key survives only when every input defines it (`undefined` does not count);
/// - when the key holds a sub-document in every input, the sub-documents are
///   intersected recursively;
/// - otherwise the value of the last input wins.
///
/// # Example
///
/// ```ignore
/// use bson::doc;
/// use permlayer_core::intersect::intersect;
///
/// let merged = intersect([&doc! { "a": 1, "b": 2 }, &doc! { "a": 5 }]);
///
/// assert_eq!(merged, Some(doc! { "a": 5 }));
/// ```
pub fn intersect<'a, I>(records: I) -> Option<Document>
where
    I: IntoIterator<Item = &'a Document>,
{
    let records = records.into_iter().collect::<Vec<_>>();

    match records.as_slice() {
        [] => None,
        [single] => Some((*single).clone()),
        all => Some(intersect_all(all)),
    }
}

fn intersect_all(records: &[&Document]) -> Document {
    let mut result = Document::new();
    let Some((first, _)) = records.split_first() else {
        return result;
    };

    for key in first.keys() {
        let values = records
            .iter()
            .map(|record| record.get(key).filter(|value| !matches!(value, Bson::Undefined)))
            .collect::<Option<Vec<&Bson>>>();

        let Some(values) = values else {
            continue;
        };

        let nested = values
            .iter()
            .map(|value| value.as_document())
            .collect::<Option<Vec<&Document>>>();

        match nested {
            Some(nested) => {
                result.insert(key, intersect_all(&nested));
            }
            None => {
                if let Some(last) = values.last() {
                    result.insert(key, (*last).clone());
                }
            }
        }
    }

    result
}
