//! Declarative record shapes.
//!
//! A [`Shape`] describes which fields a collection's records carry and which of
//! them are nested documents. Collections use it for two things: validating
//! incoming records and enumerating the field paths that receive a default
//! permission triple.

use std::collections::BTreeMap;

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::{
    error::{CollectionError, CollectionResult},
    path::join,
};

/// The expected shape of a value.
///
/// Shapes deserialize from an adjacently tagged form, so a collection shape can
/// be loaded from configuration:
///
/// ```ignore
/// { "type": "object", "of": { "login": { "type": "string" } } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "of", rename_all = "camelCase")]
pub enum Shape {
    /// Accepts any value.
    Any,
    Boolean,
    /// Integers and doubles.
    Number,
    String,
    DateTime,
    /// An array whose elements all match the inner shape.
    Array(Box<Shape>),
    /// A document with exactly these fields.
    Object(BTreeMap<String, Shape>),
    /// The inner shape, or a missing/null value.
    Optional(Box<Shape>),
}

impl Shape {
    /// Creates an object shape from `(field, shape)` pairs.
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Shape)>,
    {
        Shape::Object(
            fields
                .into_iter()
                .map(|(key, shape)| (key.into(), shape))
                .collect(),
        )
    }

    /// Creates an array shape.
    pub fn array(item: Shape) -> Self {
        Shape::Array(Box::new(item))
    }

    /// Wraps this shape so that the value may be missing or null.
    pub fn optional(self) -> Self {
        Shape::Optional(Box::new(self))
    }

    fn fields(&self) -> Option<&BTreeMap<String, Shape>> {
        match self {
            Shape::Object(fields) => Some(fields),
            Shape::Optional(inner) => inner.fields(),
            _ => None,
        }
    }

    /// Checks that `record` matches this shape.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidRecord`] naming the first offending field.
    pub fn validate(&self, record: &Document) -> CollectionResult<()> {
        match self {
            Shape::Any => Ok(()),
            Shape::Object(fields) => check_fields(fields, record, None),
            _ => Err(CollectionError::InvalidRecord(
                "record shape must be an object".to_string(),
            )),
        }
        .inspect_err(|err| tracing::warn!(error = %err, "record rejected by shape"))
    }

    fn check(&self, value: Option<&Bson>, path: &str) -> CollectionResult<()> {
        let value = match (self, value) {
            (Shape::Optional(_), None | Some(Bson::Null)) => return Ok(()),
            (Shape::Optional(inner), value) => return inner.check(value, path),
            (_, None) => return Err(invalid(path, "is missing")),
            (_, Some(value)) => value,
        };

        let matches = match (self, value) {
            (Shape::Any, _) => true,
            (Shape::Boolean, Bson::Boolean(_)) => true,
            (Shape::Number, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_)) => true,
            (Shape::String, Bson::String(_)) => true,
            (Shape::DateTime, Bson::DateTime(_)) => true,
            (Shape::Array(item), Bson::Array(values)) => {
                for (index, value) in values.iter().enumerate() {
                    item.check(Some(value), &format!("{path}[{index}]"))?;
                }
                true
            }
            (Shape::Object(fields), Bson::Document(nested)) => {
                check_fields(fields, nested, Some(path))?;
                true
            }
            _ => false,
        };

        if matches {
            Ok(())
        } else {
            Err(invalid(path, &format!("does not match {self:?}")))
        }
    }

    /// Enumerates the field paths of this shape.
    ///
    /// Paths are dotted and sorted lexicographically at each level. Nested
    /// documents contribute their own path only when `include_containers` is set.
    pub fn field_paths(&self, include_containers: bool) -> Vec<String> {
        let mut paths = Vec::new();

        if let Some(fields) = self.fields() {
            collect_paths(fields, None, include_containers, &mut paths);
        }

        paths
    }
}

fn check_fields(
    fields: &BTreeMap<String, Shape>,
    record: &Document,
    prefix: Option<&str>,
) -> CollectionResult<()> {
    for (key, shape) in fields {
        shape.check(record.get(key), &join(prefix, key))?;
    }

    match record.keys().find(|key| !fields.contains_key(*key)) {
        Some(unknown) => Err(invalid(&join(prefix, unknown), "is not declared")),
        None => Ok(()),
    }
}

fn collect_paths(
    fields: &BTreeMap<String, Shape>,
    prefix: Option<&str>,
    include_containers: bool,
    paths: &mut Vec<String>,
) {
    for (key, shape) in fields {
        let path = join(prefix, key);

        match shape.fields() {
            Some(nested) => {
                if include_containers {
                    paths.push(path.clone());
                }
                collect_paths(nested, Some(&path), include_containers, paths);
            }
            None => paths.push(path),
        }
    }
}

fn invalid(path: &str, reason: &str) -> CollectionError {
    CollectionError::InvalidRecord(format!("field `{path}` {reason}"))
}
