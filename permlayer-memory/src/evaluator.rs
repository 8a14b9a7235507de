//! Predicate compilation for in-memory record filtering.
//!
//! This module turns a parsed [`Filter`] into a boxed closure testing whole
//! records, and a [`Condition`] into a closure testing a single value. The
//! closures own everything they need, so a compiled filter can be applied to
//! any number of records without touching the filter tree again.
//!
//! Operators applied to a value of the wrong kind (a string comparison on a
//! number, `$size` on a scalar) evaluate to `false`.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime};

use permlayer_core::{
    path::lookup,
    query::{Clause, Condition, Filter, as_number},
};

/// Tests one field value. `None` stands for a missing field.
pub type ValuePredicate = Box<dyn Fn(Option<&Bson>) -> bool + Send + Sync>;

/// Tests a whole record.
pub type RecordPredicate = Box<dyn Fn(&Document) -> bool + Send + Sync>;

/// Type-erased, comparable representation of BSON values.
///
/// This enum wraps BSON values and provides comparison operations for
/// filtering and sorting. Integers compare exactly with each other and as f64
/// against doubles. Maps compare regardless of key order.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    /// Null or undefined value
    Null,
    Bool(bool),
    /// Int32 or Int64
    Integer(i64),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    /// Any other BSON value, compared as is
    Other(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Integer(i64::from(*value)),
            Bson::Int64(value) => Comparable::Integer(*value),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            other => Comparable::Other(other),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Integer(a), Comparable::Integer(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::Integer(a), Comparable::Number(b))
            | (Comparable::Number(b), Comparable::Integer(a)) => *a as f64 == *b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Other(a), Comparable::Other(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Integer(a), Comparable::Integer(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::Integer(a), Comparable::Number(b)) => (*a as f64).partial_cmp(b),
            (Comparable::Number(a), Comparable::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Deep equality. A missing value equals `null`.
fn equals(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        Some(value) => Comparable::from(value) == Comparable::from(expected),
        None => Comparable::from(expected) == Comparable::Null,
    }
}

fn ordering(value: Option<&Bson>, expected: &Bson) -> Option<Ordering> {
    value.and_then(|value| Comparable::from(value).partial_cmp(&Comparable::from(expected)))
}

fn string_test(test: impl Fn(&str) -> bool + Send + Sync + 'static) -> ValuePredicate {
    Box::new(move |value| match value {
        Some(Bson::String(text)) => test(text),
        _ => false,
    })
}

fn array_test(test: impl Fn(&[Bson]) -> bool + Send + Sync + 'static) -> ValuePredicate {
    Box::new(move |value| match value {
        Some(Bson::Array(items)) => test(items),
        _ => false,
    })
}

/// Compiles a whole-record filter.
pub fn compile(filter: &Filter) -> RecordPredicate {
    match filter {
        Filter::Fields(fields) => {
            let tests = fields
                .iter()
                .map(|field| (field.path.clone(), compile_condition(&field.condition)))
                .collect::<Vec<_>>();

            Box::new(move |record| {
                tests
                    .iter()
                    .all(|(path, test)| test(lookup(record, path)))
            })
        }
        Filter::And(filters) => {
            let tests = filters.iter().map(compile).collect::<Vec<_>>();
            Box::new(move |record| tests.iter().all(|test| test(record)))
        }
        Filter::Or(filters) => {
            let tests = filters.iter().map(compile).collect::<Vec<_>>();
            Box::new(move |record| tests.iter().any(|test| test(record)))
        }
        Filter::Nor(filters) => {
            let tests = filters.iter().map(compile).collect::<Vec<_>>();
            Box::new(move |record| !tests.iter().any(|test| test(record)))
        }
        Filter::Not(inner) => {
            let test = compile(inner);
            Box::new(move |record| !test(record))
        }
        Filter::Invalid(_) => Box::new(|_| false),
    }
}

/// Compiles the condition a filter assigns to one field.
pub fn compile_condition(condition: &Condition) -> ValuePredicate {
    match condition {
        Condition::Literal(expected) => {
            let expected = expected.clone();
            Box::new(move |value| equals(value, &expected))
        }
        Condition::Document { literal, filter } => {
            let literal = Bson::Document(literal.clone());
            let nested = compile(filter);

            Box::new(move |value| match value {
                Some(Bson::Document(document)) => nested(document),
                other => equals(other, &literal),
            })
        }
        Condition::Clauses(clauses) => {
            let tests = clauses.iter().map(compile_clause).collect::<Vec<_>>();
            Box::new(move |value| tests.iter().all(|test| test(value)))
        }
    }
}

fn compile_ordering(expected: &Bson, accept: fn(Ordering) -> bool) -> ValuePredicate {
    let expected = expected.clone();
    Box::new(move |value| ordering(value, &expected).is_some_and(accept))
}

fn compile_clause(clause: &Clause) -> ValuePredicate {
    match clause {
        Clause::Exists(should_exist) => {
            let should_exist = *should_exist;
            Box::new(move |value| {
                let exists = !matches!(value, None | Some(Bson::Null | Bson::Undefined));
                exists == should_exist
            })
        }
        Clause::Eq(expected) => {
            let expected = expected.clone();
            Box::new(move |value| equals(value, &expected))
        }
        Clause::Ne(expected) => {
            let expected = expected.clone();
            Box::new(move |value| !equals(value, &expected))
        }
        Clause::In(candidates) => {
            let candidates = candidates.clone();
            Box::new(move |value| candidates.iter().any(|candidate| equals(value, candidate)))
        }
        Clause::Nin(candidates) => {
            let candidates = candidates.clone();
            Box::new(move |value| !candidates.iter().any(|candidate| equals(value, candidate)))
        }
        Clause::Gt(expected) => compile_ordering(expected, Ordering::is_gt),
        Clause::Gte(expected) => compile_ordering(expected, Ordering::is_ge),
        Clause::Lt(expected) => compile_ordering(expected, Ordering::is_lt),
        Clause::Lte(expected) => compile_ordering(expected, Ordering::is_le),
        Clause::Mod { divisor, remainder } => {
            let (divisor, remainder) = (*divisor, *remainder);
            Box::new(move |value| {
                value
                    .and_then(as_number)
                    .is_some_and(|number| number % divisor == remainder)
            })
        }
        Clause::Contains(needle) => {
            let needle = needle.clone();
            string_test(move |text| text.contains(needle.as_str()))
        }
        Clause::StartsWith(prefix) => {
            let prefix = prefix.clone();
            string_test(move |text| text.trim().starts_with(prefix.as_str()))
        }
        Clause::EndsWith(suffix) => {
            let suffix = suffix.clone();
            string_test(move |text| text.trim().ends_with(suffix.as_str()))
        }
        Clause::Regex(regex) => {
            let regex = regex.clone();
            string_test(move |text| regex.is_match(text))
        }
        Clause::All(condition) => {
            let test = compile_condition(condition);
            array_test(move |items| items.iter().all(|item| test(Some(item))))
        }
        Clause::ElemMatch(condition) => {
            let test = compile_condition(condition);
            array_test(move |items| items.iter().any(|item| test(Some(item))))
        }
        Clause::Size(size) => {
            let size = *size;
            array_test(move |items| items.len() == size)
        }
        Clause::And(conditions) => {
            let tests = conditions.iter().map(compile_condition).collect::<Vec<_>>();
            Box::new(move |value| tests.iter().all(|test| test(value)))
        }
        Clause::Or(conditions) => {
            let tests = conditions.iter().map(compile_condition).collect::<Vec<_>>();
            Box::new(move |value| tests.iter().any(|test| test(value)))
        }
        Clause::Nor(conditions) => {
            let tests = conditions.iter().map(compile_condition).collect::<Vec<_>>();
            Box::new(move |value| !tests.iter().any(|test| test(value)))
        }
        Clause::Not(condition) => {
            let test = compile_condition(condition);
            Box::new(move |value| !test(value))
        }
        Clause::Invalid { .. } => Box::new(|_| false),
    }
}

/// Orders two optional values for sorting. Missing and incomparable values
/// sort as equal.
pub(crate) fn compare_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => Comparable::from(a)
            .partial_cmp(&Comparable::from(b))
            .unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}
