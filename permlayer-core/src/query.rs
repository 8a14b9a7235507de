//! Filter expressions and queries.
//!
//! Filters use a MongoDB-style wire shape and are parsed into a closed tree of
//! [`Filter`], [`Condition`] and [`Clause`] values, which backends evaluate.
//!
//! # Filter wire shape
//!
//! ```ignore
//! use bson::doc;
//! use permlayer_core::query::Filter;
//!
//! let filter = Filter::parse(&doc! {
//!     "age": { "$gte": 18, "$lt": 65 },
//!     "login": { "$sw": "adm" },
//!     "data": { "city": "Lyon" },
//!     "tags": { "$em": "staff" },
//! });
//! ```
//!
//! Each field maps to a literal (implicit equality), a clause object whose keys
//! are `$`-prefixed tokens, or a plain sub-document. The top level may also hold
//! `$not`, `$and`, `$or` and `$nor` over whole-record filters. Clause tokens are
//! case-insensitive.
//!
//! Malformed or unknown clauses never fail parsing: they become
//! [`Clause::Invalid`], which matches nothing.
//!
//! # Query Building
//!
//! ```ignore
//! use permlayer_core::query::{Query, SortDirection};
//!
//! let query = Query::builder()
//!     .filter_doc(doc! { "status": "active" })
//!     .project(["login", "data.age"])
//!     .limit(10)
//!     .sort("login", SortDirection::Asc)
//!     .build();
//! ```

use bson::{Bson, Document, ser::serialize_to_bson};
use regex::Regex;
use serde_json::Value;

use crate::error::{CollectionError, CollectionResult};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// Sort specification for query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The dotted field path to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// A single clause applied to one value.
#[derive(Debug, Clone)]
pub enum Clause {
    /// `$exists`: the value is (or is not) present and non-null.
    Exists(bool),
    /// `$eq`: deep equality.
    Eq(Bson),
    /// `$ne`: deep inequality.
    Ne(Bson),
    /// `$in`: deep-equal to one of the values.
    In(Vec<Bson>),
    /// `$nin`: deep-equal to none of the values.
    Nin(Vec<Bson>),
    Gt(Bson),
    Gte(Bson),
    Lt(Bson),
    Lte(Bson),
    /// `$mod`: `value % divisor == remainder`.
    Mod { divisor: f64, remainder: f64 },
    /// `$cts`: substring containment.
    Contains(String),
    /// `$sw`: prefix of the trimmed value.
    StartsWith(String),
    /// `$ew`: suffix of the trimmed value.
    EndsWith(String),
    /// `$regex`: regular expression match.
    Regex(Regex),
    /// `$all`: every array element matches.
    All(Box<Condition>),
    /// `$em`: some array element matches.
    ElemMatch(Box<Condition>),
    /// `$size`: exact array length.
    Size(usize),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Nor(Vec<Condition>),
    Not(Box<Condition>),
    /// An unknown token or a malformed operand. Never matches.
    Invalid { token: String, reason: String },
}

/// What a single field value must satisfy.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Deep equality with a literal.
    Literal(Bson),
    /// A sub-document without operator keys: applied as a nested filter when
    /// the value is itself a document, compared for deep equality otherwise.
    Document { literal: Document, filter: Filter },
    /// Clauses that must all hold.
    Clauses(Vec<Clause>),
}

/// A field path and the condition its value must satisfy.
#[derive(Debug, Clone)]
pub struct FieldCondition {
    pub path: String,
    pub condition: Condition,
}

/// A filter over whole records.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Every field condition must hold. No conditions match every record.
    Fields(Vec<FieldCondition>),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    /// Inverts the whole wrapped filter.
    Not(Box<Filter>),
    /// An unknown or malformed top-level combinator. Never matches.
    Invalid(String),
}

impl Default for Filter {
    fn default() -> Self {
        Filter::Fields(Vec::new())
    }
}

impl Filter {
    /// A filter matching every record.
    pub fn all() -> Self {
        Filter::default()
    }

    /// Parses a filter document.
    ///
    /// Fields whose value is falsy (`null`, `undefined`, `false`, `0`, `NaN` or
    /// the empty string) add no constraint.
    pub fn parse(document: &Document) -> Self {
        let mut fields = Vec::new();
        let mut combinators = Vec::new();

        for (key, value) in document {
            if key.starts_with('$') {
                combinators.push(Self::parse_combinator(key, value));
            } else if is_truthy(value) {
                fields.push(FieldCondition {
                    path: key.clone(),
                    condition: Condition::parse(value),
                });
            }
        }

        if combinators.is_empty() {
            return Filter::Fields(fields);
        }

        if !fields.is_empty() {
            combinators.insert(0, Filter::Fields(fields));
        }

        match combinators.len() {
            1 => combinators.remove(0),
            _ => Filter::And(combinators),
        }
    }

    /// Parses a filter from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::InvalidFilter`] when the value is not an object.
    pub fn from_json(value: Value) -> CollectionResult<Self> {
        match serialize_to_bson(&value)? {
            Bson::Document(document) => Ok(Self::parse(&document)),
            other => Err(CollectionError::InvalidFilter(format!(
                "expected an object, got {other}"
            ))),
        }
    }

    fn parse_combinator(token: &str, value: &Bson) -> Self {
        let lowered = token.to_ascii_lowercase();

        match (lowered.as_str(), value) {
            ("$not", Bson::Document(inner)) => Filter::Not(Box::new(Self::parse(inner))),
            ("$and" | "$or" | "$nor", Bson::Array(items)) => {
                let filters = items
                    .iter()
                    .map(|item| match item {
                        Bson::Document(inner) => Self::parse(inner),
                        _ => invalid_filter(token, "expects a list of documents"),
                    })
                    .collect();

                match lowered.as_str() {
                    "$and" => Filter::And(filters),
                    "$or" => Filter::Or(filters),
                    _ => Filter::Nor(filters),
                }
            }
            ("$not", _) => invalid_filter(token, "expects a document"),
            ("$and" | "$or" | "$nor", _) => invalid_filter(token, "expects a list of documents"),
            _ => invalid_filter(token, "is not a known combinator"),
        }
    }
}

fn invalid_filter(token: &str, reason: &str) -> Filter {
    tracing::warn!(token, reason, "invalid filter combinator");
    Filter::Invalid(token.to_string())
}

impl Condition {
    /// Parses the value a filter assigns to a field.
    pub fn parse(value: &Bson) -> Self {
        match value {
            Bson::Document(document) if has_operators(document) => Condition::Clauses(
                document
                    .iter()
                    .map(|(token, operand)| Clause::parse(token, operand))
                    .collect(),
            ),
            Bson::Document(document) => Condition::Document {
                literal: document.clone(),
                filter: Filter::parse(document),
            },
            other => Condition::Literal(other.clone()),
        }
    }

    /// Parses the operand of an array clause: clause objects are evaluated,
    /// anything else is compared for deep equality.
    fn parse_element(value: &Bson) -> Self {
        match value {
            Bson::Document(document) if has_operators(document) => Self::parse(value),
            other => Condition::Literal(other.clone()),
        }
    }
}

fn has_operators(document: &Document) -> bool {
    document.keys().any(|key| key.starts_with('$'))
}

impl Clause {
    /// Parses one `token: operand` pair of a clause object.
    pub fn parse(token: &str, operand: &Bson) -> Self {
        let lowered = token.to_ascii_lowercase();

        match lowered.as_str() {
            "$exists" => Clause::Exists(is_truthy(operand)),
            "$eq" => Clause::Eq(operand.clone()),
            "$ne" => Clause::Ne(operand.clone()),
            "$in" | "$nin" => match operand {
                Bson::Array(values) if lowered == "$in" => Clause::In(values.clone()),
                Bson::Array(values) => Clause::Nin(values.clone()),
                _ => invalid_clause(token, "expects a list"),
            },
            "$gt" => Clause::Gt(operand.clone()),
            "$gte" => Clause::Gte(operand.clone()),
            "$lt" => Clause::Lt(operand.clone()),
            "$lte" => Clause::Lte(operand.clone()),
            "$mod" => parse_mod(token, operand),
            "$cts" | "$sw" | "$ew" => match operand {
                Bson::String(text) => match lowered.as_str() {
                    "$cts" => Clause::Contains(text.clone()),
                    "$sw" => Clause::StartsWith(text.clone()),
                    _ => Clause::EndsWith(text.clone()),
                },
                _ => invalid_clause(token, "expects a string"),
            },
            "$regex" => match operand {
                Bson::String(pattern) => match Regex::new(pattern) {
                    Ok(regex) => Clause::Regex(regex),
                    Err(err) => invalid_clause(token, &err.to_string()),
                },
                _ => invalid_clause(token, "expects a pattern string"),
            },
            "$all" => Clause::All(Box::new(Condition::parse_element(operand))),
            "$em" => Clause::ElemMatch(Box::new(Condition::parse_element(operand))),
            "$size" => match as_number(operand) {
                Some(size) if size >= 0.0 && size.fract() == 0.0 => Clause::Size(size as usize),
                _ => invalid_clause(token, "expects a non-negative integer"),
            },
            "$and" | "$or" | "$nor" => match operand {
                Bson::Array(items) => {
                    let conditions = items.iter().map(Condition::parse).collect();

                    match lowered.as_str() {
                        "$and" => Clause::And(conditions),
                        "$or" => Clause::Or(conditions),
                        _ => Clause::Nor(conditions),
                    }
                }
                _ => invalid_clause(token, "expects a list"),
            },
            "$not" => Clause::Not(Box::new(Condition::parse(operand))),
            _ => invalid_clause(token, "is not a known clause"),
        }
    }
}

fn parse_mod(token: &str, operand: &Bson) -> Clause {
    let parts = match operand {
        Bson::Array(values) => match values.as_slice() {
            [divisor] => as_number(divisor).map(|divisor| (divisor, 0.0)),
            [divisor, remainder] => as_number(divisor).zip(as_number(remainder)),
            _ => None,
        },
        other => as_number(other).map(|divisor| (divisor, 0.0)),
    };

    match parts {
        Some((divisor, remainder)) if divisor != 0.0 => Clause::Mod { divisor, remainder },
        _ => invalid_clause(token, "expects a non-zero divisor"),
    }
}

fn invalid_clause(token: &str, reason: &str) -> Clause {
    tracing::warn!(token, reason, "invalid filter clause");
    Clause::Invalid {
        token: token.to_string(),
        reason: reason.to_string(),
    }
}

/// Numeric view of a BSON value.
pub fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(value) => Some(f64::from(*value)),
        Bson::Int64(value) => Some(*value as f64),
        Bson::Double(value) => Some(*value),
        _ => None,
    }
}

fn is_truthy(value: &Bson) -> bool {
    match value {
        Bson::Null | Bson::Undefined => false,
        Bson::Boolean(value) => *value,
        Bson::String(value) => !value.is_empty(),
        other => as_number(other).is_none_or(|number| number != 0.0 && !number.is_nan()),
    }
}

/// A structured query over one collection.
///
/// Use [`QueryBuilder`] for ergonomic construction.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Filter records must match. `None` matches every record.
    pub filter: Option<Filter>,
    /// Restricts the query to these record identifiers.
    pub ids: Option<Vec<String>>,
    /// Field paths to keep in each record. Empty keeps every field.
    pub projection: Vec<String>,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
    /// Number of records to skip.
    pub offset: Option<usize>,
    /// Sort specification for results.
    pub sort: Option<Sort>,
    /// Whether soft-deleted records are selected too.
    pub include_deleted: bool,
}

impl Query {
    /// Creates a query selecting every live record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Creates a new query builder.
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Sets the filter.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filter = Some(filter);
        self
    }

    /// Parses and sets the filter from its document form.
    pub fn filter_doc(self, document: Document) -> Self {
        self.filter(Filter::parse(&document))
    }

    /// Restricts the query to the given record identifiers.
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the projected field paths.
    pub fn project<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.projection = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the maximum number of records to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of records to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Sets the sort specification for the query results.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort = Some(Sort { field: field.into(), direction });
        self
    }

    /// Selects soft-deleted records as well.
    pub fn include_deleted(mut self) -> Self {
        self.query.include_deleted = true;
        self
    }

    /// Builds and returns the final query.
    pub fn build(self) -> Query {
        self.query
    }
}
