//! Convenient re-exports of commonly used types from permlayer.
//!
//! ```ignore
//! use permlayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - The document store, collections and operation outcomes
//! - Actors and permission types
//! - Query construction and filters
//! - Configuration, shapes and error types

pub use permlayer_core::{
    actor::{Actor, ActorRegistry, SimpleActor},
    backend::{StoreBackend, StoreBackendBuilder},
    collection::{Collection, Outcome, Status},
    config::{CollectionConfig, StoreConfig},
    error::{CollectionError, CollectionResult},
    intersect::intersect,
    path::{FlatRecord, decompose, recompose},
    permission::{FieldPermissions, OperationKind, PermissionRecord, Reduction},
    projection::project,
    query::{Filter, Query, QueryBuilder, Sort, SortDirection},
    shape::Shape,
    store::DocumentStore,
};
