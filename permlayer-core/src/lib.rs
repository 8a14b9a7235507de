//! An embeddable, permission-aware document layer with a MongoDB-style filter language.
//!
//! This crate is the core of the permlayer project and provides:
//!
//! - **Field paths** ([`path`]) - Flattening nested records into dotted paths and back
//! - **Filters and queries** ([`query`]) - The filter expression tree and query construction
//! - **Projection** ([`projection`]) - Restricting records to requested field paths
//! - **Permissions** ([`permission`]) - Per-field permission twins and result reduction
//! - **Intersection** ([`intersect`]) - Fields common to several records
//! - **Shapes** ([`shape`]) - Record shape validation and field enumeration
//! - **Actors** ([`actor`]) - The superadmin sentinel, simple actors and their registry
//! - **Store backend abstraction** ([`backend`]) - Traits for implementing storage backends
//! - **Collections** ([`collection`]) - Create, read, update and remove on behalf of an actor
//! - **Document store** ([`store`]) - Main entry point tying backend, actors and collections
//! - **Configuration** ([`config`]) - Store and collection settings
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use bson::doc;
//! use permlayer::{prelude::*, memory::InMemoryStore};
//!
//! let store = DocumentStore::new(InMemoryStore::new());
//! store.register_actor(SimpleActor::new("bob", ["profile:read"])).await?;
//! store
//!     .register_collection(
//!         CollectionConfig::new("users")
//!             .override_permissions("password", FieldPermissions::open().with_read(["secrets"])),
//!     )
//!     .await?;
//!
//! let users = store.collection("users").await?;
//! users.create("superadmin", vec![doc! { "login": "alice", "password": "pw" }]).await?;
//!
//! // `password` is withheld from bob
//! let outcome = users.read("bob", Query::new()).await?;
//! assert_eq!(outcome.status, Status::Partial);
//! ```

#[allow(unused_extern_crates)]
extern crate self as permlayer_core;

pub mod actor;
pub mod backend;
pub mod collection;
pub mod config;
pub mod error;
pub mod intersect;
pub mod path;
pub mod permission;
pub mod projection;
pub mod query;
pub mod record;
pub mod shape;
pub mod store;
