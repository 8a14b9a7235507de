//! Main permlayer crate providing a unified interface to the permissioned document store.
//!
//! This crate is the primary entry point for users of permlayer. It re-exports the core
//! types and functionality from the sub-crates and provides access to the storage backend.
//!
//! # Features
//!
//! - **MongoDB-style filters** - Literals, clause objects and logical combinators over field paths
//! - **Field-level permissions** - Every field of every record carries its own read, update
//!   and remove requirements
//! - **Redacted results** - Fields an actor may not see are withheld and reported, not errors
//! - **Projection, sorting and paging** - Composable query options
//!
//! # Quick Start
//!
//! ```ignore
//! use bson::doc;
//! use permlayer::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await.unwrap());
//!
//!     store
//!         .register_actor(SimpleActor::new("bob", ["users:read"]))
//!         .await
//!         .unwrap();
//!
//!     store
//!         .register_collection(
//!             CollectionConfig::new("users")
//!                 .default_permissions(FieldPermissions::open().with_read(["users:read"]))
//!                 .override_permissions("password", FieldPermissions::open().with_read(["secrets"])),
//!         )
//!         .await
//!         .unwrap();
//!
//!     let users = store.collection("users").await.unwrap();
//!
//!     users
//!         .create("superadmin", vec![doc! { "login": "alice", "password": "pw", "age": 30 }])
//!         .await
//!         .unwrap();
//!
//!     let outcome = users
//!         .read(
//!             "bob",
//!             Query::builder()
//!                 .filter_doc(doc! { "age": { "$gte": 18 } })
//!                 .build(),
//!         )
//!         .await
//!         .unwrap();
//!
//!     // bob sees alice, without her password
//!     assert_eq!(outcome.status, Status::Partial);
//!     assert_eq!(outcome.not_permitted.get("password"), Some(&1));
//!
//!     store.shutdown().await.unwrap();
//! }
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage

pub mod prelude;

pub use permlayer_core::{
    actor, backend, collection, config, error, intersect, path, permission, projection, query,
    record, shape, store,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend and the predicate compiler it evaluates filters with.
pub mod memory {
    pub use permlayer_memory::{
        InMemoryStore, InMemoryStoreBuilder, RecordPredicate, ValuePredicate, compile,
        compile_condition,
    };
}
