//! In-memory storage backend for permlayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait,
//! together with the predicate compiler that evaluates filters against stored records.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Snapshot selections** - Filtering, sorting, slicing and projection under one read lock
//! - **Compiled filters** - Filters are compiled once into closures, then applied per record
//!
//! # Quick Start
//!
//! ```ignore
//! use bson::doc;
//! use permlayer::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryStore::builder().build().await?;
//!     let store = DocumentStore::new(backend);
//!
//!     store.register_collection(CollectionConfig::new("users")).await?;
//!
//!     let users = store.collection("users").await?;
//!     users.create("superadmin", vec![doc! { "login": "alice" }]).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as permlayer_memory;

pub mod store;
pub mod evaluator;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
pub use evaluator::{RecordPredicate, ValuePredicate, compile, compile_condition};
