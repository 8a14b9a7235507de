//! The permissioned document store.
//!
//! [`DocumentStore`] ties a [`StoreBackend`] to an actor registry and to the
//! configurations of the registered collections. It is the entry point for
//! every operation:
//!
//! ```ignore
//! use permlayer::prelude::*;
//! use permlayer::memory::InMemoryStore;
//!
//! let store = DocumentStore::new(InMemoryStore::new());
//!
//! store.register_actor(SimpleActor::new("bob", ["users:read"])).await?;
//! store
//!     .register_collection(CollectionConfig::new("users").shape(user_shape()))
//!     .await?;
//!
//! let users = store.collection("users").await?;
//! ```

use std::{collections::HashMap, sync::Arc};

use mea::{mutex::Mutex, rwlock::RwLock};

use crate::{
    actor::{ActorRegistry, SimpleActor},
    backend::StoreBackend,
    collection::Collection,
    config::{CollectionConfig, StoreConfig},
    error::{CollectionError, CollectionResult},
};

/// A permissioned document store over a storage backend.
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
    actors: ActorRegistry,
    collections: RwLock<HashMap<String, Arc<CollectionConfig>>>,
    write_gate: Mutex<()>,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a store with the default configuration.
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, StoreConfig::default())
    }

    pub fn with_config(backend: B, config: StoreConfig) -> Self {
        Self {
            backend,
            actors: ActorRegistry::new(config.superadmin_id),
            collections: RwLock::new(HashMap::new()),
            write_gate: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn actors(&self) -> &ActorRegistry {
        &self.actors
    }

    /// The actor identifier that resolves to the superadmin.
    pub fn superadmin_id(&self) -> &str {
        self.actors.superadmin_id()
    }

    pub async fn register_actor(&self, actor: SimpleActor) -> CollectionResult<()> {
        self.actors.register(actor).await
    }

    pub async fn revoke_actor(&self, id: &str) -> CollectionResult<SimpleActor> {
        self.actors.revoke(id).await
    }

    /// Registers a collection and creates it in the backend.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::CollectionAlreadyExists`] when the name is taken.
    pub async fn register_collection(&self, config: CollectionConfig) -> CollectionResult<()> {
        let mut collections = self.collections.write().await;

        if collections.contains_key(&config.name) {
            return Err(CollectionError::CollectionAlreadyExists(config.name));
        }

        self.backend.create_collection(&config.name).await?;

        tracing::info!(collection = %config.name, shaped = config.shape.is_some(), "collection registered");
        collections.insert(config.name.clone(), Arc::new(config));

        Ok(())
    }

    /// Returns a handle on a registered collection.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::CollectionNotFound`] for unregistered names.
    pub async fn collection(&self, name: &str) -> CollectionResult<Collection<'_, B>> {
        let config = self
            .collections
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| CollectionError::CollectionNotFound(name.to_string()))?;

        Ok(Collection::new(config, &self.backend, &self.actors, &self.write_gate))
    }

    /// Unregisters a collection and drops its records and permission twins.
    ///
    /// The registration is kept when the backend fails to drop the collection.
    pub async fn drop_collection(&self, name: &str) -> CollectionResult<()> {
        let mut collections = self.collections.write().await;

        if !collections.contains_key(name) {
            return Err(CollectionError::CollectionNotFound(name.to_string()));
        }

        let _gate = self.write_gate.lock().await;
        self.backend.drop_collection(name).await?;
        collections.remove(name);

        tracing::info!(collection = name, "collection dropped");

        Ok(())
    }

    pub async fn list_collections(&self) -> CollectionResult<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Shuts down the backend.
    pub async fn shutdown(self) -> CollectionResult<()> {
        self.backend.shutdown().await?;

        Ok(())
    }
}
