//! Actors and the registry that resolves them.
//!
//! An operation is always performed on behalf of an actor. The superadmin
//! sentinel bypasses field-level checks entirely; a [`SimpleActor`] is checked
//! against the permission tokens it was granted.

use std::collections::{BTreeSet, HashMap};

use mea::rwlock::RwLock;
use uuid::Uuid;

use crate::error::{CollectionError, CollectionResult};

/// An actor with an identifier, a private key and a set of granted permission tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleActor {
    id: String,
    private_key: String,
    permissions: BTreeSet<String>,
}

impl SimpleActor {
    /// Creates an actor with a freshly generated private key.
    pub fn new<I, S>(id: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            private_key: Uuid::new_v4().simple().to_string(),
            permissions: permissions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn private_key(&self) -> &str {
        &self.private_key
    }

    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    /// Returns `true` when every required token was granted to this actor.
    pub fn grants<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required
            .iter()
            .all(|token| self.permissions.contains(token.as_ref()))
    }
}

/// The actor an operation runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// Every operation is allowed and no field is ever restricted.
    SuperAdmin,
    Simple(SimpleActor),
}

impl Actor {
    pub fn is_superadmin(&self) -> bool {
        matches!(self, Actor::SuperAdmin)
    }
}

/// Async-safe registry of the simple actors known to a store.
#[derive(Debug)]
pub struct ActorRegistry {
    superadmin_id: String,
    actors: RwLock<HashMap<String, SimpleActor>>,
}

impl ActorRegistry {
    /// Creates an empty registry; `superadmin_id` resolves to [`Actor::SuperAdmin`].
    pub fn new(superadmin_id: impl Into<String>) -> Self {
        Self {
            superadmin_id: superadmin_id.into(),
            actors: RwLock::new(HashMap::new()),
        }
    }

    pub fn superadmin_id(&self) -> &str {
        &self.superadmin_id
    }

    /// Registers a simple actor.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::ActorAlreadyExists`] when the ID is taken,
    /// including by the superadmin.
    pub async fn register(&self, actor: SimpleActor) -> CollectionResult<()> {
        let mut actors = self.actors.write().await;

        if actor.id() == self.superadmin_id || actors.contains_key(actor.id()) {
            return Err(CollectionError::ActorAlreadyExists(actor.id().to_string()));
        }

        tracing::info!(actor = actor.id(), permissions = actor.permissions().len(), "actor registered");
        actors.insert(actor.id().to_string(), actor);

        Ok(())
    }

    /// Removes a simple actor and returns it.
    pub async fn revoke(&self, id: &str) -> CollectionResult<SimpleActor> {
        let removed = self.actors.write().await.remove(id);

        match removed {
            Some(actor) => {
                tracing::info!(actor = id, "actor revoked");
                Ok(actor)
            }
            None => Err(CollectionError::ActorNotFound(id.to_string())),
        }
    }

    /// Resolves an actor ID.
    ///
    /// # Errors
    ///
    /// Returns [`CollectionError::ActorNotFound`] for unknown IDs.
    pub async fn resolve(&self, id: &str) -> CollectionResult<Actor> {
        if id == self.superadmin_id {
            return Ok(Actor::SuperAdmin);
        }

        self.actors
            .read()
            .await
            .get(id)
            .cloned()
            .map(Actor::Simple)
            .ok_or_else(|| CollectionError::ActorNotFound(id.to_string()))
    }
}
