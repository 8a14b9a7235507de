//! Store and collection configuration.
//!
//! Both configurations derive [`Deserialize`], so they can be loaded from JSON:
//!
//! ```ignore
//! use permlayer::config::CollectionConfig;
//!
//! let config: CollectionConfig = serde_json::from_str(r#"{
//!     "name": "users",
//!     "shape": { "type": "object", "of": { "login": { "type": "string" } } },
//!     "default_permissions": { "read": [], "update": ["users:write"], "remove": ["users:admin"] },
//!     "overrides": { "login": { "read": [], "update": ["users:admin"] } }
//! }"#)?;
//! ```

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    path::{PATH_SEPARATOR, is_within},
    permission::{FieldPermissions, PermissionRecord},
    record::SYSTEM_FIELDS,
    shape::Shape,
};

pub const DEFAULT_SUPERADMIN_ID: &str = "superadmin";

fn default_superadmin_id() -> String {
    DEFAULT_SUPERADMIN_ID.to_string()
}

/// Store-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// The actor identifier that resolves to the superadmin sentinel.
    #[serde(default = "default_superadmin_id")]
    pub superadmin_id: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            superadmin_id: default_superadmin_id(),
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn superadmin_id(mut self, id: impl Into<String>) -> Self {
        self.superadmin_id = id.into();
        self
    }
}

/// Settings of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    /// Shape records must match. `None` accepts any record.
    #[serde(default)]
    pub shape: Option<Shape>,
    /// Whether container fields get their own permission triple.
    #[serde(default)]
    pub container_permissions: bool,
    /// Triple given to every field of a new record.
    #[serde(default)]
    pub default_permissions: FieldPermissions,
    /// Triples replacing the default for specific paths.
    #[serde(default)]
    pub overrides: BTreeMap<String, FieldPermissions>,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: None,
            container_permissions: false,
            default_permissions: FieldPermissions::open(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    pub fn container_permissions(mut self, enabled: bool) -> Self {
        self.container_permissions = enabled;
        self
    }

    pub fn default_permissions(mut self, permissions: FieldPermissions) -> Self {
        self.default_permissions = permissions;
        self
    }

    pub fn override_permissions(mut self, path: impl Into<String>, permissions: FieldPermissions) -> Self {
        self.overrides.insert(path.into(), permissions);
        self
    }

    /// Builds the permission twin of a new record.
    ///
    /// Every system field and every path of the shape (or, without a shape,
    /// every path in `record_paths`) gets the default triple. With
    /// `container_permissions`, the containers of those paths get one too.
    /// Configured and per-call overrides then replace the triple of their
    /// paths, per-call ones last.
    pub fn permission_record<'a>(
        &self,
        id: &str,
        record_paths: impl IntoIterator<Item = &'a String>,
        overrides: &BTreeMap<String, FieldPermissions>,
    ) -> PermissionRecord {
        let paths: Vec<String> = match &self.shape {
            Some(shape) => shape.field_paths(self.container_permissions),
            None => {
                let mut paths = BTreeSet::new();

                for path in record_paths {
                    if self.container_permissions {
                        paths.extend(
                            path.match_indices(PATH_SEPARATOR)
                                .map(|(at, _)| path[..at].to_string()),
                        );
                    }
                    paths.insert(path.clone());
                }

                paths.into_iter().collect()
            }
        };

        let mut permissions = PermissionRecord::new(id);

        for path in SYSTEM_FIELDS.iter().map(ToString::to_string).chain(paths) {
            permissions.set(path, self.default_permissions.clone());
        }

        for (path, triple) in self.overrides.iter().chain(overrides) {
            if permissions.get(path).is_some() || permissions.fields().keys().any(|known| is_within(known, path)) {
                permissions.set(path.clone(), triple.clone());
            }
        }

        permissions
    }
}
