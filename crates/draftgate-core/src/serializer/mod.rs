//! Bidirectional mapping between live entity state and storable change-sets.
//!
//! Serializers are selected through a registry and identified by a stable
//! name stored in each draft's options, so a draft written years ago stays
//! decodable by the serializer that produced it even after the default
//! changes.

pub mod json;

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::{DraftError, Result};
use crate::host::{DraftableEntity, EntityBackend, FieldValues};
use crate::model::{ChangeSet, Draft};
use crate::registry::TypeRegistry;
use crate::store::DraftStore;

pub use json::JsonSerializer;

/// Collaborators a serializer needs while resolving a stored change-set
pub struct ResolveContext<'a> {
    /// Entity type descriptors, for telling reference fields from scalars
    pub registry: &'a TypeRegistry,
    /// Draft store, for same-transaction lookup of referenced drafts
    pub drafts: &'a dyn DraftStore,
    /// Host backend, for validating real entity references
    pub backend: &'a dyn EntityBackend,
}

/// A change-set codec with a stable stored identity
pub trait DraftSerializer {
    /// Identity tag written into draft options. Permanent once shipped.
    fn name(&self) -> &'static str;

    /// Serialize a live entity's pending modifications into a change-set
    fn capture(
        &self,
        registry: &TypeRegistry,
        entity: &dyn DraftableEntity,
    ) -> Result<ChangeSet>;

    /// Deserialize a stored draft's change-set into concrete field values,
    /// resolving references against the draft's own transaction
    fn resolve(&self, cx: &ResolveContext<'_>, draft: &Draft) -> Result<FieldValues>;
}

/// Registry of serializers plus an explicit default chosen at startup
///
/// The default is what capture uses; lookups by stored name are what
/// materialization uses, so old drafts decode with their original codec.
#[derive(Clone)]
pub struct SerializerRegistry {
    by_name: BTreeMap<&'static str, Arc<dyn DraftSerializer>>,
    default_name: &'static str,
}

impl SerializerRegistry {
    /// Build a registry whose default is the given serializer
    pub fn with_default(serializer: Arc<dyn DraftSerializer>) -> Self {
        let default_name = serializer.name();
        let mut by_name = BTreeMap::new();
        by_name.insert(default_name, serializer);
        SerializerRegistry {
            by_name,
            default_name,
        }
    }

    /// Register an additional (non-default) serializer
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the name is already taken.
    pub fn register(&mut self, serializer: Arc<dyn DraftSerializer>) -> Result<()> {
        let name = serializer.name();
        if self.by_name.contains_key(name) {
            return Err(DraftError::InvalidArgument {
                reason: format!("serializer '{}' is already registered", name),
            });
        }
        self.by_name.insert(name, serializer);
        Ok(())
    }

    /// The default serializer used for new captures
    pub fn default_serializer(&self) -> &dyn DraftSerializer {
        self.by_name[self.default_name].as_ref()
    }

    /// Look up a serializer by its stored identity tag
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if no serializer carries that name.
    pub fn get(&self, name: &str) -> Result<&dyn DraftSerializer> {
        self.by_name
            .get(name)
            .map(|s| s.as_ref())
            .ok_or_else(|| DraftError::InvalidArgument {
                reason: format!("unknown serializer '{}'", name),
            })
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        SerializerRegistry::with_default(Arc::new(JsonSerializer))
    }
}
