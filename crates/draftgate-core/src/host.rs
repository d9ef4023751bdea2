//! Capability contracts the engine requires from the host entity model.
//!
//! The engine never sees concrete host types. Capture reads a live entity
//! through [`DraftableEntity`]; materialization writes back through
//! [`EntityBackend`]. Both are implemented by the host application against
//! whatever model layer it owns.

use std::collections::BTreeMap;

use crate::errors::Result;
use crate::model::DraftId;

/// A `(type, id)` pair naming a real persisted entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub entity_type: String,
    pub id: String,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        EntityRef {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }
}

/// Current target of a to-one reference field on a live entity
///
/// This is the three-way ambiguity every reference carries: no target, a
/// real persisted target, or an unpersisted target standing behind a
/// pending draft. `Unpersisted { draft_id: None }` is the invalid fourth
/// state (unsaved target with no draft) and makes capture fail.
#[derive(Debug, Clone, PartialEq)]
pub enum ReferenceState {
    /// The reference is empty
    Empty,
    /// The target is a real persisted entity
    Persisted { entity_type: String, id: String },
    /// The target is not persisted; `draft_id` names its pending draft,
    /// or is `None` when no saved draft exists for it
    Unpersisted { draft_id: Option<DraftId> },
}

/// Read-only view of a live entity's identity and pending modifications
///
/// The host adapter implements this over its own change-tracking. All
/// field lookups are by the names declared in the entity's
/// [`EntityDescriptor`](crate::registry::EntityDescriptor).
pub trait DraftableEntity {
    /// Declared type name of this entity
    fn entity_type(&self) -> &str;

    /// Identifier, if the entity has one (persisted entities always do)
    fn id(&self) -> Option<&str>;

    /// Whether this entity currently exists in the backing store
    fn is_persisted(&self) -> bool;

    /// The previous target of a reference field, before pending changes.
    ///
    /// A previous target, when present, is always a real persisted entity;
    /// an unsaved prior state is not a valid model state.
    fn reference_prior(&self, field: &str) -> Result<Option<EntityRef>>;

    /// The current (possibly modified) target of a reference field
    fn reference_current(&self, field: &str) -> Result<ReferenceState>;

    /// The `(old, new)` pair for a scalar field, or `None` when the
    /// entity's change-tracking does not mark the field as changed.
    /// JSON `null` stands for an absent value on either side.
    fn scalar_change(
        &self,
        field: &str,
    ) -> Result<Option<(serde_json::Value, serde_json::Value)>>;
}

/// A concrete value produced by resolving one change-set entry
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    /// Empty reference or null scalar
    Null,
    /// Scalar value, passed through verbatim
    Scalar(serde_json::Value),
    /// A real persisted entity (draft references resolve to this once the
    /// referenced draft has been applied)
    Entity(EntityRef),
}

/// Flat mapping of field name to resolved value, ready for a host
/// create/update call
pub type FieldValues = BTreeMap<String, ResolvedValue>;

/// Write-side contract to the host's persisted entities
pub trait EntityBackend {
    /// Whether an entity of the given type and id exists
    fn exists(&self, entity_type: &str, id: &str) -> Result<bool>;

    /// Create a new entity from resolved field values, returning its id
    fn create(&mut self, entity_type: &str, values: &FieldValues) -> Result<String>;

    /// Update an existing entity in place with resolved field values
    fn update(&mut self, entity_type: &str, id: &str, values: &FieldValues) -> Result<()>;

    /// Delete an existing entity
    fn delete(&mut self, entity_type: &str, id: &str) -> Result<()>;
}
