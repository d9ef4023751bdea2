//! Registry of host entity types known to the engine.
//!
//! Stored type names are resolved against this registry instead of by
//! dynamic symbol lookup: an unknown name is a typed error, never a crash.
//! The registry is populated once at startup by the host application.

use std::collections::BTreeMap;

use crate::errors::{DraftError, Result};
use crate::model::DRAFT_TYPE;

/// A declared to-one reference field on an entity type
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceField {
    /// Field name as it appears in change-sets
    pub name: String,
    /// Declared target type name; `None` for polymorphic references,
    /// whose target type is read from the live entity at capture time
    pub target_type: Option<String>,
}

impl ReferenceField {
    /// A reference with a fixed declared target type
    pub fn to(name: impl Into<String>, target_type: impl Into<String>) -> Self {
        ReferenceField {
            name: name.into(),
            target_type: Some(target_type.into()),
        }
    }

    /// A polymorphic reference (target type varies per instance)
    pub fn polymorphic(name: impl Into<String>) -> Self {
        ReferenceField {
            name: name.into(),
            target_type: None,
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        self.target_type.is_none()
    }
}

/// Capability descriptor for one host entity type
///
/// Bundles what the engine needs to know about a type: its to-one
/// reference fields and its scalar field names (excluding the backing
/// keys of references, which the host never exposes here).
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDescriptor {
    /// Declared type name, as stored in drafts
    pub type_name: String,
    /// Declared to-one reference fields, in declaration order
    pub reference_fields: Vec<ReferenceField>,
    /// Scalar field names, in declaration order
    pub scalar_fields: Vec<String>,
}

impl EntityDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        EntityDescriptor {
            type_name: type_name.into(),
            reference_fields: Vec::new(),
            scalar_fields: Vec::new(),
        }
    }

    pub fn with_reference(mut self, field: ReferenceField) -> Self {
        self.reference_fields.push(field);
        self
    }

    pub fn with_scalar(mut self, name: impl Into<String>) -> Self {
        self.scalar_fields.push(name.into());
        self
    }

    /// Check whether a field name is a declared reference field
    pub fn is_reference_field(&self, name: &str) -> bool {
        self.reference_fields.iter().any(|f| f.name == name)
    }

    /// Look up a declared reference field by name
    pub fn reference_field(&self, name: &str) -> Option<&ReferenceField> {
        self.reference_fields.iter().find(|f| f.name == name)
    }
}

/// Mapping from type-name string to entity descriptor
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, EntityDescriptor>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry {
            types: BTreeMap::new(),
        }
    }

    /// Register an entity type
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the name is already registered or is
    /// the reserved draft-reference type name.
    pub fn register(&mut self, descriptor: EntityDescriptor) -> Result<()> {
        if descriptor.type_name == DRAFT_TYPE {
            return Err(DraftError::InvalidArgument {
                reason: format!("'{}' is a reserved type name", DRAFT_TYPE),
            });
        }
        if self.types.contains_key(&descriptor.type_name) {
            return Err(DraftError::InvalidArgument {
                reason: format!("entity type '{}' is already registered", descriptor.type_name),
            });
        }
        self.types.insert(descriptor.type_name.clone(), descriptor);
        Ok(())
    }

    /// Look up a descriptor by type name
    pub fn descriptor(&self, type_name: &str) -> Option<&EntityDescriptor> {
        self.types.get(type_name)
    }

    /// Look up a descriptor, failing with `InvalidArgument` if unknown
    pub fn require(&self, type_name: &str) -> Result<&EntityDescriptor> {
        self.descriptor(type_name)
            .ok_or_else(|| DraftError::InvalidArgument {
                reason: format!("unregistered entity type '{}'", type_name),
            })
    }
}
