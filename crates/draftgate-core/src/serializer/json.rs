//! The default JSON change-set serializer.
//!
//! Capture walks an entity's declared reference and scalar fields and
//! emits `(old, new)` pairs; resolve walks a stored change-set and turns
//! every `new` side back into a concrete value, following draft
//! references through the draft's own transaction.

use crate::errors::{DraftError, Result};
use crate::host::{DraftableEntity, EntityRef, FieldValues, ReferenceState, ResolvedValue};
use crate::model::{ChangeSet, ChangeValue, Draft, FieldChange, Reference};
use crate::registry::{ReferenceField, TypeRegistry};
use crate::serializer::{DraftSerializer, ResolveContext};

/// Serializer identity `"json_v1"`. The identity is stored per draft and
/// is a permanent contract.
pub struct JsonSerializer;

impl JsonSerializer {
    pub const NAME: &'static str = "json_v1";

    /// Old value of a reference: absent, or the previous persisted target.
    fn reference_old(
        field: &ReferenceField,
        entity: &dyn DraftableEntity,
    ) -> Result<ChangeValue> {
        match entity.reference_prior(&field.name)? {
            None => Ok(ChangeValue::Absent),
            Some(prior) => Ok(ChangeValue::Reference(Reference::Entity {
                // Non-polymorphic references always record the declared type
                entity_type: field.target_type.clone().unwrap_or(prior.entity_type),
                id: prior.id,
            })),
        }
    }

    /// New value of a reference: absent, a persisted entity, or the
    /// pending draft standing in for an unpersisted target.
    fn reference_new(
        field: &ReferenceField,
        entity: &dyn DraftableEntity,
    ) -> Result<ChangeValue> {
        match entity.reference_current(&field.name)? {
            ReferenceState::Empty => Ok(ChangeValue::Absent),
            ReferenceState::Persisted { entity_type, id } => {
                Ok(ChangeValue::Reference(Reference::Entity {
                    entity_type: field.target_type.clone().unwrap_or(entity_type),
                    id,
                }))
            }
            ReferenceState::Unpersisted {
                draft_id: Some(draft_id),
            } => Ok(ChangeValue::Reference(Reference::Draft { draft_id })),
            ReferenceState::Unpersisted { draft_id: None } => {
                // An entity cannot be referenced before a proposal for it exists
                Err(DraftError::AssociationUnsaved {
                    entity_type: entity.entity_type().to_string(),
                    field: field.name.clone(),
                })
            }
        }
    }

    /// Resolve the `new` side of one reference entry.
    fn resolve_reference(
        cx: &ResolveContext<'_>,
        draft: &Draft,
        field: &str,
        value: &ChangeValue,
    ) -> Result<ResolvedValue> {
        match value {
            ChangeValue::Absent => Ok(ResolvedValue::Null),
            ChangeValue::Reference(Reference::Draft { draft_id }) => {
                let referenced = cx
                    .drafts
                    .find_in_transaction(&draft.transaction_ref, draft_id)?
                    .ok_or_else(|| DraftError::NoDraftable {
                        draft_id: draft.id.clone(),
                        reason: format!(
                            "referenced draft {} not found in transaction {}",
                            draft_id, draft.transaction_ref
                        ),
                    })?;
                match &referenced.materialized_id {
                    // Ordering dependency: the referenced draft goes first
                    None => Err(DraftError::PriorDraftNotApplied {
                        draft_id: draft.id.clone(),
                        referenced_draft_id: draft_id.clone(),
                    }),
                    Some(materialized_id) => Ok(ResolvedValue::Entity(EntityRef::new(
                        referenced.target_type.clone(),
                        materialized_id.clone(),
                    ))),
                }
            }
            ChangeValue::Reference(Reference::Entity { entity_type, id }) => {
                if !cx.backend.exists(entity_type, id)? {
                    return Err(DraftError::NoDraftable {
                        draft_id: draft.id.clone(),
                        reason: format!(
                            "referenced {} {} no longer exists",
                            entity_type, id
                        ),
                    });
                }
                Ok(ResolvedValue::Entity(EntityRef::new(
                    entity_type.clone(),
                    id.clone(),
                )))
            }
            ChangeValue::Scalar(_) => Err(DraftError::InvalidArgument {
                reason: format!("reference field '{}' holds a non-reference value", field),
            }),
        }
    }
}

impl DraftSerializer for JsonSerializer {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn capture(
        &self,
        registry: &TypeRegistry,
        entity: &dyn DraftableEntity,
    ) -> Result<ChangeSet> {
        let descriptor = registry.require(entity.entity_type())?;
        let mut changes = ChangeSet::new();

        for field in &descriptor.reference_fields {
            let change = FieldChange::new(
                Self::reference_old(field, entity)?,
                Self::reference_new(field, entity)?,
            );
            // Unchanged references are omitted entirely
            if !change.is_noop() {
                changes.insert(field.name.clone(), change);
            }
        }

        for field in &descriptor.scalar_fields {
            if let Some((old, new)) = entity.scalar_change(field)? {
                changes.insert(
                    field.clone(),
                    FieldChange::new(ChangeValue::from_json(old), ChangeValue::from_json(new)),
                );
            }
        }

        tracing::debug!(
            entity_type = entity.entity_type(),
            fields = changes.len(),
            "captured change-set"
        );
        Ok(changes)
    }

    fn resolve(&self, cx: &ResolveContext<'_>, draft: &Draft) -> Result<FieldValues> {
        let descriptor =
            cx.registry
                .descriptor(&draft.target_type)
                .ok_or_else(|| DraftError::NoDraftable {
                    draft_id: draft.id.clone(),
                    reason: format!("unknown entity type '{}'", draft.target_type),
                })?;

        let mut values = FieldValues::new();
        for (field, change) in draft.change_set.iter() {
            let value = if descriptor.is_reference_field(field) {
                Self::resolve_reference(cx, draft, field, &change.new)?
            } else {
                match &change.new {
                    ChangeValue::Absent => ResolvedValue::Null,
                    ChangeValue::Scalar(v) => ResolvedValue::Scalar(v.clone()),
                    // A scalar that happened to parse as a reference shape
                    // passes through verbatim
                    ChangeValue::Reference(r) => ResolvedValue::Scalar(r.to_json()),
                }
            };
            values.insert(field.clone(), value);
        }
        Ok(values)
    }
}
