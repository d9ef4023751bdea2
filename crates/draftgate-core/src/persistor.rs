//! Draft lifecycle orchestration: validate and write a draft capturing a
//! model's changes, and apply a stored draft onto the host model.

use chrono::Utc;

use crate::errors::{DraftError, Result};
use crate::host::{DraftableEntity, EntityBackend};
use crate::model::{Draft, DraftAction, DraftId, DraftOptions};
use crate::registry::TypeRegistry;
use crate::serializer::{ResolveContext, SerializerRegistry};
use crate::store::{ensure_in_draft_transaction, DraftStore, TransactionControl};

/// What materializing a draft did to the host model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeOutcome {
    Created { entity_type: String, id: String },
    Updated { entity_type: String, id: String },
    Deleted { entity_type: String, id: String },
}

impl MaterializeOutcome {
    /// Identifier of the entity the draft produced or acted on
    pub fn entity_id(&self) -> &str {
        match self {
            MaterializeOutcome::Created { id, .. }
            | MaterializeOutcome::Updated { id, .. }
            | MaterializeOutcome::Deleted { id, .. } => id,
        }
    }

    pub fn entity_type(&self) -> &str {
        match self {
            MaterializeOutcome::Created { entity_type, .. }
            | MaterializeOutcome::Updated { entity_type, .. }
            | MaterializeOutcome::Deleted { entity_type, .. } => entity_type,
        }
    }
}

/// Capture and materialization entry points
///
/// Stateless between calls: borrows the type registry and serializer
/// registry chosen at system initialization, and receives the storage,
/// transaction and host collaborators per call.
pub struct Persistor<'a> {
    registry: &'a TypeRegistry,
    serializers: &'a SerializerRegistry,
}

impl<'a> Persistor<'a> {
    pub fn new(registry: &'a TypeRegistry, serializers: &'a SerializerRegistry) -> Self {
        Persistor {
            registry,
            serializers,
        }
    }

    /// Validate and write a draft capturing the entity's pending changes.
    ///
    /// Runs inside a draft transaction (joining the open one if any). The
    /// duplicate-draft check queries the store inside that transaction, so
    /// two concurrent captures for the same entity cannot both succeed
    /// under the collaborator's isolation guarantee.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` - the entity's type is not registered
    /// * `ExistingDraft` - the entity already has an open draft
    /// * `AlreadyPersistedModel` - CREATE requested for a persisted entity
    /// * `UnpersistedModel` - UPDATE/DELETE requested for an unpersisted entity
    /// * `AssociationUnsaved` - a referenced entity has no persisted draft
    pub fn write_draft_from_model<V>(
        &self,
        vault: &mut V,
        action: DraftAction,
        entity: &dyn DraftableEntity,
    ) -> Result<Draft>
    where
        V: DraftStore + TransactionControl,
    {
        ensure_in_draft_transaction(vault, |vault, tx| {
            self.registry.require(entity.entity_type())?;

            // Consult the store, not the in-memory entity, so a stale
            // instance cannot slip past the one-open-draft rule
            if entity.is_persisted() {
                let entity_id = entity.id().ok_or_else(|| DraftError::InvalidArgument {
                    reason: "persisted entity has no identifier".to_string(),
                })?;
                if let Some(existing) = vault.open_draft_for(entity.entity_type(), entity_id)? {
                    return Err(DraftError::ExistingDraft {
                        entity_type: entity.entity_type().to_string(),
                        entity_id: entity_id.to_string(),
                        draft_id: existing.id,
                    });
                }
            }

            let target_id = match action {
                DraftAction::Create => {
                    if entity.is_persisted() {
                        return Err(DraftError::AlreadyPersistedModel {
                            entity_type: entity.entity_type().to_string(),
                            entity_id: entity.id().unwrap_or_default().to_string(),
                        });
                    }
                    None
                }
                DraftAction::Update | DraftAction::Delete => {
                    if !entity.is_persisted() {
                        return Err(DraftError::UnpersistedModel {
                            entity_type: entity.entity_type().to_string(),
                            action,
                        });
                    }
                    let id = entity.id().ok_or_else(|| DraftError::InvalidArgument {
                        reason: "persisted entity has no identifier".to_string(),
                    })?;
                    Some(id.to_string())
                }
            };

            let serializer = self.serializers.default_serializer();
            let change_set = serializer.capture(self.registry, entity)?;

            let draft = Draft::new(
                tx.clone(),
                entity.entity_type().to_string(),
                target_id,
                action,
                change_set,
                DraftOptions::for_serializer(serializer.name()),
            );
            vault.insert(draft.clone())?;

            tracing::info!(
                draft_id = %draft.id,
                transaction = %tx,
                target_type = %draft.target_type,
                action = %action,
                "draft written"
            );
            Ok(draft)
        })
    }

    /// Apply a stored draft's change-set against the host model.
    ///
    /// Consumes the draft: on success it is marked applied and a second
    /// materialization attempt fails with `AlreadyApplied`.
    ///
    /// # Errors
    ///
    /// * `NoDraftable` - draft, target type or target entity missing
    /// * `AlreadyApplied` - the draft was already materialized
    /// * `InvalidArgument` - the recorded serializer identity is unknown
    /// * `PriorDraftNotApplied` - a referenced draft must be applied first
    pub fn write_model_from_draft<V, B>(
        &self,
        vault: &mut V,
        backend: &mut B,
        draft_id: &DraftId,
    ) -> Result<MaterializeOutcome>
    where
        V: DraftStore,
        B: EntityBackend,
    {
        let draft = vault
            .get(draft_id)?
            .ok_or_else(|| DraftError::NoDraftable {
                draft_id: draft_id.clone(),
                reason: "draft not found".to_string(),
            })?;

        if draft.is_applied() {
            return Err(DraftError::AlreadyApplied {
                draft_id: draft_id.clone(),
            });
        }

        // The stored serializer identity, not the current default, decodes
        // the change-set
        let serializer_name =
            draft
                .options
                .serializer()
                .ok_or_else(|| DraftError::InvalidArgument {
                    reason: format!("draft {} records no serializer identity", draft.id),
                })?;
        let serializer = self.serializers.get(serializer_name)?;

        let values = {
            let cx = ResolveContext {
                registry: self.registry,
                drafts: &*vault,
                backend: &*backend,
            };
            serializer.resolve(&cx, &draft)?
        };

        let outcome = match draft.action {
            DraftAction::Create => {
                if self.registry.descriptor(&draft.target_type).is_none() {
                    return Err(DraftError::NoDraftable {
                        draft_id: draft_id.clone(),
                        reason: format!("unknown entity type '{}'", draft.target_type),
                    });
                }
                let id = backend.create(&draft.target_type, &values)?;
                MaterializeOutcome::Created {
                    entity_type: draft.target_type.clone(),
                    id,
                }
            }
            DraftAction::Update => {
                let id = self.require_target(backend, &draft)?;
                backend.update(&draft.target_type, &id, &values)?;
                MaterializeOutcome::Updated {
                    entity_type: draft.target_type.clone(),
                    id,
                }
            }
            DraftAction::Delete => {
                let id = self.require_target(backend, &draft)?;
                backend.delete(&draft.target_type, &id)?;
                MaterializeOutcome::Deleted {
                    entity_type: draft.target_type.clone(),
                    id,
                }
            }
        };

        vault.mark_applied(draft_id, outcome.entity_id(), Utc::now())?;

        tracing::info!(
            draft_id = %draft_id,
            entity_type = outcome.entity_type(),
            entity_id = outcome.entity_id(),
            action = %draft.action,
            "draft materialized"
        );
        Ok(outcome)
    }

    /// Target entity id for UPDATE/DELETE, verified to still exist.
    fn require_target<B: EntityBackend>(&self, backend: &B, draft: &Draft) -> Result<String> {
        let id = draft
            .target_id
            .clone()
            .ok_or_else(|| DraftError::NoDraftable {
                draft_id: draft.id.clone(),
                reason: format!("{} draft has no target id", draft.action),
            })?;
        if !backend.exists(&draft.target_type, &id)? {
            return Err(DraftError::NoDraftable {
                draft_id: draft.id.clone(),
                reason: format!("{} {} not found", draft.target_type, id),
            });
        }
        Ok(id)
    }
}
