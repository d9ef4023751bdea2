use thiserror::Error;

use crate::model::{DraftAction, DraftId};

/// Result type alias using DraftError
pub type Result<T> = std::result::Result<T, DraftError>;

/// Error taxonomy for draft capture and materialization
///
/// Every variant is a local validation or state failure, never a transient
/// fault: nothing in this crate retries or degrades. A failure aborts the
/// enclosing draft transaction and surfaces to the caller as-is.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DraftError {
    /// Absent or malformed input (unknown action string, unregistered
    /// entity type at capture, unknown serializer identity)
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// Entity already has an open (pending) draft
    #[error("{entity_type} {entity_id} already has open draft {draft_id}")]
    ExistingDraft {
        entity_type: String,
        entity_id: String,
        draft_id: DraftId,
    },

    /// CREATE draft requested for an entity that is already persisted
    #[error("{entity_type} {entity_id} is already persisted")]
    AlreadyPersistedModel {
        entity_type: String,
        entity_id: String,
    },

    /// UPDATE/DELETE draft requested for an entity that is not persisted
    #[error("cannot draft {action} on {entity_type}: entity is not persisted")]
    UnpersistedModel {
        entity_type: String,
        action: DraftAction,
    },

    /// A reference points to an entity that is neither persisted nor has a
    /// saved draft of its own
    #[error("reference '{field}' on {entity_type} points to an unsaved entity with no draft")]
    AssociationUnsaved { entity_type: String, field: String },

    /// Materialization target type or entity is missing
    #[error("no draftable target for draft {draft_id}: {reason}")]
    NoDraftable { draft_id: DraftId, reason: String },

    /// A referenced draft in the same transaction has not been materialized
    /// yet (ordering dependency violation)
    #[error("draft {referenced_draft_id} referenced by draft {draft_id} has not been applied")]
    PriorDraftNotApplied {
        draft_id: DraftId,
        referenced_draft_id: DraftId,
    },

    /// The draft was already materialized; a draft is consumed exactly once
    #[error("draft {draft_id} has already been applied")]
    AlreadyApplied { draft_id: DraftId },

    /// Failure surfaced by a storage or transaction collaborator
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl DraftError {
    /// Stable error code for programmatic handling and external surfaces.
    ///
    /// Codes are contracts: they never change once shipped, even if the
    /// display messages are reworded.
    pub fn code(&self) -> &'static str {
        match self {
            DraftError::InvalidArgument { .. } => "ERR_INVALID_ARGUMENT",
            DraftError::ExistingDraft { .. } => "ERR_EXISTING_DRAFT",
            DraftError::AlreadyPersistedModel { .. } => "ERR_ALREADY_PERSISTED_MODEL",
            DraftError::UnpersistedModel { .. } => "ERR_UNPERSISTED_MODEL",
            DraftError::AssociationUnsaved { .. } => "ERR_ASSOCIATION_UNSAVED",
            DraftError::NoDraftable { .. } => "ERR_NO_DRAFTABLE",
            DraftError::PriorDraftNotApplied { .. } => "ERR_PRIOR_DRAFT_NOT_APPLIED",
            DraftError::AlreadyApplied { .. } => "ERR_ALREADY_APPLIED",
            DraftError::Storage { .. } => "ERR_STORAGE",
        }
    }
}

impl From<serde_json::Error> for DraftError {
    fn from(err: serde_json::Error) -> Self {
        DraftError::Storage {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        let cases = [
            (
                DraftError::InvalidArgument {
                    reason: "x".to_string(),
                },
                "ERR_INVALID_ARGUMENT",
            ),
            (
                DraftError::AlreadyApplied {
                    draft_id: DraftId::from("d1"),
                },
                "ERR_ALREADY_APPLIED",
            ),
            (
                DraftError::Storage {
                    message: "io".to_string(),
                },
                "ERR_STORAGE",
            ),
        ];
        for (err, expected_code) in cases {
            assert_eq!(err.code(), expected_code, "Wrong code for {:?}", err);
        }
    }

    #[test]
    fn test_display_includes_context() {
        let err = DraftError::ExistingDraft {
            entity_type: "Role".to_string(),
            entity_id: "role-1".to_string(),
            draft_id: DraftId::from("d1"),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("Role"));
        assert!(rendered.contains("role-1"));
        assert!(rendered.contains("d1"));
    }
}
