use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{DraftError, Result};
use crate::model::change_set::ChangeSet;

/// Identifier of a stored draft record (UUID v7)
///
/// UUID v7 ids are time-ordered, so sorting draft ids within a transaction
/// reproduces creation order. Batch materialization relies on this.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(String);

impl DraftId {
    /// Generate a fresh time-ordered draft id
    pub fn generate() -> Self {
        DraftId(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DraftId {
    fn from(s: &str) -> Self {
        DraftId(s.to_string())
    }
}

impl From<String> for DraftId {
    fn from(s: String) -> Self {
        DraftId(s)
    }
}

/// Handle identifying the transaction a draft belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionRef(String);

impl TransactionRef {
    /// Generate a fresh transaction handle
    pub fn generate() -> Self {
        TransactionRef(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionRef {
    fn from(s: &str) -> Self {
        TransactionRef(s.to_string())
    }
}

/// Proposed action a draft captures
///
/// The lowercase string forms are written to storage and are permanent:
/// renaming them would require migrating all historical draft data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftAction {
    Create,
    Update,
    Delete,
}

impl DraftAction {
    /// Parse an action from its stored string form
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for any string that is not one of
    /// `create`, `update`, `delete`.
    ///
    /// # Example
    ///
    /// ```
    /// use draftgate_core::model::DraftAction;
    ///
    /// assert_eq!(DraftAction::parse("update").unwrap(), DraftAction::Update);
    /// assert!(DraftAction::parse("bogus").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(DraftAction::Create),
            "update" => Ok(DraftAction::Update),
            "delete" => Ok(DraftAction::Delete),
            other => Err(DraftError::InvalidArgument {
                reason: format!("unknown action type '{}'", other),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DraftAction::Create => "create",
            DraftAction::Update => "update",
            DraftAction::Delete => "delete",
        }
    }
}

impl fmt::Display for DraftAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a draft
///
/// A draft is `Pending` from capture until materialization consumes it,
/// after which it is `Applied` forever. Re-materializing an applied draft
/// is a hard error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Pending,
    Applied,
}

/// Per-draft options map recording how the change-set was produced
///
/// The `serializer` key holds the identity tag of the serializer that wrote
/// the change-set, so historical drafts stay decodable after the default
/// serializer changes. Key names are written to storage and are permanent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct DraftOptions(BTreeMap<String, String>);

impl DraftOptions {
    /// Storage key for the serializer identity tag. Permanent contract.
    pub const SERIALIZER: &'static str = "serializer";

    /// Options recording the given serializer identity
    pub fn for_serializer(name: &str) -> Self {
        let mut map = BTreeMap::new();
        map.insert(Self::SERIALIZER.to_string(), name.to_string());
        DraftOptions(map)
    }

    /// The recorded serializer identity, if any
    pub fn serializer(&self) -> Option<&str> {
        self.0.get(Self::SERIALIZER).map(String::as_str)
    }

    /// Read an arbitrary option key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

/// A stored, not-yet-applied proposed create/update/delete on an entity
///
/// Invariants (enforced by the persistor at capture time):
/// - `action == Create` implies `target_id` is `None`
/// - `action` is `Update` or `Delete` implies `target_id` is `Some`
/// - at most one pending draft exists per real entity
///
/// The `change_set` is immutable once written; only `status`,
/// `materialized_id` and `applied_at` change afterwards, exactly once,
/// when the draft is materialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
    /// Unique identifier (UUID v7)
    pub id: DraftId,

    /// Transaction this draft belongs to
    pub transaction_ref: TransactionRef,

    /// Declared type name of the entity the draft acts upon
    pub target_type: String,

    /// Identifier of the real persisted entity; `None` for creations
    pub target_id: Option<String>,

    /// Proposed action
    pub action: DraftAction,

    /// Captured field and reference changes
    pub change_set: ChangeSet,

    /// Serializer identity and other capture-time options
    pub options: DraftOptions,

    /// Lifecycle state
    pub status: DraftStatus,

    /// Identifier of the entity this draft produced or acted on, set when
    /// the draft is applied. For creations this is the new entity's id.
    pub materialized_id: Option<String>,

    /// Timestamp when this draft was captured
    pub created_at: DateTime<Utc>,

    /// Timestamp when this draft was applied, if it has been
    pub applied_at: Option<DateTime<Utc>>,
}

impl Draft {
    /// Create a new pending draft with a generated id
    pub fn new(
        transaction_ref: TransactionRef,
        target_type: String,
        target_id: Option<String>,
        action: DraftAction,
        change_set: ChangeSet,
        options: DraftOptions,
    ) -> Self {
        Draft {
            id: DraftId::generate(),
            transaction_ref,
            target_type,
            target_id,
            action,
            change_set,
            options,
            status: DraftStatus::Pending,
            materialized_id: None,
            created_at: Utc::now(),
            applied_at: None,
        }
    }

    /// Check whether this draft has been materialized
    pub fn is_applied(&self) -> bool {
        self.status == DraftStatus::Applied
    }
}
