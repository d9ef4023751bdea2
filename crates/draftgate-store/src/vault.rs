//! In-memory draft vault with staged transactional writes.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use draftgate_core::errors::{DraftError, Result};
use draftgate_core::model::{Draft, DraftId, DraftStatus, TransactionRef};
use draftgate_core::store::{DraftStore, TransactionControl};

/// In-memory keyed store of drafts plus single-transaction control
///
/// One transaction may be open at a time. Inserts stage drafts under the
/// open transaction; commit moves them into the committed map atomically,
/// rollback discards them. The open-draft index maps `(type, id)` of a
/// targeted real entity to its at-most-one pending draft.
#[derive(Debug, Clone, Default)]
pub struct MemoryDraftVault {
    committed: HashMap<DraftId, Draft>,
    staged: Vec<Draft>,
    open_index: HashMap<(String, String), DraftId>,
    current: Option<TransactionRef>,
}

impl MemoryDraftVault {
    pub fn new() -> Self {
        MemoryDraftVault::default()
    }

    /// Number of committed drafts
    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    fn find(&self, id: &DraftId) -> Option<&Draft> {
        self.staged
            .iter()
            .find(|d| &d.id == id)
            .or_else(|| self.committed.get(id))
    }
}

impl DraftStore for MemoryDraftVault {
    fn insert(&mut self, draft: Draft) -> Result<()> {
        match &self.current {
            Some(tx) if tx == &draft.transaction_ref => {}
            Some(tx) => {
                return Err(DraftError::Storage {
                    message: format!(
                        "draft names transaction {} but {} is open",
                        draft.transaction_ref, tx
                    ),
                });
            }
            None => {
                return Err(DraftError::Storage {
                    message: "no open transaction to insert into".to_string(),
                });
            }
        }
        if self.find(&draft.id).is_some() {
            return Err(DraftError::Storage {
                message: format!("draft {} already exists", draft.id),
            });
        }
        if let Some(target_id) = &draft.target_id {
            self.open_index
                .insert((draft.target_type.clone(), target_id.clone()), draft.id.clone());
        }
        tracing::debug!(draft_id = %draft.id, transaction = %draft.transaction_ref, "draft staged");
        self.staged.push(draft);
        Ok(())
    }

    fn get(&self, id: &DraftId) -> Result<Option<Draft>> {
        Ok(self.find(id).cloned())
    }

    fn drafts_in_transaction(&self, tx: &TransactionRef) -> Result<Vec<Draft>> {
        let mut drafts: Vec<Draft> = self
            .staged
            .iter()
            .chain(self.committed.values())
            .filter(|d| &d.transaction_ref == tx)
            .cloned()
            .collect();
        // Draft ids are time-ordered, so sorting by id is creation order
        drafts.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(drafts)
    }

    fn find_in_transaction(&self, tx: &TransactionRef, id: &DraftId) -> Result<Option<Draft>> {
        Ok(self
            .find(id)
            .filter(|d| &d.transaction_ref == tx)
            .cloned())
    }

    fn open_draft_for(&self, entity_type: &str, entity_id: &str) -> Result<Option<Draft>> {
        let key = (entity_type.to_string(), entity_id.to_string());
        match self.open_index.get(&key) {
            Some(id) => self.get(id),
            None => Ok(None),
        }
    }

    fn mark_applied(
        &mut self,
        id: &DraftId,
        materialized_id: &str,
        applied_at: DateTime<Utc>,
    ) -> Result<()> {
        let draft = self
            .staged
            .iter_mut()
            .find(|d| &d.id == id)
            .or_else(|| self.committed.get_mut(id))
            .ok_or_else(|| DraftError::Storage {
                message: format!("draft {} not found", id),
            })?;
        draft.status = DraftStatus::Applied;
        draft.materialized_id = Some(materialized_id.to_string());
        draft.applied_at = Some(applied_at);
        // The draft no longer blocks new drafts against its target
        if let Some(target_id) = &draft.target_id {
            self.open_index
                .remove(&(draft.target_type.clone(), target_id.clone()));
        }
        Ok(())
    }
}

impl TransactionControl for MemoryDraftVault {
    fn current(&self) -> Option<TransactionRef> {
        self.current.clone()
    }

    fn begin(&mut self) -> Result<TransactionRef> {
        if let Some(tx) = &self.current {
            return Err(DraftError::Storage {
                message: format!("transaction {} is already open", tx),
            });
        }
        let tx = TransactionRef::generate();
        tracing::debug!(transaction = %tx, "transaction opened");
        self.current = Some(tx.clone());
        Ok(tx)
    }

    fn commit(&mut self, tx: &TransactionRef) -> Result<()> {
        if self.current.as_ref() != Some(tx) {
            return Err(DraftError::Storage {
                message: format!("transaction {} is not open", tx),
            });
        }
        let staged = std::mem::take(&mut self.staged);
        tracing::debug!(transaction = %tx, drafts = staged.len(), "transaction committed");
        for draft in staged {
            self.committed.insert(draft.id.clone(), draft);
        }
        self.current = None;
        Ok(())
    }

    fn rollback(&mut self, tx: &TransactionRef) -> Result<()> {
        if self.current.as_ref() != Some(tx) {
            return Err(DraftError::Storage {
                message: format!("transaction {} is not open", tx),
            });
        }
        let staged = std::mem::take(&mut self.staged);
        tracing::debug!(transaction = %tx, discarded = staged.len(), "transaction rolled back");
        for draft in &staged {
            if let Some(target_id) = &draft.target_id {
                self.open_index
                    .remove(&(draft.target_type.clone(), target_id.clone()));
            }
        }
        self.current = None;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use draftgate_core::model::{ChangeSet, DraftAction, DraftOptions};

    fn draft(tx: &TransactionRef, target_type: &str, target_id: Option<&str>) -> Draft {
        Draft::new(
            tx.clone(),
            target_type.to_string(),
            target_id.map(str::to_string),
            if target_id.is_some() {
                DraftAction::Update
            } else {
                DraftAction::Create
            },
            ChangeSet::new(),
            DraftOptions::for_serializer("json_v1"),
        )
    }

    #[test]
    fn test_insert_requires_matching_open_transaction() {
        let mut vault = MemoryDraftVault::new();
        let orphan = draft(&TransactionRef::from("tx-nowhere"), "Role", None);
        assert!(matches!(
            vault.insert(orphan.clone()),
            Err(DraftError::Storage { .. })
        ));

        let tx = vault.begin().unwrap();
        assert!(matches!(
            vault.insert(orphan),
            Err(DraftError::Storage { .. })
        ));
        vault.insert(draft(&tx, "Role", None)).unwrap();
    }

    #[test]
    fn test_staged_drafts_are_readable_before_commit() {
        let mut vault = MemoryDraftVault::new();
        let tx = vault.begin().unwrap();
        let d = draft(&tx, "Role", None);
        vault.insert(d.clone()).unwrap();

        assert_eq!(vault.get(&d.id).unwrap(), Some(d.clone()));
        assert_eq!(vault.find_in_transaction(&tx, &d.id).unwrap(), Some(d));
        assert!(vault.is_empty());
    }

    #[test]
    fn test_commit_moves_staged_to_committed() {
        let mut vault = MemoryDraftVault::new();
        let tx = vault.begin().unwrap();
        let d = draft(&tx, "Role", None);
        vault.insert(d.clone()).unwrap();
        vault.commit(&tx).unwrap();

        assert_eq!(vault.len(), 1);
        assert_eq!(vault.get(&d.id).unwrap(), Some(d));
        assert!(vault.current().is_none());
    }

    #[test]
    fn test_rollback_discards_staged_and_index() {
        let mut vault = MemoryDraftVault::new();
        let tx = vault.begin().unwrap();
        let d = draft(&tx, "Role", Some("role-1"));
        vault.insert(d.clone()).unwrap();
        vault.rollback(&tx).unwrap();

        assert_eq!(vault.get(&d.id).unwrap(), None);
        assert_eq!(vault.open_draft_for("Role", "role-1").unwrap(), None);
    }

    #[test]
    fn test_nested_begin_rejected() {
        let mut vault = MemoryDraftVault::new();
        vault.begin().unwrap();
        assert!(matches!(vault.begin(), Err(DraftError::Storage { .. })));
    }

    #[test]
    fn test_open_draft_index_tracks_pending_per_entity() {
        let mut vault = MemoryDraftVault::new();
        let tx = vault.begin().unwrap();
        let d = draft(&tx, "Role", Some("role-1"));
        vault.insert(d.clone()).unwrap();
        vault.commit(&tx).unwrap();

        let found = vault.open_draft_for("Role", "role-1").unwrap().unwrap();
        assert_eq!(found.id, d.id);
        assert_eq!(vault.open_draft_for("Role", "role-2").unwrap(), None);

        vault.mark_applied(&d.id, "role-1", Utc::now()).unwrap();
        assert_eq!(vault.open_draft_for("Role", "role-1").unwrap(), None);
    }

    #[test]
    fn test_mark_applied_updates_status_and_timestamps() {
        let mut vault = MemoryDraftVault::new();
        let tx = vault.begin().unwrap();
        let d = draft(&tx, "Role", None);
        vault.insert(d.clone()).unwrap();
        vault.commit(&tx).unwrap();

        let applied_at = Utc::now();
        vault.mark_applied(&d.id, "role-9", applied_at).unwrap();
        let stored = vault.get(&d.id).unwrap().unwrap();
        assert_eq!(stored.status, DraftStatus::Applied);
        assert_eq!(stored.materialized_id.as_deref(), Some("role-9"));
        assert_eq!(stored.applied_at, Some(applied_at));
    }

    #[test]
    fn test_drafts_in_transaction_sorted_by_creation() {
        let mut vault = MemoryDraftVault::new();
        let tx = vault.begin().unwrap();
        let first = draft(&tx, "Role", None);
        // Distinct id timestamps; ids made in the same millisecond tie
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = draft(&tx, "Person", None);
        // Insert out of order to exercise the sort
        vault.insert(second.clone()).unwrap();
        vault.insert(first.clone()).unwrap();
        vault.commit(&tx).unwrap();

        let drafts = vault.drafts_in_transaction(&tx).unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].id, first.id);
        assert_eq!(drafts[1].id, second.id);
    }

    #[test]
    fn test_clone_is_an_independent_snapshot() {
        let mut vault = MemoryDraftVault::new();
        let tx = vault.begin().unwrap();
        let d = draft(&tx, "Role", None);
        vault.insert(d.clone()).unwrap();
        vault.commit(&tx).unwrap();

        let snapshot = vault.clone();
        vault.mark_applied(&d.id, "role-1", Utc::now()).unwrap();

        assert_eq!(snapshot.get(&d.id).unwrap().unwrap().status, DraftStatus::Pending);
        assert_eq!(vault.get(&d.id).unwrap().unwrap().status, DraftStatus::Applied);
    }
}
