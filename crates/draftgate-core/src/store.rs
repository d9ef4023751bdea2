//! Contracts to the draft storage and transaction collaborators.
//!
//! Draft records live in an externally-owned keyed store with atomic
//! transactional writes. The engine only creates drafts inside the
//! currently-open transaction and queries a transaction's member drafts;
//! isolation and write atomicity are the collaborator's responsibility.

use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::model::{Draft, DraftId, TransactionRef};

/// Keyed store of draft records
///
/// `open_draft_for` is the index replacing a back-link from entity to
/// draft: given a real entity's type and id, it returns the at-most-one
/// pending draft targeting it.
pub trait DraftStore {
    /// Append a new draft, as part of the transaction it names
    fn insert(&mut self, draft: Draft) -> Result<()>;

    /// Look up a draft by id
    fn get(&self, id: &DraftId) -> Result<Option<Draft>>;

    /// All drafts belonging to a transaction, in creation order
    fn drafts_in_transaction(&self, tx: &TransactionRef) -> Result<Vec<Draft>>;

    /// Look up a draft by id, restricted to the given transaction.
    /// Cross-transaction draft references are invalid, so resolution only
    /// ever looks through this method.
    fn find_in_transaction(&self, tx: &TransactionRef, id: &DraftId) -> Result<Option<Draft>>;

    /// The pending draft targeting a real entity, if one exists
    fn open_draft_for(&self, entity_type: &str, entity_id: &str) -> Result<Option<Draft>>;

    /// Record that a draft has been materialized into the named entity.
    /// The draft's status becomes applied; its change-set is untouched.
    fn mark_applied(
        &mut self,
        id: &DraftId,
        materialized_id: &str,
        applied_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Transaction boundary supplied by the external transaction collaborator
pub trait TransactionControl {
    /// The currently-open transaction, if any
    fn current(&self) -> Option<TransactionRef>;

    /// Open a new transaction
    fn begin(&mut self) -> Result<TransactionRef>;

    /// Atomically commit all writes made under the transaction
    fn commit(&mut self, tx: &TransactionRef) -> Result<()>;

    /// Discard all writes made under the transaction
    fn rollback(&mut self, tx: &TransactionRef) -> Result<()>;
}

/// Run `f` inside a draft transaction, starting one if none is open.
///
/// When this call opens the transaction it also closes it: commit on
/// success, rollback on error. When a transaction is already open the
/// closure simply runs inside it and the enclosing owner decides the
/// outcome; an error propagates out and aborts the whole unit.
pub fn ensure_in_draft_transaction<X, T, F>(txn: &mut X, f: F) -> Result<T>
where
    X: TransactionControl + ?Sized,
    F: FnOnce(&mut X, &TransactionRef) -> Result<T>,
{
    if let Some(tx) = txn.current() {
        return f(txn, &tx);
    }

    let tx = txn.begin()?;
    match f(txn, &tx) {
        Ok(value) => {
            txn.commit(&tx)?;
            Ok(value)
        }
        Err(err) => {
            // Nothing partially written: the collaborator discards the unit
            let _ = txn.rollback(&tx);
            Err(err)
        }
    }
}
