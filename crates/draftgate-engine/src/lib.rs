//! Draftgate Engine - high-level draft/approve facade
//!
//! [`DraftEngine`] wires the core persistor to the in-memory vault and a
//! host-supplied [`EntityBackend`]. It owns the transaction boundary:
//! proposals made inside [`DraftEngine::in_transaction`] land in one
//! transaction and are approved together with
//! [`DraftEngine::approve_transaction`], which applies every pending draft
//! in creation order or leaves the world untouched.

use draftgate_core::errors::Result;
use draftgate_core::host::{DraftableEntity, EntityBackend};
use draftgate_core::model::{Draft, DraftAction, DraftId, TransactionRef};
use draftgate_core::persistor::{MaterializeOutcome, Persistor};
use draftgate_core::registry::TypeRegistry;
use draftgate_core::serializer::SerializerRegistry;
use draftgate_core::store::{DraftStore, TransactionControl};
use draftgate_store::MemoryDraftVault;

/// Draft capture and approval over a host backend
///
/// The backend must be `Clone`: approval snapshots both the vault and the
/// backend before applying, and restores the snapshot if any draft in the
/// transaction fails. Approval is therefore all-or-nothing as long as the
/// backend's `Clone` is a faithful deep copy.
pub struct DraftEngine<B: EntityBackend + Clone> {
    registry: TypeRegistry,
    serializers: SerializerRegistry,
    vault: MemoryDraftVault,
    backend: B,
}

impl<B: EntityBackend + Clone> DraftEngine<B> {
    /// Build an engine with the default serializer registry
    pub fn new(registry: TypeRegistry, backend: B) -> Self {
        DraftEngine {
            registry,
            serializers: SerializerRegistry::default(),
            vault: MemoryDraftVault::new(),
            backend,
        }
    }

    /// Build an engine with an explicit serializer registry
    pub fn with_serializers(
        registry: TypeRegistry,
        serializers: SerializerRegistry,
        backend: B,
    ) -> Self {
        DraftEngine {
            registry,
            serializers,
            vault: MemoryDraftVault::new(),
            backend,
        }
    }

    /// The host backend, for inspecting materialized state
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the host backend, for changes made outside the
    /// draft workflow
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Run `f` inside one draft transaction.
    ///
    /// Commits when the closure succeeds and returns the transaction
    /// reference alongside its value; rolls back every staged draft when
    /// it fails.
    ///
    /// # Errors
    ///
    /// Propagates the closure's error, and `Storage` if a transaction is
    /// already open.
    pub fn in_transaction<T, F>(&mut self, f: F) -> Result<(TransactionRef, T)>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let tx = self.vault.begin()?;
        match f(self) {
            Ok(value) => {
                self.vault.commit(&tx)?;
                Ok((tx, value))
            }
            Err(err) => {
                let _ = self.vault.rollback(&tx);
                Err(err)
            }
        }
    }

    /// Propose a change: validate the entity against the action and write
    /// a draft capturing its pending modifications.
    ///
    /// Outside [`DraftEngine::in_transaction`] the draft gets a
    /// single-draft transaction of its own.
    ///
    /// # Errors
    ///
    /// See [`Persistor::write_draft_from_model`].
    pub fn propose(
        &mut self,
        action: DraftAction,
        entity: &dyn DraftableEntity,
    ) -> Result<Draft> {
        Persistor::new(&self.registry, &self.serializers).write_draft_from_model(
            &mut self.vault,
            action,
            entity,
        )
    }

    /// Apply a single draft onto the backend.
    ///
    /// # Errors
    ///
    /// See [`Persistor::write_model_from_draft`].
    pub fn materialize(&mut self, draft_id: &DraftId) -> Result<MaterializeOutcome> {
        Persistor::new(&self.registry, &self.serializers).write_model_from_draft(
            &mut self.vault,
            &mut self.backend,
            draft_id,
        )
    }

    /// Apply every pending draft of a transaction, in creation order.
    ///
    /// All-or-nothing: on any failure the vault and backend are restored
    /// to their pre-approval state and the error is returned. Already
    /// applied drafts in the transaction are skipped.
    ///
    /// # Errors
    ///
    /// The first materialization error encountered.
    pub fn approve_transaction(
        &mut self,
        tx: &TransactionRef,
    ) -> Result<Vec<MaterializeOutcome>> {
        let pending: Vec<DraftId> = self
            .vault
            .drafts_in_transaction(tx)?
            .into_iter()
            .filter(|d| !d.is_applied())
            .map(|d| d.id)
            .collect();

        let vault_snapshot = self.vault.clone();
        let backend_snapshot = self.backend.clone();

        let mut outcomes = Vec::with_capacity(pending.len());
        for draft_id in &pending {
            match self.materialize(draft_id) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    self.vault = vault_snapshot;
                    self.backend = backend_snapshot;
                    tracing::warn!(
                        transaction = %tx,
                        draft_id = %draft_id,
                        error = %err,
                        "approval failed, state restored"
                    );
                    return Err(err);
                }
            }
        }

        tracing::info!(transaction = %tx, applied = outcomes.len(), "transaction approved");
        Ok(outcomes)
    }

    /// Look up a draft by id
    ///
    /// # Errors
    ///
    /// `Storage` on a vault failure.
    pub fn draft(&self, id: &DraftId) -> Result<Option<Draft>> {
        self.vault.get(id)
    }

    /// All drafts of a transaction, in creation order
    ///
    /// # Errors
    ///
    /// `Storage` on a vault failure.
    pub fn drafts_in_transaction(&self, tx: &TransactionRef) -> Result<Vec<Draft>> {
        self.vault.drafts_in_transaction(tx)
    }
}
