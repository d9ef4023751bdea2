//! Draftgate Store - in-memory draft storage
//!
//! Provides [`MemoryDraftVault`], an implementation of the core crate's
//! `DraftStore` and `TransactionControl` contracts backed by process
//! memory. Writes are staged under an open transaction and become visible
//! to other readers only on commit; within the transaction reads see the
//! staged drafts (read-your-writes).
//!
//! The vault is `Clone`, so an embedding engine can snapshot it before a
//! risky multi-draft operation and restore the snapshot on failure.

pub mod vault;

pub use vault::MemoryDraftVault;
