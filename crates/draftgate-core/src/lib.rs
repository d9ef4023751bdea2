//! Draftgate Core - draft/approve change-capture engine
//!
//! This crate provides the foundational data structures and operations for
//! Draftgate, including:
//! - Draft records with typed change-sets and a stable persisted format
//! - A type registry describing the host's draftable entity types
//! - Capability contracts to the host model (`DraftableEntity`, `EntityBackend`)
//! - The JSON serializer capturing and resolving change-sets, with
//!   cross-draft reference resolution inside a transaction
//! - The persistor orchestrating draft capture and materialization
//!
//! Storage is supplied by the host through the `DraftStore` and
//! `TransactionControl` contracts; `draftgate-store` ships an in-memory
//! implementation.

pub mod errors;
pub mod host;
pub mod logging;
pub mod model;
pub mod persistor;
pub mod registry;
pub mod serializer;
pub mod store;

// Re-export commonly used types
pub use errors::{DraftError, Result};
pub use host::{
    DraftableEntity, EntityBackend, EntityRef, FieldValues, ReferenceState, ResolvedValue,
};
pub use model::{
    ChangeSet, ChangeValue, Draft, DraftAction, DraftId, DraftOptions, DraftStatus, FieldChange,
    Reference, TransactionRef, DRAFT_TYPE,
};
pub use persistor::{MaterializeOutcome, Persistor};
pub use registry::{EntityDescriptor, ReferenceField, TypeRegistry};
pub use serializer::{DraftSerializer, JsonSerializer, ResolveContext, SerializerRegistry};
pub use store::{ensure_in_draft_transaction, DraftStore, TransactionControl};
