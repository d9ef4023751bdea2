pub mod change_set;
pub mod draft;

pub use change_set::{ChangeSet, ChangeValue, FieldChange, Reference, DRAFT_TYPE};
pub use draft::{Draft, DraftAction, DraftId, DraftOptions, DraftStatus, TransactionRef};
