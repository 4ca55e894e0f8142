//! Field-level change approval for exchange program records.
//!
//! Actors propose edits to students, host families, and coordinators as
//! change requests. Each item is reviewed on its own; approved items are
//! written to the entity store and SEVIS-reported fields are gated behind an
//! elevated permission before joining the export queue.

pub mod domain;
pub mod engine;
pub mod memory;
pub mod policy;
pub mod repository;
pub mod rollup;
pub mod router;
pub mod settings;
pub mod sevis;
pub mod store;
pub mod validation;

#[cfg(test)]
mod tests;

pub use domain::{
    ActorId, ChangeItem, ChangeItemId, ChangeKind, ChangeRequest, ChangeRequestId,
    ChangeSubmission, Comment, CommentAuthor, CommentId, Decision, EntityFields, EntityId,
    EntityType, FieldPath, FieldValue, ItemStatus, Priority, ProposedChange, RequestStatus,
};
pub use engine::{ApprovalEngine, ChangeQueueError, ChangeQueueSummary, WithdrawalBlock};
pub use memory::{InMemoryChangeRequestRepository, InMemoryEntityStore, StaticAuthorization};
pub use policy::{ApprovalLevel, FieldPolicy, FieldType, PolicyTable, StaticPolicyTable};
pub use repository::{
    ChangeRequestFilter, ChangeRequestRepository, Page, PageRequest, RepositoryError,
};
pub use rollup::rollup_status;
pub use router::change_queue_router;
pub use settings::ChangeQueueSettings;
pub use sevis::{ExportQueue, SevisGate};
pub use store::{
    AuthorizationError, AuthorizationProvider, EntityStore, EntityStoreError, Permission,
    WriteOutcome,
};
pub use validation::{ValidationError, ValidationIssue, ValidationRule};
