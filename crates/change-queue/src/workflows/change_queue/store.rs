use serde::{Deserialize, Serialize};

use super::domain::{
    ActorId, ChangeItemId, EntityFields, EntityId, EntityType, FieldPath, FieldValue,
};

/// Result of a single-field write keyed by the approving item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The same item id was applied before; nothing changed.
    AlreadyApplied,
}

/// Durable store of managed entities. Only the approval engine writes to it.
pub trait EntityStore: Send + Sync {
    fn read(
        &self,
        entity_type: EntityType,
        entity_id: &EntityId,
    ) -> Result<Option<EntityFields>, EntityStoreError>;

    /// Atomically set one field (`FieldValue::Null` clears it). Repeating a
    /// write with the same `item_id` must be a no-op.
    fn write_field(
        &self,
        entity_type: EntityType,
        entity_id: &EntityId,
        field_path: &FieldPath,
        value: &FieldValue,
        item_id: &ChangeItemId,
    ) -> Result<WriteOutcome, EntityStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum EntityStoreError {
    #[error("entity {entity_type:?}/{entity_id} not found")]
    MissingEntity {
        entity_type: EntityType,
        entity_id: EntityId,
    },
    #[error("entity store unavailable: {0}")]
    Unavailable(String),
}

/// Capabilities checked by the approval engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Approve or reject ordinary items.
    ReviewChanges,
    /// Approve items whose fields are reported to SEVIS.
    ApproveSevisChanges,
}

impl Permission {
    pub const fn label(self) -> &'static str {
        match self {
            Permission::ReviewChanges => "review_changes",
            Permission::ApproveSevisChanges => "approve_sevis_changes",
        }
    }
}

/// Authorization provider consulted before every decision.
pub trait AuthorizationProvider: Send + Sync {
    fn has_permission(&self, actor: &ActorId, permission: Permission) -> bool;
}

/// Raised when an actor lacks the permission a decision needs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("actor {actor} lacks the {} permission", .permission.label())]
pub struct AuthorizationError {
    pub actor: ActorId,
    pub permission: Permission,
}

/// Check a permission, turning a refusal into an error.
pub fn require(
    authorization: &dyn AuthorizationProvider,
    actor: &ActorId,
    permission: Permission,
) -> Result<(), AuthorizationError> {
    if authorization.has_permission(actor, permission) {
        Ok(())
    } else {
        Err(AuthorizationError {
            actor: actor.clone(),
            permission,
        })
    }
}
