use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::policy::ApprovalLevel;
use super::rollup::rollup_status;

/// Identifier wrapper for managed entities (students, host families, coordinators).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

/// Identifier wrapper for change requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeRequestId(pub String);

/// Identifier wrapper for individual change items.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChangeItemId(pub String);

/// Identifier wrapper for item comments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentId(pub String);

/// Identifier wrapper for whoever proposes, reviews, or comments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

macro_rules! display_id {
    ($($ty:ty),+) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })+
    };
}

display_id!(EntityId, ChangeRequestId, ChangeItemId, CommentId, ActorId);

/// Dotted path naming one field of a managed entity, e.g. `address.street`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldPath(pub String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kinds of records whose fields are managed through the change queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Student,
    HostFamily,
    Coordinator,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [
        EntityType::Student,
        EntityType::HostFamily,
        EntityType::Coordinator,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            EntityType::Student => "student",
            EntityType::HostFamily => "host_family",
            EntityType::Coordinator => "coordinator",
        }
    }
}

/// Typed field value. `Null` stands for an absent field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Boolean(bool),
    Integer(i64),
    Null,
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub const fn kind_label(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Date(_) => "date",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Integer(_) => "integer",
            FieldValue::Null => "null",
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Date(value) => write!(f, "{value}"),
            FieldValue::Boolean(value) => write!(f, "{value}"),
            FieldValue::Integer(value) => write!(f, "{value}"),
            FieldValue::Null => f.write_str("(empty)"),
        }
    }
}

/// Current field values of a managed entity as read from the entity store.
pub type EntityFields = BTreeMap<FieldPath, FieldValue>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    /// Request-level kind: the shared kind when every item agrees, otherwise `Update`.
    pub fn aggregate<I>(kinds: I) -> Self
    where
        I: IntoIterator<Item = ChangeKind>,
    {
        let mut kinds = kinds.into_iter();
        let Some(first) = kinds.next() else {
            return ChangeKind::Update;
        };
        if kinds.all(|kind| kind == first) {
            first
        } else {
            ChangeKind::Update
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

/// Per-item review status. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Approved,
    Rejected,
}

impl ItemStatus {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, ItemStatus::Pending)
    }

    pub const fn label(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Approved => "approved",
            ItemStatus::Rejected => "rejected",
        }
    }
}

/// Request-level status derived from the item statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    PartiallyApproved,
    FullyApproved,
    Rejected,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 4] = [
        RequestStatus::Pending,
        RequestStatus::PartiallyApproved,
        RequestStatus::FullyApproved,
        RequestStatus::Rejected,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::PartiallyApproved => "partially_approved",
            RequestStatus::FullyApproved => "fully_approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

/// Reviewer verdict for a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

/// Author attached to a comment; the display name is captured at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    pub id: ActorId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub author_id: ActorId,
    pub author_name: String,
    pub content: String,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

/// One proposed edit as supplied by the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedChange {
    pub field_path: FieldPath,
    pub new_value: FieldValue,
}

/// Inbound batch of proposed edits against one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSubmission {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    #[serde(default)]
    pub priority: Priority,
    pub requested_by: ActorId,
    pub items: Vec<ProposedChange>,
}

/// Atomic proposed mutation of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeItem {
    pub id: ChangeItemId,
    pub field_path: FieldPath,
    pub field_label: String,
    pub previous_value: FieldValue,
    pub new_value: FieldValue,
    pub change_kind: ChangeKind,
    pub is_sevis_related: bool,
    pub required_approval_level: ApprovalLevel,
    pub status: ItemStatus,
    pub requested_by: ActorId,
    pub requested_at: DateTime<Utc>,
    pub resolved_by: Option<ActorId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub export_ready: bool,
    pub exported_at: Option<DateTime<Utc>>,
    pub comments: Vec<Comment>,
}

impl ChangeItem {
    pub(crate) fn approve(&mut self, actor: &ActorId, at: DateTime<Utc>) {
        self.status = ItemStatus::Approved;
        self.resolved_by = Some(actor.clone());
        self.resolved_at = Some(at);
    }

    pub(crate) fn reject(&mut self, actor: &ActorId, reason: String, at: DateTime<Utc>) {
        self.status = ItemStatus::Rejected;
        self.resolved_by = Some(actor.clone());
        self.resolved_at = Some(at);
        self.rejection_reason = Some(reason);
    }

    /// Approved SEVIS item that no exporter has claimed yet.
    pub fn is_exportable(&self) -> bool {
        self.status == ItemStatus::Approved
            && self.is_sevis_related
            && self.export_ready
            && self.exported_at.is_none()
    }
}

/// Batch of change items raised together against one entity.
///
/// `status` is recomputed from the items on every mutation, so the stored
/// value always equals `rollup_status(items)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRequest {
    pub id: ChangeRequestId,
    pub entity_type: EntityType,
    pub entity_id: EntityId,
    pub change_kind: ChangeKind,
    pub priority: Priority,
    pub requested_by: ActorId,
    status: RequestStatus,
    items: Vec<ChangeItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChangeRequest {
    pub(crate) fn new(
        id: ChangeRequestId,
        submission_meta: RequestMeta,
        items: Vec<ChangeItem>,
        at: DateTime<Utc>,
    ) -> Self {
        let change_kind = ChangeKind::aggregate(items.iter().map(|item| item.change_kind));
        let status = rollup_status(items.iter().map(|item| item.status));
        Self {
            id,
            entity_type: submission_meta.entity_type,
            entity_id: submission_meta.entity_id,
            change_kind,
            priority: submission_meta.priority,
            requested_by: submission_meta.requested_by,
            status,
            items,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn items(&self) -> &[ChangeItem] {
        &self.items
    }

    pub fn item(&self, id: &ChangeItemId) -> Option<&ChangeItem> {
        self.items.iter().find(|item| &item.id == id)
    }

    pub(crate) fn item_mut(&mut self, id: &ChangeItemId) -> Option<&mut ChangeItem> {
        self.items.iter_mut().find(|item| &item.id == id)
    }

    /// True while no item has been decided; withdrawal is only allowed then.
    pub fn is_untouched(&self) -> bool {
        self.items
            .iter()
            .all(|item| item.status == ItemStatus::Pending)
    }

    /// Recompute the rollup from the current item statuses and bump `updated_at`.
    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        self.status = rollup_status(self.items.iter().map(|item| item.status));
        if at > self.updated_at {
            self.updated_at = at;
        }
    }
}

/// Request-level attributes carried over from the submission.
#[derive(Debug, Clone)]
pub(crate) struct RequestMeta {
    pub(crate) entity_type: EntityType,
    pub(crate) entity_id: EntityId,
    pub(crate) priority: Priority,
    pub(crate) requested_by: ActorId,
}
