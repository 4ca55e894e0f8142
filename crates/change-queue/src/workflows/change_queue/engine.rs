use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::domain::{
    ActorId, ChangeItem, ChangeItemId, ChangeRequest, ChangeRequestId, ChangeSubmission, Comment,
    CommentAuthor, CommentId, Decision, EntityId, EntityType, ItemStatus, RequestMeta,
    RequestStatus,
};
use super::policy::PolicyTable;
use super::repository::{
    ChangeRequestFilter, ChangeRequestRepository, Page, PageRequest, RepositoryError,
};
use super::sevis::{ExportQueue, SevisGate};
use super::settings::ChangeQueueSettings;
use super::store::{
    require, AuthorizationError, AuthorizationProvider, EntityStore, EntityStoreError, Permission,
};
use super::validation::{comment_content, rejection_reason, SubmissionValidator, ValidationError};

/// Owns every change item / change request transition and applies approved
/// edits to the entity store.
pub struct ApprovalEngine<R, S> {
    repository: Arc<R>,
    store: Arc<S>,
    policy: Arc<dyn PolicyTable>,
    authorization: Arc<dyn AuthorizationProvider>,
    settings: ChangeQueueSettings,
    sequences: IdSequences,
}

#[derive(Default)]
struct IdSequences {
    requests: AtomicU64,
    items: AtomicU64,
    comments: AtomicU64,
}

fn next_id(counter: &AtomicU64, prefix: &str) -> String {
    let id = counter.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{prefix}-{id:06}")
}

/// Entity targeted by the request that owns an item.
struct EntityRef {
    entity_type: EntityType,
    entity_id: EntityId,
}

impl<R, S> ApprovalEngine<R, S>
where
    R: ChangeRequestRepository + 'static,
    S: EntityStore + 'static,
{
    pub fn new(
        repository: Arc<R>,
        store: Arc<S>,
        policy: Arc<dyn PolicyTable>,
        authorization: Arc<dyn AuthorizationProvider>,
        settings: ChangeQueueSettings,
    ) -> Self {
        Self {
            repository,
            store,
            policy,
            authorization,
            settings,
            sequences: IdSequences::default(),
        }
    }

    pub fn settings(&self) -> &ChangeQueueSettings {
        &self.settings
    }

    pub fn policy(&self) -> &dyn PolicyTable {
        self.policy.as_ref()
    }

    /// Validate and persist a batch of proposed edits with every item pending.
    ///
    /// Any invalid item rejects the whole batch; nothing is persisted then.
    pub fn submit(
        &self,
        submission: ChangeSubmission,
        at: DateTime<Utc>,
    ) -> Result<ChangeRequest, ChangeQueueError> {
        let current = self
            .store
            .read(submission.entity_type, &submission.entity_id)?;

        let validated = SubmissionValidator::new(self.policy.as_ref())
            .validate(&submission, current.as_ref())
            .map_err(|err| {
                warn!(
                    entity_type = submission.entity_type.label(),
                    entity_id = %submission.entity_id,
                    issues = err.issues.len(),
                    "change submission rejected"
                );
                err
            })?;

        let items = validated
            .into_iter()
            .map(|change| ChangeItem {
                id: ChangeItemId(next_id(&self.sequences.items, "ci")),
                field_path: change.field_path,
                field_label: change.field_label,
                previous_value: change.previous_value,
                new_value: change.new_value,
                change_kind: change.change_kind,
                is_sevis_related: change.is_sevis_related,
                required_approval_level: change.required_approval_level,
                status: ItemStatus::Pending,
                requested_by: submission.requested_by.clone(),
                requested_at: at,
                resolved_by: None,
                resolved_at: None,
                rejection_reason: None,
                export_ready: false,
                exported_at: None,
                comments: Vec::new(),
            })
            .collect();

        let request = ChangeRequest::new(
            ChangeRequestId(next_id(&self.sequences.requests, "cr")),
            RequestMeta {
                entity_type: submission.entity_type,
                entity_id: submission.entity_id,
                priority: submission.priority,
                requested_by: submission.requested_by,
            },
            items,
            at,
        );

        let stored = self.repository.insert(request)?;
        info!(
            request_id = %stored.id,
            entity_type = stored.entity_type.label(),
            entity_id = %stored.entity_id,
            items = stored.items().len(),
            sevis_items = stored.items().iter().filter(|item| item.is_sevis_related).count(),
            "change request submitted"
        );
        Ok(stored)
    }

    /// Resolve one item. Approval writes the entity field, marks the item,
    /// and recomputes the parent rollup as one unit.
    pub fn decide(
        &self,
        item_id: &ChangeItemId,
        decision: Decision,
        actor: &ActorId,
        reason: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<ChangeItem, ChangeQueueError> {
        let reason = match decision {
            Decision::Reject => Some(rejection_reason(reason)?),
            Decision::Approve => None,
        };
        require(self.authorization.as_ref(), actor, Permission::ReviewChanges)?;

        let gate = SevisGate::new(self.authorization.as_ref());
        let store = self.store.as_ref();

        let outcome = self.update_item(item_id, at, |entity, item| {
            if item.status.is_terminal() {
                return Err(ChangeQueueError::AlreadyResolved {
                    item_id: item.id.clone(),
                    status: item.status,
                });
            }

            // `reason` is present exactly for rejections.
            match reason {
                Some(reason) => item.reject(actor, reason, at),
                None => {
                    gate.authorize_approval(item, actor)?;
                    store.write_field(
                        entity.entity_type,
                        &entity.entity_id,
                        &item.field_path,
                        &item.new_value,
                        &item.id,
                    )?;
                    item.approve(actor, at);
                    SevisGate::enqueue(item);
                }
            }
            Ok(item.clone())
        });

        match outcome {
            Ok((item, rollup)) => {
                info!(
                    item_id = %item.id,
                    actor = %actor,
                    status = item.status.label(),
                    sevis = item.is_sevis_related,
                    rollup = rollup.label(),
                    "change item resolved"
                );
                Ok(item)
            }
            Err(err) => {
                if matches!(
                    err,
                    ChangeQueueError::AlreadyResolved { .. } | ChangeQueueError::Authorization(_)
                ) {
                    warn!(item_id = %item_id, actor = %actor, error = %err, "decision refused");
                }
                Err(err)
            }
        }
    }

    /// Append a comment; allowed whatever the item status.
    pub fn add_comment(
        &self,
        item_id: &ChangeItemId,
        author: CommentAuthor,
        content: &str,
        is_internal: bool,
        at: DateTime<Utc>,
    ) -> Result<Comment, ChangeQueueError> {
        let content = comment_content(content)?;
        let comment = Comment {
            id: CommentId(next_id(&self.sequences.comments, "cm")),
            author_id: author.id,
            author_name: author.name,
            content,
            is_internal,
            created_at: at,
        };

        let (comment, _) = self.update_item(item_id, at, |_, item| {
            item.comments.push(comment.clone());
            Ok(comment)
        })?;
        info!(
            item_id = %item_id,
            comment_id = %comment.id,
            internal = is_internal,
            "comment added"
        );
        Ok(comment)
    }

    /// Withdraw a request. Only its requester may, and only before any decision.
    pub fn withdraw(
        &self,
        request_id: &ChangeRequestId,
        actor: &ActorId,
    ) -> Result<ChangeRequest, ChangeQueueError> {
        let removed = self
            .repository
            .remove(request_id, |request| {
                let refusal = if &request.requested_by != actor {
                    Some(WithdrawalBlock::NotRequester)
                } else if !request.is_untouched() {
                    Some(WithdrawalBlock::AlreadyReviewed)
                } else {
                    None
                };
                match refusal {
                    Some(block) => Err(ChangeQueueError::WithdrawalRefused {
                        request_id: request.id.clone(),
                        block,
                    }),
                    None => Ok(()),
                }
            })
            .map_err(|err| match err {
                ChangeQueueError::Repository(RepositoryError::NotFound) => {
                    ChangeQueueError::request_not_found(request_id)
                }
                other => {
                    if matches!(other, ChangeQueueError::WithdrawalRefused { .. }) {
                        warn!(
                            request_id = %request_id,
                            actor = %actor,
                            error = %other,
                            "withdrawal refused"
                        );
                    }
                    other
                }
            })?;

        info!(request_id = %removed.id, actor = %actor, "change request withdrawn");
        Ok(removed)
    }

    pub fn get(&self, request_id: &ChangeRequestId) -> Result<ChangeRequest, ChangeQueueError> {
        self.repository
            .fetch(request_id)?
            .ok_or_else(|| ChangeQueueError::request_not_found(request_id))
    }

    /// Dashboard query: newest `updated_at` first, paged.
    pub fn list_change_requests(
        &self,
        filter: &ChangeRequestFilter,
        offset: usize,
        limit: Option<usize>,
    ) -> Result<Page<ChangeRequest>, ChangeQueueError> {
        let page = PageRequest::new(offset, self.settings.page_size(limit));
        Ok(self.repository.list(filter, page)?)
    }

    /// Batch exporter surface. The limit is capped by `max_export_claim`.
    pub fn claim_exportable(
        &self,
        limit: usize,
        at: DateTime<Utc>,
    ) -> Result<Vec<ChangeItem>, ChangeQueueError> {
        let limit = self.settings.claim_limit(limit);
        Ok(ExportQueue::new(self.repository.as_ref()).claim(limit, at)?)
    }

    pub fn summary(&self) -> Result<ChangeQueueSummary, ChangeQueueError> {
        let requests = self.repository.scan()?;
        let mut by_status: BTreeMap<RequestStatus, usize> =
            RequestStatus::ALL.iter().map(|status| (*status, 0)).collect();
        let mut summary = ChangeQueueSummary {
            total_requests: requests.len(),
            ..ChangeQueueSummary::default()
        };

        for request in &requests {
            *by_status.entry(request.status()).or_default() += 1;
            for item in request.items() {
                if item.status == ItemStatus::Pending && SevisGate::requires_elevation(item) {
                    summary.awaiting_elevated_review += 1;
                }
                if item.is_exportable() {
                    summary.export_backlog += 1;
                }
                if item.exported_at.is_some() {
                    summary.exported += 1;
                }
            }
        }
        summary.by_status = by_status;
        Ok(summary)
    }

    /// Locate the item's parent, run `op` on the item inside the parent's
    /// transaction, then recompute the rollup. Returns `op`'s value and the
    /// new rollup status.
    fn update_item<T, F>(
        &self,
        item_id: &ChangeItemId,
        at: DateTime<Utc>,
        op: F,
    ) -> Result<(T, RequestStatus), ChangeQueueError>
    where
        F: FnOnce(EntityRef, &mut ChangeItem) -> Result<T, ChangeQueueError>,
    {
        let request_id = self
            .repository
            .locate_item(item_id)?
            .ok_or_else(|| ChangeQueueError::item_not_found(item_id))?;

        let outcome = self.repository.modify(&request_id, |request| {
            let entity = EntityRef {
                entity_type: request.entity_type,
                entity_id: request.entity_id.clone(),
            };
            let parent = request.id.clone();
            let item = request
                .item_mut(item_id)
                .ok_or_else(|| ChangeQueueError::Consistency {
                    item_id: item_id.clone(),
                    request_id: parent,
                })?;
            let value = op(entity, item)?;
            request.touch(at);
            Ok((value, request.status()))
        });

        match outcome {
            Err(ChangeQueueError::Repository(RepositoryError::NotFound)) => {
                // Withdrawn between lookup and lock, or the index is dangling.
                if self.repository.locate_item(item_id)?.is_some() {
                    Err(self.consistency_fault(item_id, &request_id))
                } else {
                    Err(ChangeQueueError::item_not_found(item_id))
                }
            }
            Err(ChangeQueueError::Consistency {
                item_id,
                request_id,
            }) => Err(self.consistency_fault(&item_id, &request_id)),
            other => other,
        }
    }

    fn consistency_fault(
        &self,
        item_id: &ChangeItemId,
        request_id: &ChangeRequestId,
    ) -> ChangeQueueError {
        error!(
            item_id = %item_id,
            request_id = %request_id,
            "change item index disagrees with stored requests; manual investigation required"
        );
        ChangeQueueError::Consistency {
            item_id: item_id.clone(),
            request_id: request_id.clone(),
        }
    }
}

/// Dashboard counters across the whole queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeQueueSummary {
    pub total_requests: usize,
    pub by_status: BTreeMap<RequestStatus, usize>,
    pub awaiting_elevated_review: usize,
    pub export_backlog: usize,
    pub exported: usize,
}

/// Why a withdrawal was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalBlock {
    NotRequester,
    AlreadyReviewed,
}

impl fmt::Display for WithdrawalBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WithdrawalBlock::NotRequester => write!(f, "only the requester may withdraw"),
            WithdrawalBlock::AlreadyReviewed => {
                write!(f, "at least one item has already been resolved")
            }
        }
    }
}

/// Error raised by the approval engine.
#[derive(Debug, thiserror::Error)]
pub enum ChangeQueueError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("change item {item_id} is already {}", .status.label())]
    AlreadyResolved {
        item_id: ChangeItemId,
        status: ItemStatus,
    },
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error("withdrawal of {request_id} refused: {block}")]
    WithdrawalRefused {
        request_id: ChangeRequestId,
        block: WithdrawalBlock,
    },
    #[error("change item {item_id} references missing change request {request_id}")]
    Consistency {
        item_id: ChangeItemId,
        request_id: ChangeRequestId,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    EntityStore(#[from] EntityStoreError),
}

impl ChangeQueueError {
    fn item_not_found(id: &ChangeItemId) -> Self {
        Self::NotFound {
            kind: "change item",
            id: id.0.clone(),
        }
    }

    fn request_not_found(id: &ChangeRequestId) -> Self {
        Self::NotFound {
            kind: "change request",
            id: id.0.clone(),
        }
    }
}
