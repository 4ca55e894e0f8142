use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    ChangeItemId, ChangeRequest, ChangeRequestId, EntityType, Priority, RequestStatus,
};

/// Storage abstraction so the approval engine can be exercised in isolation.
///
/// `modify` and `remove` are the transactional boundary: implementations run
/// the closure against the authoritative stored request while holding that
/// request exclusively, and persist the outcome only when the closure succeeds.
pub trait ChangeRequestRepository: Send + Sync {
    fn insert(&self, request: ChangeRequest) -> Result<ChangeRequest, RepositoryError>;

    fn fetch(&self, id: &ChangeRequestId) -> Result<Option<ChangeRequest>, RepositoryError>;

    /// Parent request of an item, from the item index.
    fn locate_item(
        &self,
        item_id: &ChangeItemId,
    ) -> Result<Option<ChangeRequestId>, RepositoryError>;

    fn modify<T, E, F>(&self, id: &ChangeRequestId, mutation: F) -> Result<T, E>
    where
        F: FnOnce(&mut ChangeRequest) -> Result<T, E>,
        E: From<RepositoryError>;

    /// Delete a request (and its item index entries) if `guard` accepts it.
    fn remove<E, F>(&self, id: &ChangeRequestId, guard: F) -> Result<ChangeRequest, E>
    where
        F: FnOnce(&ChangeRequest) -> Result<(), E>,
        E: From<RepositoryError>;

    /// Point-in-time copy of every stored request.
    fn scan(&self) -> Result<Vec<ChangeRequest>, RepositoryError>;

    /// Newest `updated_at` first, ties broken by id descending.
    fn list(
        &self,
        filter: &ChangeRequestFilter,
        page: PageRequest,
    ) -> Result<Page<ChangeRequest>, RepositoryError> {
        let mut matching: Vec<ChangeRequest> = self
            .scan()?
            .into_iter()
            .filter(|request| filter.matches(request))
            .collect();
        matching.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(Page::slice(matching, page))
    }

    /// Export-ready items not yet claimed, oldest resolution first.
    fn export_candidates(&self) -> Result<Vec<ExportCandidate>, RepositoryError> {
        let mut candidates: Vec<ExportCandidate> = self
            .scan()?
            .iter()
            .flat_map(|request| {
                request
                    .items()
                    .iter()
                    .filter(|item| item.is_exportable())
                    .map(|item| ExportCandidate {
                        request_id: request.id.clone(),
                        item_id: item.id.clone(),
                        resolved_at: item.resolved_at,
                    })
            })
            .collect();
        candidates.sort_by(|a, b| (a.resolved_at, &a.item_id).cmp(&(b.resolved_at, &b.item_id)));
        Ok(candidates)
    }
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Dashboard filter; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequestFilter {
    #[serde(default)]
    pub status: Option<RequestStatus>,
    #[serde(default)]
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl ChangeRequestFilter {
    pub fn matches(&self, request: &ChangeRequest) -> bool {
        self.status.map_or(true, |status| request.status() == status)
            && self
                .entity_type
                .map_or(true, |entity_type| request.entity_type == entity_type)
            && self
                .priority
                .map_or(true, |priority| request.priority == priority)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

/// One window of an ordered result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
}

impl<T> Page<T> {
    pub fn slice(all: Vec<T>, page: PageRequest) -> Self {
        let total = all.len();
        let items: Vec<T> = all
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();
        let end = page.offset.saturating_add(items.len());
        Self {
            items,
            total,
            offset: page.offset,
            limit: page.limit,
            next_offset: (end < total).then_some(end),
        }
    }
}

/// Item that may be claimed by the batch exporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportCandidate {
    pub request_id: ChangeRequestId,
    pub item_id: ChangeItemId,
    pub resolved_at: Option<DateTime<Utc>>,
}
