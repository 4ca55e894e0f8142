//! SEVIS gating: stricter approval for government-reported fields and the
//! export queue the batch exporter drains.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::domain::{ActorId, ChangeItem};
use super::policy::ApprovalLevel;
use super::repository::{ChangeRequestRepository, RepositoryError};
use super::store::{require, AuthorizationError, AuthorizationProvider, Permission};

/// Authorization filter applied before an item may be approved.
pub struct SevisGate<'a> {
    authorization: &'a dyn AuthorizationProvider,
}

impl<'a> SevisGate<'a> {
    pub fn new(authorization: &'a dyn AuthorizationProvider) -> Self {
        Self { authorization }
    }

    pub fn requires_elevation(item: &ChangeItem) -> bool {
        item.is_sevis_related || item.required_approval_level == ApprovalLevel::Elevated
    }

    /// Must run before any entity mutation for the item.
    pub fn authorize_approval(
        &self,
        item: &ChangeItem,
        actor: &ActorId,
    ) -> Result<(), AuthorizationError> {
        if Self::requires_elevation(item) {
            require(self.authorization, actor, Permission::ApproveSevisChanges)?;
        }
        Ok(())
    }

    /// Queue an approved SEVIS item for export. Non-SEVIS items are untouched.
    pub fn enqueue(item: &mut ChangeItem) {
        if item.is_sevis_related {
            item.export_ready = true;
            item.exported_at = None;
        }
    }
}

/// Claim side of the export queue used by batch exporter workers.
pub struct ExportQueue<'a, R> {
    repository: &'a R,
}

impl<'a, R> ExportQueue<'a, R>
where
    R: ChangeRequestRepository,
{
    pub fn new(repository: &'a R) -> Self {
        Self { repository }
    }

    /// Claim up to `limit` exportable items, stamping `exported_at`.
    ///
    /// Each claim is a conditional write under the parent request's lock and
    /// only succeeds while `exported_at` is still unset, so concurrent workers
    /// receive disjoint sets.
    pub fn claim(
        &self,
        limit: usize,
        at: DateTime<Utc>,
    ) -> Result<Vec<ChangeItem>, RepositoryError> {
        let mut claimed = Vec::new();
        if limit == 0 {
            return Ok(claimed);
        }

        for candidate in self.repository.export_candidates()? {
            if claimed.len() >= limit {
                break;
            }

            let outcome = self.repository.modify(&candidate.request_id, |request| {
                let Some(item) = request.item_mut(&candidate.item_id) else {
                    return Ok::<_, RepositoryError>(None);
                };
                if !item.is_exportable() {
                    return Ok(None);
                }
                item.exported_at = Some(at);
                Ok(Some(item.clone()))
            });

            match outcome {
                Ok(Some(item)) => claimed.push(item),
                Ok(None) | Err(RepositoryError::NotFound) => {
                    debug!(item_id = %candidate.item_id, "export candidate already claimed");
                }
                Err(err) => return Err(err),
            }
        }

        if !claimed.is_empty() {
            info!(count = claimed.len(), limit, "claimed SEVIS items for export");
        }
        Ok(claimed)
    }
}
