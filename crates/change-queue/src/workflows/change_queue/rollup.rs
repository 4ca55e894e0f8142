use super::domain::{ItemStatus, RequestStatus};

/// Derive a request's status from its item statuses.
///
/// A request stays `Pending` until its first item is resolved. From then on
/// it is `PartiallyApproved` while outcomes are mixed or items remain
/// pending, and settles on `FullyApproved` or `Rejected` once every item
/// shares the same terminal outcome. The result depends only on the
/// multiset of statuses, never on order. An empty set reports `Pending`.
pub fn rollup_status<I>(statuses: I) -> RequestStatus
where
    I: IntoIterator<Item = ItemStatus>,
{
    let mut pending = 0usize;
    let mut approved = 0usize;
    let mut rejected = 0usize;

    for status in statuses {
        match status {
            ItemStatus::Pending => pending += 1,
            ItemStatus::Approved => approved += 1,
            ItemStatus::Rejected => rejected += 1,
        }
    }

    match (pending, approved, rejected) {
        (_, 0, 0) => RequestStatus::Pending,
        (0, _, 0) => RequestStatus::FullyApproved,
        (0, 0, _) => RequestStatus::Rejected,
        _ => RequestStatus::PartiallyApproved,
    }
}
