use crate::workflows::change_queue::domain::{ItemStatus, RequestStatus};
use crate::workflows::change_queue::rollup_status;

use ItemStatus::{Approved, Pending, Rejected};

#[test]
fn untouched_requests_stay_pending() {
    assert_eq!(rollup_status([Pending]), RequestStatus::Pending);
    assert_eq!(
        rollup_status([Pending, Pending, Pending]),
        RequestStatus::Pending
    );
}

#[test]
fn first_resolution_moves_request_to_partial() {
    assert_eq!(
        rollup_status([Approved, Pending]),
        RequestStatus::PartiallyApproved
    );
    assert_eq!(
        rollup_status([Pending, Rejected]),
        RequestStatus::PartiallyApproved
    );
    assert_eq!(
        rollup_status([Rejected, Approved, Pending]),
        RequestStatus::PartiallyApproved
    );
}

#[test]
fn unanimous_outcomes_map_to_full_statuses() {
    assert_eq!(
        rollup_status([Approved, Approved]),
        RequestStatus::FullyApproved
    );
    assert_eq!(
        rollup_status([Rejected, Rejected, Rejected]),
        RequestStatus::Rejected
    );
}

#[test]
fn any_terminal_mix_is_partially_approved() {
    assert_eq!(
        rollup_status([Approved, Rejected]),
        RequestStatus::PartiallyApproved
    );
    assert_eq!(
        rollup_status([Rejected, Rejected, Approved]),
        RequestStatus::PartiallyApproved
    );
}

#[test]
fn rollup_ignores_resolution_order() {
    let outcomes = [Approved, Pending, Approved, Approved];
    let expected = rollup_status(outcomes);

    for rotation in 0..outcomes.len() {
        let mut rotated = outcomes;
        rotated.rotate_left(rotation);
        assert_eq!(rollup_status(rotated), expected);

        rotated.reverse();
        assert_eq!(rollup_status(rotated), expected);
    }
}

#[test]
fn empty_set_reports_pending() {
    assert_eq!(rollup_status(Vec::new()), RequestStatus::Pending);
}
