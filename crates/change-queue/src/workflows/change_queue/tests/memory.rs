use super::common::*;
use crate::workflows::change_queue::domain::{
    ChangeItemId, EntityId, EntityType, FieldValue, Priority,
};
use crate::workflows::change_queue::engine::ChangeQueueError;
use crate::workflows::change_queue::memory::StaticAuthorization;
use crate::workflows::change_queue::repository::{ChangeRequestRepository, RepositoryError};
use crate::workflows::change_queue::store::{
    AuthorizationProvider, EntityStore, EntityStoreError, Permission, WriteOutcome,
};

#[test]
fn write_field_is_idempotent_per_item() {
    let store = entity_store();
    let student = EntityId(STUDENT.to_string());
    let item = ChangeItemId("ci-000042".to_string());
    let write = |value: &str| {
        store
            .write_field(EntityType::Student, &student, &path("phone"), &text(value), &item)
            .expect("write")
    };

    assert_eq!(write("+1 515 555 0111"), WriteOutcome::Applied);
    assert_eq!(write("+1 515 555 0999"), WriteOutcome::AlreadyApplied);

    assert_eq!(student_field(&store, "phone"), Some(text("+1 515 555 0111")));
    assert_eq!(store.applied_writes().expect("write count"), 1);
}

#[test]
fn null_write_clears_the_field() {
    let store = entity_store();
    store
        .write_field(
            EntityType::Student,
            &EntityId(STUDENT.to_string()),
            &path("dietary_notes"),
            &FieldValue::Null,
            &ChangeItemId("ci-000001".to_string()),
        )
        .expect("write");
    assert_eq!(student_field(&store, "dietary_notes"), None);
}

#[test]
fn writes_to_unknown_entities_fail() {
    let store = entity_store();
    let error = store
        .write_field(
            EntityType::Coordinator,
            &EntityId("co-404".to_string()),
            &path("region"),
            &text("Midwest"),
            &ChangeItemId("ci-000001".to_string()),
        )
        .expect_err("missing entity");
    assert!(matches!(error, EntityStoreError::MissingEntity { .. }));
    assert_eq!(store.applied_writes().expect("write count"), 0);
}

#[test]
fn failed_modification_discards_the_working_copy() {
    let (engine, repository, _) = build_engine();
    let request = engine.submit(address_and_phone(), at(0)).expect("submitted");

    let outcome: Result<(), RepositoryError> = repository.modify(&request.id, |working| {
        working.priority = Priority::Low;
        working.touch(at(7));
        Err(RepositoryError::Conflict)
    });
    assert!(matches!(outcome, Err(RepositoryError::Conflict)));

    let unchanged = stored(&repository, &request.id);
    assert_eq!(unchanged, request);
}

#[test]
fn remove_respects_the_guard() {
    let (engine, repository, _) = build_engine();
    let request = engine.submit(address_and_phone(), at(0)).expect("submitted");
    let item_id = request.items()[0].id.clone();

    let refused: Result<_, ChangeQueueError> = repository.remove(&request.id, |_| {
        Err(ChangeQueueError::Repository(RepositoryError::Conflict))
    });
    assert!(refused.is_err());
    assert_eq!(
        repository.locate_item(&item_id).expect("index readable"),
        Some(request.id.clone())
    );

    let removed: Result<_, RepositoryError> = repository.remove(&request.id, |_| Ok(()));
    assert_eq!(removed.expect("removed").id, request.id);
    assert_eq!(repository.locate_item(&item_id).expect("index readable"), None);
    assert_eq!(repository.fetch(&request.id).expect("fetch"), None);
}

#[test]
fn static_authorization_only_knows_granted_pairs() {
    let grants = StaticAuthorization::default()
        .grant(REVIEWER, &[Permission::ReviewChanges])
        .grant(REVIEWER, &[Permission::ReviewChanges]);

    assert!(grants.has_permission(&actor(REVIEWER), Permission::ReviewChanges));
    assert!(!grants.has_permission(&actor(REVIEWER), Permission::ApproveSevisChanges));
    assert!(!grants.has_permission(&actor(OUTSIDER), Permission::ReviewChanges));
}
