use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::change_queue::domain::{
    ActorId, ChangeItem, ChangeRequest, ChangeRequestId, ChangeSubmission, EntityFields, EntityId,
    EntityType, FieldPath, FieldValue, Priority, ProposedChange,
};
use crate::workflows::change_queue::memory::{
    InMemoryChangeRequestRepository, InMemoryEntityStore, StaticAuthorization,
};
use crate::workflows::change_queue::policy::StaticPolicyTable;
use crate::workflows::change_queue::repository::{ChangeRequestRepository, RepositoryError};
use crate::workflows::change_queue::store::Permission;
use crate::workflows::change_queue::{change_queue_router, ApprovalEngine, ChangeQueueSettings};

pub(super) type TestEngine = ApprovalEngine<InMemoryChangeRequestRepository, InMemoryEntityStore>;

pub(super) const STUDENT: &str = "stu-001";
pub(super) const HOST_FAMILY: &str = "hf-001";
pub(super) const REQUESTER: &str = "coordinator-ana";
pub(super) const REVIEWER: &str = "staff-li";
pub(super) const SEVIS_OFFICER: &str = "rso-maria";
pub(super) const OUTSIDER: &str = "host-parent-kim";

pub(super) fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 9, minute, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn actor(id: &str) -> ActorId {
    ActorId(id.to_string())
}

pub(super) fn path(path: &str) -> FieldPath {
    FieldPath::new(path)
}

pub(super) fn text(value: &str) -> FieldValue {
    FieldValue::Text(value.to_string())
}

pub(super) fn student_fields() -> EntityFields {
    let mut fields = EntityFields::new();
    fields.insert(path("first_name"), text("Akira"));
    fields.insert(path("last_name"), text("Tanaka"));
    fields.insert(
        path("date_of_birth"),
        FieldValue::Date(NaiveDate::from_ymd_opt(2008, 4, 12).expect("valid date")),
    );
    fields.insert(path("phone"), text("+1 515 555 0100"));
    fields.insert(path("address.street"), text("12 Elm St"));
    fields.insert(path("address.city"), text("Ames"));
    fields.insert(path("address.state"), text("IA"));
    fields.insert(path("dietary_notes"), text("vegetarian"));
    fields
}

pub(super) fn host_family_fields() -> EntityFields {
    let mut fields = EntityFields::new();
    fields.insert(path("family_name"), text("Olsen"));
    fields.insert(path("bedrooms_available"), FieldValue::Integer(1));
    fields.insert(path("has_pets"), FieldValue::Boolean(false));
    fields
}

pub(super) fn entity_store() -> InMemoryEntityStore {
    InMemoryEntityStore::default()
        .with_entity(EntityType::Student, STUDENT, student_fields())
        .and_then(|store| {
            store.with_entity(EntityType::HostFamily, HOST_FAMILY, host_family_fields())
        })
        .expect("entities seeded")
}

pub(super) fn authorization() -> StaticAuthorization {
    StaticAuthorization::default()
        .grant(REQUESTER, &[Permission::ReviewChanges])
        .grant(REVIEWER, &[Permission::ReviewChanges])
        .grant(
            SEVIS_OFFICER,
            &[Permission::ReviewChanges, Permission::ApproveSevisChanges],
        )
}

pub(super) fn build_engine() -> (
    TestEngine,
    Arc<InMemoryChangeRequestRepository>,
    Arc<InMemoryEntityStore>,
) {
    let repository = Arc::new(InMemoryChangeRequestRepository::default());
    let store = Arc::new(entity_store());
    let engine = ApprovalEngine::new(
        repository.clone(),
        store.clone(),
        Arc::new(StaticPolicyTable::standard()),
        Arc::new(authorization()),
        ChangeQueueSettings::default(),
    );
    (engine, repository, store)
}

pub(super) fn change(field: &str, value: FieldValue) -> ProposedChange {
    ProposedChange {
        field_path: path(field),
        new_value: value,
    }
}

pub(super) fn student_submission(items: Vec<ProposedChange>) -> ChangeSubmission {
    ChangeSubmission {
        entity_type: EntityType::Student,
        entity_id: EntityId(STUDENT.to_string()),
        priority: Priority::High,
        requested_by: actor(REQUESTER),
        items,
    }
}

/// Address (SEVIS-reported) plus phone (not reported).
pub(super) fn address_and_phone() -> ChangeSubmission {
    student_submission(vec![
        change("address.street", text("48 Lincoln Way")),
        change("phone", text("+1 515 555 0199")),
    ])
}

pub(super) fn item<'a>(request: &'a ChangeRequest, field: &str) -> &'a ChangeItem {
    request
        .items()
        .iter()
        .find(|item| item.field_path.as_str() == field)
        .expect("item present")
}

pub(super) fn stored(
    repository: &InMemoryChangeRequestRepository,
    id: &ChangeRequestId,
) -> ChangeRequest {
    repository
        .fetch(id)
        .expect("fetch succeeds")
        .expect("request present")
}

pub(super) fn student_field(store: &InMemoryEntityStore, field: &str) -> Option<FieldValue> {
    use crate::workflows::change_queue::store::EntityStore;
    store
        .read(EntityType::Student, &EntityId(STUDENT.to_string()))
        .expect("read succeeds")
        .expect("student exists")
        .get(&path(field))
        .cloned()
}

pub(super) struct UnavailableRepository;

impl ChangeRequestRepository for UnavailableRepository {
    fn insert(&self, _request: ChangeRequest) -> Result<ChangeRequest, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &ChangeRequestId) -> Result<Option<ChangeRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn locate_item(
        &self,
        _item_id: &crate::workflows::change_queue::domain::ChangeItemId,
    ) -> Result<Option<ChangeRequestId>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn modify<T, E, F>(&self, _id: &ChangeRequestId, _mutation: F) -> Result<T, E>
    where
        F: FnOnce(&mut ChangeRequest) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()).into())
    }

    fn remove<E, F>(&self, _id: &ChangeRequestId, _guard: F) -> Result<ChangeRequest, E>
    where
        F: FnOnce(&ChangeRequest) -> Result<(), E>,
        E: From<RepositoryError>,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()).into())
    }

    fn scan(&self) -> Result<Vec<ChangeRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) fn unavailable_router() -> axum::Router {
    let engine = ApprovalEngine::new(
        Arc::new(UnavailableRepository),
        Arc::new(entity_store()),
        Arc::new(StaticPolicyTable::standard()),
        Arc::new(authorization()),
        ChangeQueueSettings::default(),
    );
    change_queue_router(Arc::new(engine))
}

pub(super) fn router_with_engine(engine: TestEngine) -> axum::Router {
    change_queue_router(Arc::new(engine))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
