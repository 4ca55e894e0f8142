use change_queue::config::AuthorizationConfig;
use change_queue::workflows::change_queue::{
    ApprovalEngine, ChangeQueueError, ChangeQueueSettings, EntityFields, EntityStoreError,
    EntityType, FieldPath, FieldValue, InMemoryChangeRequestRepository, InMemoryEntityStore,
    Permission, StaticAuthorization, StaticPolicyTable,
};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type InMemoryEngine =
    ApprovalEngine<InMemoryChangeRequestRepository, InMemoryEntityStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Reviewers get ordinary review rights; SEVIS officers get both tiers.
pub(crate) fn authorization_from_config(config: &AuthorizationConfig) -> StaticAuthorization {
    let reviewers = config.reviewers.iter().fold(
        StaticAuthorization::default(),
        |grants, actor| grants.grant(actor, &[Permission::ReviewChanges]),
    );
    config.sevis_officers.iter().fold(reviewers, |grants, actor| {
        grants.grant(
            actor,
            &[Permission::ReviewChanges, Permission::ApproveSevisChanges],
        )
    })
}

pub(crate) fn build_engine(
    authorization: StaticAuthorization,
    settings: ChangeQueueSettings,
) -> Result<InMemoryEngine, ChangeQueueError> {
    Ok(ApprovalEngine::new(
        Arc::new(InMemoryChangeRequestRepository::default()),
        Arc::new(seeded_entity_store()?),
        Arc::new(StaticPolicyTable::standard()),
        Arc::new(authorization),
        settings,
    ))
}

fn fields(entries: &[(&str, FieldValue)]) -> EntityFields {
    entries
        .iter()
        .map(|(path, value)| (FieldPath::new(*path), value.clone()))
        .collect()
}

fn text(value: &str) -> FieldValue {
    FieldValue::Text(value.to_string())
}

/// Seed dates are literals; an impossible one is a programming error.
fn date(year: i32, month: u32, day: u32) -> FieldValue {
    let date = NaiveDate::from_ymd_opt(year, month, day).unwrap_or_else(|| {
        panic!("seed date {year:04}-{month:02}-{day:02} is not a calendar date")
    });
    FieldValue::Date(date)
}

/// Sample records served until a durable entity store is wired in.
pub(crate) fn seeded_entity_store() -> Result<InMemoryEntityStore, EntityStoreError> {
    InMemoryEntityStore::default()
        .with_entity(
            EntityType::Student,
            "stu-001",
            fields(&[
                ("first_name", text("Akira")),
                ("last_name", text("Tanaka")),
                ("date_of_birth", date(2008, 4, 12)),
                ("email", text("akira.tanaka@example.org")),
                ("phone", text("+1 515 555 0100")),
                ("address.street", text("12 Elm St")),
                ("address.city", text("Ames")),
                ("address.state", text("IA")),
                ("address.postal_code", text("50010")),
                ("school.name", text("Ames High School")),
                ("program.start_date", date(2025, 8, 20)),
                ("program.end_date", date(2026, 6, 5)),
                ("program.status", text("active")),
                ("host_family_id", text("hf-001")),
                ("coordinator_id", text("co-001")),
            ]),
        )?
        .with_entity(
            EntityType::HostFamily,
            "hf-001",
            fields(&[
                ("family_name", text("Olsen")),
                ("email", text("olsen.family@example.org")),
                ("phone", text("+1 515 555 0142")),
                ("address.street", text("48 Lincoln Way")),
                ("address.city", text("Ames")),
                ("address.state", text("IA")),
                ("address.postal_code", text("50014")),
                ("bedrooms_available", FieldValue::Integer(1)),
                ("has_pets", FieldValue::Boolean(false)),
                ("background_check_date", date(2025, 6, 30)),
                ("coordinator_id", text("co-001")),
            ]),
        )?
        .with_entity(
            EntityType::Coordinator,
            "co-001",
            fields(&[
                ("full_name", text("Ana Ruiz")),
                ("email", text("ana.ruiz@example.org")),
                ("region", text("Midwest")),
                ("max_students", FieldValue::Integer(12)),
                ("active", FieldValue::Boolean(true)),
            ]),
        )
}

pub(crate) fn parse_entity_type(raw: &str) -> Result<EntityType, String> {
    let normalized = raw.trim().to_ascii_lowercase().replace('-', "_");
    EntityType::ALL
        .into_iter()
        .find(|entity_type| entity_type.label() == normalized)
        .ok_or_else(|| {
            let known: Vec<&str> = EntityType::ALL.iter().map(|kind| kind.label()).collect();
            format!("unknown entity type '{raw}' (expected one of {})", known.join(", "))
        })
}
