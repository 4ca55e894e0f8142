use crate::infra::{authorization_from_config, build_engine, parse_entity_type};
use change_queue::config::AuthorizationConfig;
use change_queue::error::AppError;
use change_queue::workflows::change_queue::{
    ActorId, ChangeQueueError, ChangeQueueSettings, ChangeRequest, ChangeSubmission, Decision,
    EntityId, EntityType, FieldPath, FieldValue, PolicyTable, Priority, ProposedChange,
    StaticPolicyTable,
};
use chrono::Utc;
use clap::Args;

const REQUESTER: &str = "coordinator-ana";
const REVIEWER: &str = "staff-li";
const SEVIS_OFFICER: &str = "rso-maria";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print the final change request as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct PolicyArgs {
    /// Limit the listing to one entity type (student, host_family, coordinator).
    #[arg(long, value_parser = parse_entity_type)]
    pub(crate) entity_type: Option<EntityType>,
    /// Only list fields reported to SEVIS.
    #[arg(long)]
    pub(crate) sevis_only: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let authorization = authorization_from_config(&AuthorizationConfig {
        reviewers: vec![REQUESTER.to_string(), REVIEWER.to_string()],
        sevis_officers: vec![SEVIS_OFFICER.to_string()],
    });
    let engine = build_engine(authorization, ChangeQueueSettings::default())?;

    println!("Change queue demo");
    let request = engine.submit(demo_submission(), Utc::now())?;
    println!(
        "Submitted {} for {} {} by {} ({} items)",
        request.id,
        request.entity_type.label(),
        request.entity_id,
        request.requested_by,
        request.items().len()
    );
    for item in request.items() {
        println!(
            "  {} {}: '{}' -> '{}'{}",
            item.id,
            item.field_label,
            item.previous_value,
            item.new_value,
            if item.is_sevis_related { " [SEVIS]" } else { "" }
        );
    }

    let street = request.items()[0].id.clone();
    let phone = request.items()[1].id.clone();
    let reviewer = ActorId(REVIEWER.to_string());
    let officer = ActorId(SEVIS_OFFICER.to_string());

    println!("\n{REVIEWER} approves the street address");
    match engine.decide(&street, Decision::Approve, &reviewer, None, Utc::now()) {
        Ok(_) => println!("  Approved (unexpected: reviewer lacks SEVIS rights)"),
        Err(ChangeQueueError::Authorization(err)) => println!("  Refused: {err}"),
        Err(err) => return Err(err.into()),
    }
    print_status(&engine.get(&request.id)?);

    println!("\n{REVIEWER} approves the phone number");
    engine.decide(&phone, Decision::Approve, &reviewer, None, Utc::now())?;
    print_status(&engine.get(&request.id)?);

    println!("\n{SEVIS_OFFICER} approves the street address");
    let approved = engine.decide(&street, Decision::Approve, &officer, None, Utc::now())?;
    println!("  Export ready: {}", approved.export_ready);
    let finished = engine.get(&request.id)?;
    print_status(&finished);

    println!("\nBatch exporter claims ready items");
    let claimed = engine.claim_exportable(10, Utc::now())?;
    if claimed.is_empty() {
        println!("  Nothing to export");
    }
    for item in &claimed {
        println!("  {} {} = '{}'", item.id, item.field_path, item.new_value);
    }

    let summary = engine.summary()?;
    println!(
        "\nQueue summary: {} requests, {} awaiting elevated review, {} exported",
        summary.total_requests, summary.awaiting_elevated_review, summary.exported
    );

    if args.json {
        match serde_json::to_string_pretty(&engine.get(&request.id)?) {
            Ok(json) => println!("\n{json}"),
            Err(err) => println!("\nRequest payload unavailable: {err}"),
        }
    }

    Ok(())
}

fn demo_submission() -> ChangeSubmission {
    ChangeSubmission {
        entity_type: EntityType::Student,
        entity_id: EntityId("stu-001".to_string()),
        priority: Priority::High,
        requested_by: ActorId(REQUESTER.to_string()),
        items: vec![
            ProposedChange {
                field_path: FieldPath::new("address.street"),
                new_value: FieldValue::Text("48 Lincoln Way".to_string()),
            },
            ProposedChange {
                field_path: FieldPath::new("phone"),
                new_value: FieldValue::Text("+1 515 555 0199".to_string()),
            },
        ],
    }
}

fn print_status(request: &ChangeRequest) {
    let items: Vec<String> = request
        .items()
        .iter()
        .map(|item| format!("{}={}", item.field_path, item.status.label()))
        .collect();
    println!(
        "  Request {}: {} ({})",
        request.id,
        request.status().label(),
        items.join(", ")
    );
}

pub(crate) fn run_policy_listing(args: PolicyArgs) -> Result<(), AppError> {
    let table = StaticPolicyTable::standard();
    let entity_types: Vec<EntityType> = match args.entity_type {
        Some(entity_type) => vec![entity_type],
        None => EntityType::ALL.to_vec(),
    };

    for entity_type in entity_types {
        println!("{}", entity_type.label());
        for (path, policy) in table.fields(entity_type) {
            if args.sevis_only && !policy.is_sevis_related {
                continue;
            }
            println!(
                "  {:<24} {:<20} {:<8}{}{}",
                path.as_str(),
                policy.label,
                policy.field_type.label(),
                if policy.required { " required" } else { "" },
                if policy.is_sevis_related { " [SEVIS]" } else { "" }
            );
        }
    }
    Ok(())
}
