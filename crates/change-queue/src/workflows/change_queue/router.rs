use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::domain::{
    ActorId, ChangeItemId, ChangeRequestId, ChangeSubmission, CommentAuthor, Decision,
    EntityType, Priority, RequestStatus,
};
use super::engine::{ApprovalEngine, ChangeQueueError};
use super::repository::{ChangeRequestFilter, ChangeRequestRepository, RepositoryError};
use super::store::{EntityStore, EntityStoreError};

/// Router builder exposing the change queue over HTTP.
pub fn change_queue_router<R, S>(engine: Arc<ApprovalEngine<R, S>>) -> Router
where
    R: ChangeRequestRepository + 'static,
    S: EntityStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/change-requests",
            post(submit_handler::<R, S>).get(list_handler::<R, S>),
        )
        .route(
            "/api/v1/change-requests/:request_id",
            get(request_handler::<R, S>),
        )
        .route(
            "/api/v1/change-requests/:request_id/withdraw",
            post(withdraw_handler::<R, S>),
        )
        .route(
            "/api/v1/change-items/:item_id/decision",
            post(decision_handler::<R, S>),
        )
        .route(
            "/api/v1/change-items/:item_id/comments",
            post(comment_handler::<R, S>),
        )
        .route("/api/v1/exports/claim", post(claim_handler::<R, S>))
        .route("/api/v1/change-queue/summary", get(summary_handler::<R, S>))
        .with_state(engine)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListQuery {
    pub(crate) status: Option<RequestStatus>,
    pub(crate) entity_type: Option<EntityType>,
    pub(crate) priority: Option<Priority>,
    #[serde(default)]
    pub(crate) offset: usize,
    pub(crate) limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DecisionBody {
    pub(crate) decision: Decision,
    pub(crate) actor_id: ActorId,
    #[serde(default)]
    pub(crate) reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentBody {
    pub(crate) author_id: ActorId,
    pub(crate) author_name: String,
    pub(crate) content: String,
    #[serde(default)]
    pub(crate) is_internal: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WithdrawBody {
    pub(crate) actor_id: ActorId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClaimBody {
    pub(crate) limit: usize,
}

pub(crate) async fn submit_handler<R, S>(
    State(engine): State<Arc<ApprovalEngine<R, S>>>,
    axum::Json(submission): axum::Json<ChangeSubmission>,
) -> Response
where
    R: ChangeRequestRepository + 'static,
    S: EntityStore + 'static,
{
    match engine.submit(submission, Utc::now()) {
        Ok(request) => (StatusCode::CREATED, axum::Json(request)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_handler<R, S>(
    State(engine): State<Arc<ApprovalEngine<R, S>>>,
    Query(query): Query<ListQuery>,
) -> Response
where
    R: ChangeRequestRepository + 'static,
    S: EntityStore + 'static,
{
    let filter = ChangeRequestFilter {
        status: query.status,
        entity_type: query.entity_type,
        priority: query.priority,
    };
    match engine.list_change_requests(&filter, query.offset, query.limit) {
        Ok(page) => (StatusCode::OK, axum::Json(page)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn request_handler<R, S>(
    State(engine): State<Arc<ApprovalEngine<R, S>>>,
    Path(request_id): Path<String>,
) -> Response
where
    R: ChangeRequestRepository + 'static,
    S: EntityStore + 'static,
{
    match engine.get(&ChangeRequestId(request_id)) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn withdraw_handler<R, S>(
    State(engine): State<Arc<ApprovalEngine<R, S>>>,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<WithdrawBody>,
) -> Response
where
    R: ChangeRequestRepository + 'static,
    S: EntityStore + 'static,
{
    match engine.withdraw(&ChangeRequestId(request_id), &body.actor_id) {
        Ok(request) => (StatusCode::OK, axum::Json(request)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn decision_handler<R, S>(
    State(engine): State<Arc<ApprovalEngine<R, S>>>,
    Path(item_id): Path<String>,
    axum::Json(body): axum::Json<DecisionBody>,
) -> Response
where
    R: ChangeRequestRepository + 'static,
    S: EntityStore + 'static,
{
    let outcome = engine.decide(
        &ChangeItemId(item_id),
        body.decision,
        &body.actor_id,
        body.reason.as_deref(),
        Utc::now(),
    );
    match outcome {
        Ok(item) => (StatusCode::OK, axum::Json(item)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn comment_handler<R, S>(
    State(engine): State<Arc<ApprovalEngine<R, S>>>,
    Path(item_id): Path<String>,
    axum::Json(body): axum::Json<CommentBody>,
) -> Response
where
    R: ChangeRequestRepository + 'static,
    S: EntityStore + 'static,
{
    let author = CommentAuthor {
        id: body.author_id,
        name: body.author_name,
    };
    match engine.add_comment(
        &ChangeItemId(item_id),
        author,
        &body.content,
        body.is_internal,
        Utc::now(),
    ) {
        Ok(comment) => (StatusCode::CREATED, axum::Json(comment)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn claim_handler<R, S>(
    State(engine): State<Arc<ApprovalEngine<R, S>>>,
    axum::Json(body): axum::Json<ClaimBody>,
) -> Response
where
    R: ChangeRequestRepository + 'static,
    S: EntityStore + 'static,
{
    match engine.claim_exportable(body.limit, Utc::now()) {
        Ok(items) => (StatusCode::OK, axum::Json(json!({ "items": items }))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn summary_handler<R, S>(
    State(engine): State<Arc<ApprovalEngine<R, S>>>,
) -> Response
where
    R: ChangeRequestRepository + 'static,
    S: EntityStore + 'static,
{
    match engine.summary() {
        Ok(summary) => (StatusCode::OK, axum::Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

/// Map engine errors onto HTTP statuses with a JSON body.
pub(crate) fn error_response(error: ChangeQueueError) -> Response {
    let message = error.to_string();
    match error {
        ChangeQueueError::Validation(validation) => {
            let payload = json!({
                "error": message,
                "issues": validation.issues,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response()
        }
        ChangeQueueError::NotFound { kind, id } => {
            let payload = json!({ "error": message, "kind": kind, "id": id });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        ChangeQueueError::AlreadyResolved { item_id, status } => {
            let payload = json!({
                "error": message,
                "item_id": item_id,
                "status": status,
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        ChangeQueueError::WithdrawalRefused { request_id, block } => {
            let payload = json!({
                "error": message,
                "request_id": request_id,
                "reason": block,
            });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        ChangeQueueError::Authorization(denied) => {
            let payload = json!({
                "error": message,
                "actor_id": denied.actor,
                "permission": denied.permission,
            });
            (StatusCode::FORBIDDEN, axum::Json(payload)).into_response()
        }
        ChangeQueueError::Repository(RepositoryError::Unavailable(_))
        | ChangeQueueError::EntityStore(EntityStoreError::Unavailable(_)) => {
            let payload = json!({ "error": message });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
        ChangeQueueError::Consistency { .. }
        | ChangeQueueError::Repository(_)
        | ChangeQueueError::EntityStore(_) => {
            let payload = json!({ "error": message });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
