//! Event endpoints, including the four bulk operations
//!
//! All four bulk endpoints share one dispatch into the generic bulk
//! executor; per-item ownership rules live in the event store.

use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::{debug, info};

use crate::{
    error::{ApiError, ApiErrorResponse, ApiResult},
    models::{
        BulkEventRequest, BulkEventResponse, CreateEventRequest, EventListResponse, EventResponse,
    },
    AppState,
};
use events::{apply_bulk, NewEvent};
use user::{IdentityAssertion, RequiredIdentity};

/// The four per-item operations a bulk request can dispatch to
#[derive(Debug, Clone, Copy)]
enum BulkAction {
    Complete,
    Postpone,
    FollowUp,
    Reject,
}

impl BulkAction {
    fn name(&self) -> &'static str {
        match self {
            BulkAction::Complete => "complete",
            BulkAction::Postpone => "postpone",
            BulkAction::FollowUp => "follow_up",
            BulkAction::Reject => "reject",
        }
    }
}

/// Run one bulk action for the acting principal
async fn run_bulk(
    state: &AppState,
    identity: &IdentityAssertion,
    event_ids: &[String],
    action: BulkAction,
) -> ApiResult<Json<BulkEventResponse>> {
    info!(
        "Bulk {} requested by {} for {} events",
        action.name(),
        identity.principal_id,
        event_ids.len()
    );

    let outcome = apply_bulk(event_ids, |id| {
        let store = state.events.clone();
        let actor = identity.principal_id.clone();
        async move {
            match action {
                BulkAction::Complete => store.complete(&actor, &id).await,
                BulkAction::Postpone => store.postpone(&actor, &id).await,
                BulkAction::FollowUp => store.follow_up(&actor, &id).await,
                BulkAction::Reject => store.reject(&actor, &id).await,
            }
        }
    })
    .await?;

    debug!(
        "Bulk {}: {} succeeded, {} failed",
        action.name(),
        outcome.succeeded.len(),
        outcome.failed.len()
    );

    Ok(Json(outcome.into()))
}

/// Create a new event
///
/// POST /api/v1/events
#[utoipa::path(
    post,
    path = "/api/v1/events",
    request_body = CreateEventRequest,
    responses(
        (status = 200, description = "Event created", body = EventResponse),
        (status = 400, description = "Invalid request", body = ApiErrorResponse),
        (status = 401, description = "Not authenticated", body = ApiErrorResponse),
        (status = 403, description = "Missing capability", body = ApiErrorResponse)
    ),
    tag = "events"
)]
pub async fn create_event(
    State(state): State<AppState>,
    RequiredIdentity(identity): RequiredIdentity,
    Json(req): Json<CreateEventRequest>,
) -> ApiResult<Json<EventResponse>> {
    let event = state
        .events
        .create(
            &identity.principal_id,
            NewEvent {
                title: req.title,
                notes: req.notes,
                scheduled_for: req.scheduled_for,
            },
        )
        .await?;

    info!("Event {} created by {}", event.id, identity.principal_id);

    Ok(Json(event.into()))
}

/// List the acting principal's events
///
/// GET /api/v1/events
#[utoipa::path(
    get,
    path = "/api/v1/events",
    responses(
        (status = 200, description = "Events listed", body = EventListResponse),
        (status = 401, description = "Not authenticated", body = ApiErrorResponse),
        (status = 403, description = "Missing capability", body = ApiErrorResponse)
    ),
    tag = "events"
)]
pub async fn list_events(
    State(state): State<AppState>,
    RequiredIdentity(identity): RequiredIdentity,
) -> ApiResult<Json<EventListResponse>> {
    let events = state.events.list_for(&identity.principal_id).await?;

    let events: Vec<EventResponse> = events.into_iter().map(Into::into).collect();
    let total = events.len();

    Ok(Json(EventListResponse { events, total }))
}

/// Read one of the acting principal's events.
///
/// The lookup is ownership-scoped: someone else's event id answers 404,
/// not 403.
///
/// GET /api/v1/events/{id}
#[utoipa::path(
    get,
    path = "/api/v1/events/{id}",
    params(
        ("id" = String, Path, description = "Event id")
    ),
    responses(
        (status = 200, description = "Event found", body = EventResponse),
        (status = 404, description = "Event not found", body = ApiErrorResponse)
    ),
    tag = "events"
)]
pub async fn get_event(
    State(state): State<AppState>,
    RequiredIdentity(identity): RequiredIdentity,
    Path(id): Path<String>,
) -> ApiResult<Json<EventResponse>> {
    let event = state
        .events
        .get(&id)
        .await?
        .filter(|event| event.created_by == identity.principal_id)
        .ok_or_else(|| ApiError::NotFound("event".to_string()))?;

    Ok(Json(event.into()))
}

/// Mark a batch of events complete
///
/// POST /api/v1/events/bulk/complete
#[utoipa::path(
    post,
    path = "/api/v1/events/bulk/complete",
    request_body = BulkEventRequest,
    responses(
        (status = 200, description = "Per-item outcome", body = BulkEventResponse),
        (status = 400, description = "Empty id list", body = ApiErrorResponse)
    ),
    tag = "events"
)]
pub async fn bulk_complete(
    State(state): State<AppState>,
    RequiredIdentity(identity): RequiredIdentity,
    Json(req): Json<BulkEventRequest>,
) -> ApiResult<Json<BulkEventResponse>> {
    run_bulk(&state, &identity, &req.event_ids, BulkAction::Complete).await
}

/// Postpone a batch of events by the fixed offset
///
/// POST /api/v1/events/bulk/postpone
#[utoipa::path(
    post,
    path = "/api/v1/events/bulk/postpone",
    request_body = BulkEventRequest,
    responses(
        (status = 200, description = "Per-item outcome", body = BulkEventResponse),
        (status = 400, description = "Empty id list", body = ApiErrorResponse)
    ),
    tag = "events"
)]
pub async fn bulk_postpone(
    State(state): State<AppState>,
    RequiredIdentity(identity): RequiredIdentity,
    Json(req): Json<BulkEventRequest>,
) -> ApiResult<Json<BulkEventResponse>> {
    run_bulk(&state, &identity, &req.event_ids, BulkAction::Postpone).await
}

/// Flag a batch of events for follow-up
///
/// POST /api/v1/events/bulk/follow-up
#[utoipa::path(
    post,
    path = "/api/v1/events/bulk/follow-up",
    request_body = BulkEventRequest,
    responses(
        (status = 200, description = "Per-item outcome", body = BulkEventResponse),
        (status = 400, description = "Empty id list", body = ApiErrorResponse)
    ),
    tag = "events"
)]
pub async fn bulk_follow_up(
    State(state): State<AppState>,
    RequiredIdentity(identity): RequiredIdentity,
    Json(req): Json<BulkEventRequest>,
) -> ApiResult<Json<BulkEventResponse>> {
    run_bulk(&state, &identity, &req.event_ids, BulkAction::FollowUp).await
}

/// Reject a batch of events
///
/// POST /api/v1/events/bulk/reject
#[utoipa::path(
    post,
    path = "/api/v1/events/bulk/reject",
    request_body = BulkEventRequest,
    responses(
        (status = 200, description = "Per-item outcome", body = BulkEventResponse),
        (status = 400, description = "Empty id list", body = ApiErrorResponse)
    ),
    tag = "events"
)]
pub async fn bulk_reject(
    State(state): State<AppState>,
    RequiredIdentity(identity): RequiredIdentity,
    Json(req): Json<BulkEventRequest>,
) -> ApiResult<Json<BulkEventResponse>> {
    run_bulk(&state, &identity, &req.event_ids, BulkAction::Reject).await
}
