use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use events::{BulkOutcome, Event};
use user::{RoleDetail, TokenStatus};

/// Login request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// A role carried by the authenticated principal
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RoleDetailResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

impl From<RoleDetail> for RoleDetailResponse {
    fn from(role: RoleDetail) -> Self {
        Self {
            id: role.id,
            name: role.name,
            description: role.description,
        }
    }
}

/// The authenticated principal, as returned by login and /auth/me
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PrincipalResponse {
    pub principal_id: String,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub role_details: Vec<RoleDetailResponse>,
}

/// Current session state
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenStatusResponse {
    pub is_authenticated: bool,
    pub username: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub time_remaining_secs: i64,
    pub is_expiring_soon: bool,
}

impl From<TokenStatus> for TokenStatusResponse {
    fn from(status: TokenStatus) -> Self {
        Self {
            is_authenticated: status.is_authenticated,
            username: status.username,
            issued_at: status.issued_at,
            expires_at: status.expires_at,
            time_remaining_secs: status.time_remaining_secs,
            is_expiring_soon: status.is_expiring_soon,
        }
    }
}

/// Result of a self-service capability probe
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PermissionCheckResponse {
    pub has_access: bool,
    pub capability: String,
    pub message: String,
    pub principal_id: String,
    pub username: String,
}

/// Request to create a new event
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateEventRequest {
    pub title: String,
    pub notes: Option<String>,
    pub scheduled_for: DateTime<Utc>,
}

/// A single event
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventResponse {
    pub id: String,
    pub title: String,
    pub notes: Option<String>,
    pub scheduled_for: DateTime<Utc>,
    pub status: String,
    pub created_by: String,
    pub follow_up_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            title: event.title,
            notes: event.notes,
            scheduled_for: event.scheduled_for,
            status: event.status.as_str().to_string(),
            created_by: event.created_by,
            follow_up_at: event.follow_up_at,
            completed_at: event.completed_at,
            created_at: event.created_at,
            updated_at: event.updated_at,
        }
    }
}

/// Response for listing events
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EventListResponse {
    pub events: Vec<EventResponse>,
    pub total: usize,
}

/// Request body shared by all bulk event endpoints
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkEventRequest {
    pub event_ids: Vec<String>,
}

/// A single failed item in a bulk operation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkFailureResponse {
    pub id: String,
    pub reason: String,
}

/// Outcome of a bulk operation: disjoint success and failure lists
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BulkEventResponse {
    pub succeeded: Vec<EventResponse>,
    pub failed: Vec<BulkFailureResponse>,
}

impl From<BulkOutcome<Event>> for BulkEventResponse {
    fn from(outcome: BulkOutcome<Event>) -> Self {
        Self {
            succeeded: outcome.succeeded.into_iter().map(Into::into).collect(),
            failed: outcome
                .failed
                .into_iter()
                .map(|f| BulkFailureResponse {
                    id: f.id,
                    reason: f.reason,
                })
                .collect(),
        }
    }
}

/// Generic success response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub database: DatabaseHealth,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DatabaseHealth {
    pub connected: bool,
    pub message: String,
}
