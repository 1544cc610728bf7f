//! Event entity types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle state of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum EventStatus {
    /// Scheduled and actionable
    Open,
    /// Marked for follow-up by its creator
    FollowUp,
    /// Done; terminal
    Completed,
    /// Declined; terminal
    Rejected,
}

impl EventStatus {
    /// Terminal states reject all further mutations
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Rejected)
    }

    /// Stable wire name, matching the stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Open => "open",
            EventStatus::FollowUp => "follow_up",
            EventStatus::Completed => "completed",
            EventStatus::Rejected => "rejected",
        }
    }
}

/// A scheduled event
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub notes: Option<String>,
    pub scheduled_for: DateTime<Utc>,
    pub status: EventStatus,
    pub created_by: String,
    pub follow_up_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub notes: Option<String>,
    pub scheduled_for: DateTime<Utc>,
}
