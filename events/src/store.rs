//! Event persistence and the per-item operations
//!
//! Ownership checks are evaluated inside each per-item operation, not
//! hoisted: postpone and follow-up are creator-only, complete and reject
//! are not. Existence is checked before ownership, so an unknown id
//! reports "event not found" and a foreign id reports "access denied".

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{EventError, Result};
use crate::types::{Event, EventStatus, NewEvent};

/// Fixed offset applied by postpone
pub const POSTPONE_OFFSET_DAYS: i64 = 1;

/// Horizon set by follow-up
pub const FOLLOW_UP_HORIZON_DAYS: i64 = 7;

/// Storage for events and the four event operations
#[derive(Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    /// Create a new event store over the given pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the event database at the given path
    /// and run migrations
    pub async fn connect(database_path: impl AsRef<std::path::Path>) -> Result<Self> {
        let database_path = database_path.as_ref();

        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let pool = SqlitePool::connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(database_path)
                .create_if_missing(true),
        )
        .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Run event table migrations
    pub async fn migrate(&self) -> Result<()> {
        info!("Running event store migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                notes TEXT,
                scheduled_for TIMESTAMP NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                created_by TEXT NOT NULL,
                follow_up_at TIMESTAMP,
                completed_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_created_by ON events(created_by)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_status ON events(status)")
            .execute(&self.pool)
            .await?;

        info!("Event store migrations completed");
        Ok(())
    }

    /// Create an event owned by the acting principal
    pub async fn create(&self, created_by: &str, new_event: NewEvent) -> Result<Event> {
        if new_event.title.trim().is_empty() {
            return Err(EventError::Validation("title must not be empty".to_string()));
        }

        let id = ulid::Ulid::new().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO events (id, title, notes, scheduled_for, status, created_by, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(new_event.title.trim())
        .bind(&new_event.notes)
        .bind(new_event.scheduled_for)
        .bind(EventStatus::Open)
        .bind(created_by)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        debug!("Created event {} for principal {}", id, created_by);

        self.fetch_required(&id).await
    }

    /// Read a single event by id
    pub async fn get(&self, id: &str) -> Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, notes, scheduled_for, status, created_by,
                   follow_up_at, completed_at, created_at, updated_at
            FROM events
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    /// List events created by a principal, soonest first
    pub async fn list_for(&self, created_by: &str) -> Result<Vec<Event>> {
        let events = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, notes, scheduled_for, status, created_by,
                   follow_up_at, completed_at, created_at, updated_at
            FROM events
            WHERE created_by = ?
            ORDER BY scheduled_for ASC
            "#,
        )
        .bind(created_by)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Mark an event complete. Any principal that reached this operation
    /// may complete it; ownership is not required.
    pub async fn complete(&self, _actor: &str, id: &str) -> Result<Event> {
        let event = self.fetch_actionable(id).await?;

        let now = Utc::now();
        sqlx::query(
            "UPDATE events SET status = ?, completed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(EventStatus::Completed)
        .bind(now)
        .bind(now)
        .bind(&event.id)
        .execute(&self.pool)
        .await?;

        debug!("Event {} completed", event.id);
        self.fetch_required(&event.id).await
    }

    /// Push an event's schedule forward by the fixed offset.
    /// Creator-only.
    pub async fn postpone(&self, actor: &str, id: &str) -> Result<Event> {
        let event = self.fetch_actionable(id).await?;

        if event.created_by != actor {
            return Err(EventError::AccessDenied);
        }

        let now = Utc::now();
        let new_time = event.scheduled_for + Duration::days(POSTPONE_OFFSET_DAYS);

        sqlx::query("UPDATE events SET scheduled_for = ?, updated_at = ? WHERE id = ?")
            .bind(new_time)
            .bind(now)
            .bind(&event.id)
            .execute(&self.pool)
            .await?;

        debug!("Event {} postponed to {}", event.id, new_time);
        self.fetch_required(&event.id).await
    }

    /// Flag an event for follow-up within the fixed horizon.
    /// Creator-only.
    pub async fn follow_up(&self, actor: &str, id: &str) -> Result<Event> {
        let event = self.fetch_actionable(id).await?;

        if event.created_by != actor {
            return Err(EventError::AccessDenied);
        }

        let now = Utc::now();
        let follow_up_at = now + Duration::days(FOLLOW_UP_HORIZON_DAYS);

        sqlx::query(
            "UPDATE events SET status = ?, follow_up_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(EventStatus::FollowUp)
        .bind(follow_up_at)
        .bind(now)
        .bind(&event.id)
        .execute(&self.pool)
        .await?;

        debug!("Event {} flagged for follow-up at {}", event.id, follow_up_at);
        self.fetch_required(&event.id).await
    }

    /// Reject an event. Ownership is not required.
    pub async fn reject(&self, _actor: &str, id: &str) -> Result<Event> {
        let event = self.fetch_actionable(id).await?;

        let now = Utc::now();
        sqlx::query("UPDATE events SET status = ?, updated_at = ? WHERE id = ?")
            .bind(EventStatus::Rejected)
            .bind(now)
            .bind(&event.id)
            .execute(&self.pool)
            .await?;

        debug!("Event {} rejected", event.id);
        self.fetch_required(&event.id).await
    }

    /// Fetch an event that must exist
    async fn fetch_required(&self, id: &str) -> Result<Event> {
        self.get(id).await?.ok_or(EventError::NotFound)
    }

    /// Fetch an event that must exist and accept further mutation
    async fn fetch_actionable(&self, id: &str) -> Result<Event> {
        let event = self.fetch_required(id).await?;

        if event.status.is_terminal() {
            return Err(EventError::Conflict(format!(
                "event is already {}",
                match event.status {
                    EventStatus::Completed => "completed",
                    EventStatus::Rejected => "rejected",
                    _ => "closed",
                }
            )));
        }

        Ok(event)
    }
}
