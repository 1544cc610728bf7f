//! Session lifecycle: issue, introspect, refresh, invalidate
//!
//! The session artifact is an [`IdentityAssertion`] held server-side in
//! the tower-sessions store; the cookie the client carries is an opaque
//! random id. Expiry is checked on every read, so an expired assertion
//! introspects as unauthenticated rather than erroring.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use chrono::Utc;
use tower_sessions::Session;
use tracing::{debug, error};

use super::types::{AuthenticatedUser, IdentityAssertion, TokenStatus};
use crate::database::UserDatabase;
use crate::error::{Result, UserError};

/// Session configuration re-export
pub use super::store::SessionConfig;

/// Session keys used for storing data
pub struct SessionKeys;

impl SessionKeys {
    pub const ASSERTION: &'static str = "identity_assertion";
}

/// Manages the session state machine for a single principal's session
#[derive(Clone)]
pub struct SessionManager {
    config: SessionConfig,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    /// The active configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Issue a session for an authenticated principal.
    ///
    /// Role names are captured into the assertion for coarse checks; they
    /// are refreshed from the authority graph on every [`Self::refresh`].
    pub async fn issue(
        &self,
        session: &Session,
        user: &AuthenticatedUser,
        roles: Vec<String>,
    ) -> Result<IdentityAssertion> {
        let now = Utc::now();

        let assertion = IdentityAssertion {
            principal_id: user.id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            roles,
            issued_at: now,
            expires_at: now + self.config.lifetime(),
        };

        session
            .insert(SessionKeys::ASSERTION, &assertion)
            .await
            .map_err(|e| UserError::Configuration(format!("Failed to set assertion: {}", e)))?;

        session
            .save()
            .await
            .map_err(|e| UserError::Configuration(format!("Failed to save session: {}", e)))?;

        debug!("Session issued for principal: {}", user.id);
        Ok(assertion)
    }

    /// Read the current assertion, treating absent and expired sessions
    /// the same way: no authenticated principal.
    pub async fn current(session: &Session) -> Result<Option<IdentityAssertion>> {
        let assertion: Option<IdentityAssertion> = session
            .get(SessionKeys::ASSERTION)
            .await
            .map_err(|e| UserError::Configuration(format!("Failed to get assertion: {}", e)))?;

        match assertion {
            Some(a) if a.is_expired() => {
                debug!("Session for {} has expired", a.principal_id);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    /// Introspect the session without mutating it
    pub async fn token_status(&self, session: &Session) -> Result<TokenStatus> {
        let status = match Self::current(session).await? {
            Some(assertion) => {
                TokenStatus::from_assertion(&assertion, self.config.expiring_soon_threshold())
            }
            None => TokenStatus::unauthenticated(),
        };

        Ok(status)
    }

    /// Re-issue the session with a fresh expiry for an already
    /// authenticated principal. Roles are re-read from the authority
    /// graph so role changes propagate without re-login.
    pub async fn refresh(
        &self,
        db: &UserDatabase,
        session: &Session,
    ) -> Result<IdentityAssertion> {
        let Some(current) = Self::current(session).await? else {
            return Err(UserError::NotAuthenticated);
        };

        let user = db
            .find_by_id(&current.principal_id)
            .await?
            .ok_or_else(|| UserError::UserNotFound(current.principal_id.clone()))?;

        let roles = db.role_names_for(&user.id).await?;
        let refreshed = self.issue(session, &user, roles).await?;

        debug!(
            "Session refreshed for principal {}: expires_at={}",
            refreshed.principal_id, refreshed.expires_at
        );

        Ok(refreshed)
    }

    /// Destroy a session (logout)
    pub async fn destroy(session: &Session) -> Result<()> {
        session
            .flush()
            .await
            .map_err(|e| UserError::Configuration(format!("Failed to flush session: {}", e)))?;

        debug!("Session destroyed");
        Ok(())
    }

    /// Check if a session currently holds a live assertion
    pub async fn is_authenticated(session: &Session) -> bool {
        matches!(Self::current(session).await, Ok(Some(_)))
    }
}

/// Extractor for optional identity data
pub struct OptionalIdentity(pub Option<IdentityAssertion>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for OptionalIdentity
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        use axum::Extension;

        let Extension(session): Extension<Session> = Extension::from_request_parts(parts, state)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        let assertion = SessionManager::current(&session).await.map_err(|e| {
            error!("Failed to read session assertion: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

        Ok(OptionalIdentity(assertion))
    }
}

/// Extractor for required identity data (returns 401 if not authenticated)
pub struct RequiredIdentity(pub IdentityAssertion);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequiredIdentity
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let OptionalIdentity(assertion) =
            OptionalIdentity::from_request_parts(parts, state).await?;

        match assertion {
            Some(identity) => Ok(RequiredIdentity(identity)),
            None => Err(StatusCode::UNAUTHORIZED),
        }
    }
}
