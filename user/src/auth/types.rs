//! Authentication and session types

use axum_login::AuthUser;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents an authenticated principal in the system
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuthenticatedUser {
    pub id: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuthUser for AuthenticatedUser {
    type Id = String;

    fn id(&self) -> Self::Id {
        self.id.clone()
    }

    fn session_auth_hash(&self) -> &[u8] {
        self.id.as_bytes()
    }
}

/// A role as carried in the identity assertion
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoleDetail {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Authentication credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Credentials {
    /// Username/password authentication
    Password {
        username: String,
        password: String,
        ip_address: Option<String>,
    },
}

/// The session artifact stored server-side for an authenticated
/// principal. Carries role names for coarse checks only; fine-grained
/// capability checks always re-traverse the authority graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityAssertion {
    pub principal_id: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub roles: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IdentityAssertion {
    /// A session is expired once `expires_at` is reached, inclusive.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Time left before expiry; zero when already expired
    pub fn time_remaining(&self) -> Duration {
        let remaining = self.expires_at - Utc::now();
        if remaining < Duration::zero() {
            Duration::zero()
        } else {
            remaining
        }
    }
}

/// Snapshot of current session state, as reported by the introspector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenStatus {
    pub is_authenticated: bool,
    pub username: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub time_remaining_secs: i64,
    pub is_expiring_soon: bool,
}

impl TokenStatus {
    /// Status for an absent, expired or undecodable session
    pub fn unauthenticated() -> Self {
        Self {
            is_authenticated: false,
            username: None,
            issued_at: None,
            expires_at: None,
            time_remaining_secs: 0,
            is_expiring_soon: false,
        }
    }

    /// Status for a live assertion. `expiring_soon_threshold` is an
    /// absolute duration, independent of the configured lifetime.
    pub fn from_assertion(assertion: &IdentityAssertion, expiring_soon_threshold: Duration) -> Self {
        if assertion.is_expired() {
            return Self::unauthenticated();
        }

        let remaining = assertion.time_remaining();

        Self {
            is_authenticated: true,
            username: Some(assertion.username.clone()),
            issued_at: Some(assertion.issued_at),
            expires_at: Some(assertion.expires_at),
            time_remaining_secs: remaining.num_seconds(),
            is_expiring_soon: remaining < expiring_soon_threshold,
        }
    }
}

/// Login response payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    pub user: Option<AuthenticatedUser>,
    pub roles: Vec<String>,
    pub message: String,
}

impl AuthResponse {
    /// Create a successful authentication response
    pub fn success(user: AuthenticatedUser, roles: Vec<String>) -> Self {
        Self {
            success: true,
            user: Some(user),
            roles,
            message: "Authentication successful".to_string(),
        }
    }

    /// Create a failed authentication response
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            user: None,
            roles: Vec::new(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assertion(expires_in: Duration) -> IdentityAssertion {
        let now = Utc::now();
        IdentityAssertion {
            principal_id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            display_name: "Alice".to_string(),
            roles: vec!["Viewer".to_string()],
            issued_at: now,
            expires_at: now + expires_in,
        }
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let expired = assertion(Duration::zero());
        assert!(expired.is_expired());
        assert_eq!(expired.time_remaining(), Duration::zero());

        let live = assertion(Duration::minutes(30));
        assert!(!live.is_expired());
    }

    #[test]
    fn test_token_status_expiring_soon_boundary() {
        let threshold = Duration::minutes(10);

        // Comfortably inside the lifetime: not expiring soon
        let status = TokenStatus::from_assertion(&assertion(Duration::minutes(30)), threshold);
        assert!(status.is_authenticated);
        assert!(!status.is_expiring_soon);

        // Inside the threshold window: expiring soon
        let status = TokenStatus::from_assertion(&assertion(Duration::minutes(8)), threshold);
        assert!(status.is_authenticated);
        assert!(status.is_expiring_soon);

        // Already expired: unauthenticated, never "expiring soon"
        let status = TokenStatus::from_assertion(&assertion(Duration::zero()), threshold);
        assert!(!status.is_authenticated);
        assert!(!status.is_expiring_soon);
        assert_eq!(status.time_remaining_secs, 0);
    }

    #[test]
    fn test_auth_response() {
        let user = AuthenticatedUser {
            id: "test_id".to_string(),
            username: "testuser".to_string(),
            email: "test@example.com".to_string(),
            display_name: "Test User".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let success = AuthResponse::success(user.clone(), vec!["Viewer".to_string()]);
        assert!(success.success);
        assert_eq!(success.user.unwrap().id, "test_id");
        assert_eq!(success.roles, vec!["Viewer".to_string()]);

        let failure = AuthResponse::failure("invalid credentials");
        assert!(!failure.success);
        assert!(failure.user.is_none());
        assert_eq!(failure.message, "invalid credentials");
    }
}
