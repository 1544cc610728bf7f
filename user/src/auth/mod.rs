//! Authentication module
//!
//! This module provides authentication functionality including:
//! - Session lifecycle with tower-sessions (issue, introspect, refresh,
//!   invalidate)
//! - Username/password credential verification
//! - A background refresh monitor that keeps sessions alive
//! - User authentication types and traits

pub mod monitor;
pub mod password;
pub mod session;
pub mod store;
pub mod types;

use async_trait::async_trait;
use axum_login::{AuthnBackend, UserId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub use session::SessionConfig;
pub use store::SqlxSessionStore;
pub use types::{AuthenticatedUser, Credentials, IdentityAssertion, TokenStatus};

use crate::{
    audit_log::AuditLogger,
    database::UserDatabase,
    error::{Result, UserError},
};

/// Authentication backend for axum-login
#[derive(Clone)]
pub struct AuthBackend {
    db: Arc<UserDatabase>,
    audit_logger: Arc<AuditLogger>,
}

impl AuthBackend {
    /// Create a new authentication backend
    pub fn new(db: Arc<UserDatabase>, audit_logger: Arc<AuditLogger>) -> Self {
        Self { db, audit_logger }
    }

    /// Verify credentials and return the principal on success.
    ///
    /// `Ok(None)` covers unknown usernames and wrong passwords alike.
    /// Every attempt is appended to the audit log.
    pub async fn verify_credentials(
        &self,
        creds: Credentials,
    ) -> Result<Option<AuthenticatedUser>> {
        let Credentials::Password {
            username, password, ..
        } = creds;

        info!("Authentication attempt for username: {}", username);

        let result = password::verify_password(&self.db, &username, &password).await;

        match &result {
            Ok(Some(user)) => {
                self.db.update_last_login(&user.id).await?;
                self.log_auth_event(
                    Some(&user.id),
                    &username,
                    "Principal authenticated successfully",
                    true,
                )
                .await?;
                info!("Principal {} authenticated successfully", user.id);
            }
            Ok(None) => {
                self.log_auth_event(None, &username, "invalid credentials", false)
                    .await?;
                warn!("Authentication failed for username: {}", username);
            }
            Err(e) => {
                self.log_auth_event(None, &username, &format!("Authentication error: {}", e), false)
                    .await?;
                error!("Authentication error: {}", e);
            }
        }

        result
    }

    /// Log an authentication event to the audit log
    async fn log_auth_event(
        &self,
        principal_id: Option<&str>,
        subject: &str,
        details: &str,
        success: bool,
    ) -> Result<()> {
        self.audit_logger
            .log_event(
                principal_id,
                "authenticate",
                Some(subject.to_string()),
                Some(serde_json::json!({ "details": details })),
                success,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AuthnBackend for AuthBackend {
    type User = AuthenticatedUser;
    type Credentials = Credentials;
    type Error = UserError;

    async fn authenticate(&self, creds: Self::Credentials) -> Result<Option<Self::User>> {
        self.verify_credentials(creds).await
    }

    async fn get_user(&self, user_id: &UserId<Self>) -> Result<Option<Self::User>> {
        debug!("Fetching principal with ID: {}", user_id);
        self.db.find_by_id(user_id).await
    }
}

/// Authentication state that can be extracted from requests
#[derive(Debug, Clone)]
pub enum AuthState {
    /// Principal is authenticated
    Authenticated(IdentityAssertion),
    /// Principal is not authenticated
    Unauthenticated,
}

impl AuthState {
    /// Check if the principal is authenticated
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::Authenticated(_))
    }

    /// Get the identity assertion if available
    pub fn identity(&self) -> Option<&IdentityAssertion> {
        match self {
            AuthState::Authenticated(identity) => Some(identity),
            AuthState::Unauthenticated => None,
        }
    }

    /// Get the principal ID if authenticated
    pub fn principal_id(&self) -> Option<&str> {
        self.identity().map(|a| a.principal_id.as_str())
    }
}
