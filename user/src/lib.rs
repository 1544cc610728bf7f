pub mod audit_log;
pub mod auth;
pub mod database;
pub mod error;

use std::sync::Arc;
use tracing::info;

pub use auth::{AuthBackend, SessionConfig, SqlxSessionStore};
use database::UserDatabase;

/// Principal management system with authentication and sessions
pub struct UserManager {
    database: Arc<UserDatabase>,
    auth_backend: Arc<AuthBackend>,
    session_store: SqlxSessionStore,
    session_manager: SessionManager,
}

impl UserManager {
    /// Create a new user manager with the provided configuration
    pub async fn new(
        db_config: database::UserDatabaseConfig,
        session_config: SessionConfig,
    ) -> error::Result<Self> {
        info!("Initializing principal management system");

        let database = Arc::new(database::UserDatabase::new(db_config).await?);

        // The audit chain has a single writer, owned by the database
        let auth_backend = Arc::new(AuthBackend::new(database.clone(), database.audit_logger()));

        let session_store = SqlxSessionStore::new(database.pool().clone()).await?;

        let session_manager = SessionManager::new(session_config);

        info!("Principal management system initialized successfully");

        Ok(Self {
            database,
            auth_backend,
            session_store,
            session_manager,
        })
    }

    /// Create a new user manager with default configuration
    pub async fn new_default() -> error::Result<Self> {
        Self::new(database::UserDatabaseConfig::default(), SessionConfig::new()?).await
    }

    /// Get a reference to the database
    pub fn database(&self) -> &UserDatabase {
        &self.database
    }

    /// Get a shared handle to the database
    pub fn database_arc(&self) -> Arc<UserDatabase> {
        self.database.clone()
    }

    /// Get a reference to the authentication backend
    pub fn auth_backend(&self) -> &AuthBackend {
        &self.auth_backend
    }

    /// Get a reference to the session store
    pub fn session_store(&self) -> &SqlxSessionStore {
        &self.session_store
    }

    /// Get the session manager
    pub fn session_manager(&self) -> &SessionManager {
        &self.session_manager
    }

    /// Get the session configuration
    pub fn session_config(&self) -> &SessionConfig {
        self.session_manager.config()
    }

    /// Verify system integrity
    pub async fn verify_integrity(&self) -> error::Result<bool> {
        self.database.verify_integrity().await
    }

    /// Clean up expired session records
    pub async fn cleanup_expired(&self) -> error::Result<()> {
        self.session_store.cleanup_expired().await?;

        info!("Cleaned up expired sessions");
        Ok(())
    }
}

// Re-export commonly used types
pub use audit_log::{AuditEntry, AuditLogConfig, AuditLogger};
pub use database::UserDatabaseConfig;
pub use error::{Result as UserResult, UserError};

// Re-export authentication types from auth module
pub use auth::{AuthState, AuthenticatedUser, Credentials, IdentityAssertion, TokenStatus};

// Re-export types from auth::types
pub use auth::types::{AuthResponse, RoleDetail};

// Re-export session machinery
pub use auth::monitor::{
    MonitorConfig, MonitorEvent, RefreshMonitor, SessionHandleProbe, SessionProbe,
};
pub use auth::session::{OptionalIdentity, RequiredIdentity, SessionManager};
pub use auth::store::SameSiteConfig;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_user_manager_creation() {
        dotenvy::dotenv().ok();

        let temp_dir = TempDir::new().unwrap();

        let config = UserDatabaseConfig {
            database_path: temp_dir.path().join("test_user.db"),
            max_connections: 5,
            connection_timeout: 30,
            audit_log_config: AuditLogConfig {
                log_path: temp_dir.path().join("test_audit.log"),
                max_size_mb: 10,
                max_rotations: 5,
                enable_verification: true,
            },
        };

        let manager = UserManager::new(config, SessionConfig::default())
            .await
            .unwrap();

        assert!(manager.verify_integrity().await.unwrap());
    }
}
