//! SQLx session store implementation for tower-sessions

use std::env;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tower_sessions_sqlx_store::SqliteStore;
use tracing::{debug, error, info, warn};

use crate::error::{Result, UserError};

/// SQLx-based session store for tower-sessions
#[derive(Debug, Clone)]
pub struct SqlxSessionStore {
    store: SqliteStore,
    pool: SqlitePool,
}

impl SqlxSessionStore {
    /// Create a new SQLx session store
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        Self::create_session_table(&pool).await?;

        let store = SqliteStore::new(pool.clone());

        info!("SQLx session store initialized");
        Ok(Self { store, pool })
    }

    /// Create the session table in the database
    async fn create_session_table(pool: &SqlitePool) -> Result<()> {
        let query = r#"
            CREATE TABLE IF NOT EXISTS tower_sessions (
                id TEXT PRIMARY KEY NOT NULL,
                data BLOB NOT NULL,
                expiry_date INTEGER NOT NULL
            )
        "#;

        sqlx::query(query).execute(pool).await.map_err(|e| {
            error!("Failed to create session table: {}", e);
            UserError::Database(e)
        })?;

        let index_query = r#"
            CREATE INDEX IF NOT EXISTS idx_tower_sessions_expiry
            ON tower_sessions(expiry_date)
        "#;

        sqlx::query(index_query).execute(pool).await.map_err(|e| {
            error!("Failed to create session index: {}", e);
            UserError::Database(e)
        })?;

        debug!("Session table and indexes created/verified");
        Ok(())
    }

    /// Get the underlying SqliteStore
    pub fn inner(&self) -> &SqliteStore {
        &self.store
    }

    /// Clean up session records whose expiry has passed. Expired sessions
    /// are otherwise only detected lazily, at the next introspection.
    pub async fn cleanup_expired(&self) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query("DELETE FROM tower_sessions WHERE expiry_date < ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to cleanup expired sessions: {}", e);
                UserError::Configuration(format!("Session cleanup failed: {}", e))
            })?;

        info!("Expired sessions cleaned up");
        Ok(())
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session cookie name
    pub cookie_name: String,
    /// Session lifetime in seconds, measured from issue or refresh
    pub lifetime_seconds: i64,
    /// Remaining lifetime below which a session counts as expiring soon.
    /// An absolute threshold, independent of `lifetime_seconds`.
    pub expiring_soon_threshold_seconds: i64,
    /// Whether to use secure cookies (HTTPS only)
    pub secure: bool,
    /// SameSite cookie attribute
    pub same_site: SameSiteConfig,
    /// HTTP only cookie (not accessible via JavaScript)
    pub http_only: bool,
    /// Session signing key (32 bytes)
    pub secret_key: Vec<u8>,
}

impl SessionConfig {
    /// Load session configuration, prioritizing environment variables
    pub fn new() -> Result<Self> {
        let secret_key = Self::load_secret_key()?;
        Ok(Self {
            cookie_name: "cadence_session".to_string(),
            lifetime_seconds: 3600, // 1 hour
            expiring_soon_threshold_seconds: 600, // 10 minutes
            secure: false, // Set to true in production with HTTPS
            same_site: SameSiteConfig::Lax,
            http_only: true,
            secret_key,
        })
    }

    /// Session lifetime as a chrono duration
    pub fn lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lifetime_seconds)
    }

    /// Expiring-soon threshold as a chrono duration
    pub fn expiring_soon_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.expiring_soon_threshold_seconds)
    }

    /// Load the session secret key from the environment
    /// (SESSION_SECRET_KEY, base64)
    fn load_secret_key() -> Result<Vec<u8>> {
        let key_str = env::var("SESSION_SECRET_KEY")
            .map_err(|_| UserError::Configuration("SESSION_SECRET_KEY not set".to_string()))?;

        BASE64
            .decode(key_str.as_bytes())
            .map_err(|e| UserError::Configuration(format!("Invalid BASE64 secret key: {}", e)))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            warn!("Failed to load session config: {}. Using random key.", e);
            // Fallback for cases where .env is missing during tests/initial setup
            let mut secret_key = vec![0u8; 32];
            use rand::RngCore;
            rand::thread_rng().fill_bytes(&mut secret_key);

            Self {
                cookie_name: "cadence_session".to_string(),
                lifetime_seconds: 3600,
                expiring_soon_threshold_seconds: 600,
                secure: false,
                same_site: SameSiteConfig::Lax,
                http_only: true,
                secret_key,
            }
        })
    }
}

/// SameSite cookie configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SameSiteConfig {
    Strict,
    Lax,
    None,
}

impl From<SameSiteConfig> for tower_sessions::cookie::SameSite {
    fn from(config: SameSiteConfig) -> Self {
        match config {
            SameSiteConfig::Strict => tower_sessions::cookie::SameSite::Strict,
            SameSiteConfig::Lax => tower_sessions::cookie::SameSite::Lax,
            SameSiteConfig::None => tower_sessions::cookie::SameSite::None,
        }
    }
}
