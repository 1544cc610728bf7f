mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use api::{ApiConfig, AppState};
use events::EventStore;
use user::{AuditLogConfig, SessionConfig, UserDatabaseConfig, UserManager};

/// Environment paths configuration
#[derive(Debug, Clone)]
pub struct EnvPaths {
    pub data_path: PathBuf,
}

impl EnvPaths {
    /// Load paths from environment variables
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let data_path = std::env::var("DATA_PATH").unwrap_or_else(|_| "./data".to_string());

        let data_path = if let Some(stripped) = data_path.strip_prefix("./") {
            std::env::current_dir()?.join(stripped)
        } else {
            PathBuf::from(data_path)
        };

        Ok(Self { data_path })
    }
}

/// Interval between expired-session cleanup sweeps
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_paths = EnvPaths::from_env()?;

    let _guard = logging::init_logging(&env_paths)?;

    info!("=== Cadence starting up ===");
    info!("Data path: {:?}", env_paths.data_path);

    // Principal database, authority graph and session store
    let db_config = UserDatabaseConfig {
        database_path: env_paths.data_path.join("cadence_user.db"),
        audit_log_config: AuditLogConfig {
            log_path: env_paths.data_path.join("audit.log"),
            ..AuditLogConfig::default()
        },
        ..UserDatabaseConfig::default()
    };

    let session_config = SessionConfig::default();
    let user_manager = Arc::new(UserManager::new(db_config, session_config).await?);

    if !user_manager.verify_integrity().await? {
        return Err("integrity check failed on startup".into());
    }

    // Development bootstrap: a fresh database has no principals to log
    // in with
    #[cfg(debug_assertions)]
    if !user_manager.database().has_users().await? {
        warn!("No principals found; seeding development admin account");
        let admin = user_manager
            .database()
            .create_user("admin", "admin@example.com", "Administrator", "admin123!")
            .await?;
        user_manager.database().assign_role(&admin.id, "Admin").await?;
    }

    // Event storage
    let events_store = EventStore::connect(env_paths.data_path.join("cadence_events.db")).await?;

    // Expired session records are otherwise only detected lazily; sweep
    // them on a fixed interval
    let cleanup_manager = user_manager.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = cleanup_manager.cleanup_expired().await {
                warn!("Session cleanup sweep failed: {}", e);
            }
        }
    });

    let state = AppState::new(user_manager, events_store);

    let port = std::env::var("API_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3030);

    info!("Starting API server on port {}", port);
    let result = api::start_server_with_config(state, ApiConfig::new().with_port(port)).await;

    logging::log_shutdown();
    result
}
