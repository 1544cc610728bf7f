use sqlx::{migrate::MigrateDatabase, Pool, Sqlite, SqlitePool};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit_log::{AuditLogConfig, AuditLogger};
use crate::auth::types::{AuthenticatedUser, RoleDetail};
use crate::error::{Result, UserError};

/// Configuration for the principal database
#[derive(Debug, Clone)]
pub struct UserDatabaseConfig {
    /// Path to the database file
    pub database_path: PathBuf,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection timeout in seconds
    pub connection_timeout: u64,
    /// Audit log configuration
    pub audit_log_config: AuditLogConfig,
}

impl Default for UserDatabaseConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/cadence/cadence_user.db"),
            max_connections: 5,
            connection_timeout: 30,
            audit_log_config: AuditLogConfig::default(),
        }
    }
}

/// Principal database: users, roles, permissions and the two join
/// relations the permission resolver traverses at decision time.
pub struct UserDatabase {
    pool: Pool<Sqlite>,
    #[allow(dead_code)]
    config: UserDatabaseConfig,
    audit_logger: Arc<AuditLogger>,
}

impl UserDatabase {
    /// Initialize the principal database
    pub async fn new(config: UserDatabaseConfig) -> Result<Self> {
        // Ensure the directory exists
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite:{}", config.database_path.display());

        if !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            info!(
                "Creating user database at: {}",
                config.database_path.display()
            );
            Sqlite::create_database(&db_url).await.map_err(|e| {
                UserError::Initialization(format!("Failed to create database: {}", e))
            })?;
        }

        let pool = SqlitePool::connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(&config.database_path)
                .create_if_missing(true),
        )
        .await?;

        let audit_logger = Arc::new(AuditLogger::new(config.audit_log_config.clone())?);

        let db = Self {
            pool,
            config,
            audit_logger,
        };

        db.run_migrations().await?;

        db.audit_logger
            .log_event(None, "database_initialized", None, None, true)
            .await?;

        info!("User database initialized successfully");

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        info!("Running user database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                display_name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                last_login TIMESTAMP,
                is_active BOOLEAN DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS roles (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS permissions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_roles (
                user_id TEXT NOT NULL,
                role_id TEXT NOT NULL,
                assigned_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (user_id, role_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS role_permissions (
                role_id TEXT NOT NULL,
                permission_id TEXT NOT NULL,
                granted_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (role_id, permission_id),
                FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE,
                FOREIGN KEY (permission_id) REFERENCES permissions(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Session store table for tower-sessions
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tower_sessions (
                id TEXT PRIMARY KEY,
                data BLOB NOT NULL,
                expiry_date INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_username ON users(username)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_roles_user ON user_roles(user_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_roles_role ON user_roles(role_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_role_permissions_role ON role_permissions(role_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_expiry ON tower_sessions(expiry_date)",
        )
        .execute(&self.pool)
        .await?;

        self.seed_authority_graph().await?;

        info!("User database migrations completed");

        Ok(())
    }

    /// Seed default roles, permissions and their links if they do not exist
    async fn seed_authority_graph(&self) -> Result<()> {
        let default_roles = vec![
            ("Admin", "Full system access"),
            ("Editor", "Can create and manage events"),
            ("Viewer", "Read-only access to events"),
        ];

        for (name, description) in default_roles {
            let exists =
                sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM roles WHERE name = ?)")
                    .bind(name)
                    .fetch_one(&self.pool)
                    .await?;

            if !exists {
                let id = ulid::Ulid::new().to_string();
                sqlx::query("INSERT INTO roles (id, name, description) VALUES (?, ?, ?)")
                    .bind(&id)
                    .bind(name)
                    .bind(description)
                    .execute(&self.pool)
                    .await?;

                info!("Created default role: {}", name);

                self.audit_logger
                    .log_event(
                        None,
                        "role_created",
                        Some(name.to_string()),
                        Some(serde_json::json!({ "description": description })),
                        true,
                    )
                    .await?;
            }
        }

        let default_permissions = vec![
            ("CanViewEvents", "View events and schedules"),
            ("CanManageEvents", "Complete, postpone, follow up and reject events"),
            ("CanManageUsers", "Administer principals and role assignments"),
            ("CanViewAuditLog", "Read the security audit log"),
        ];

        for (name, description) in default_permissions {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM permissions WHERE name = ?)",
            )
            .bind(name)
            .fetch_one(&self.pool)
            .await?;

            if !exists {
                let id = ulid::Ulid::new().to_string();
                sqlx::query("INSERT INTO permissions (id, name, description) VALUES (?, ?, ?)")
                    .bind(&id)
                    .bind(name)
                    .bind(description)
                    .execute(&self.pool)
                    .await?;

                info!("Created default permission: {}", name);
            }
        }

        let default_links = vec![
            ("Admin", "CanViewEvents"),
            ("Admin", "CanManageEvents"),
            ("Admin", "CanManageUsers"),
            ("Admin", "CanViewAuditLog"),
            ("Editor", "CanViewEvents"),
            ("Editor", "CanManageEvents"),
            ("Viewer", "CanViewEvents"),
        ];

        for (role, permission) in default_links {
            self.grant_permission(role, permission).await?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Principal management
    // ------------------------------------------------------------------

    /// Create a new principal with a hashed password.
    ///
    /// Uniqueness of username and email is checked explicitly before the
    /// insert so the caller gets a typed `Duplicate` error instead of a
    /// raw constraint violation.
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        display_name: &str,
        password: &str,
    ) -> Result<AuthenticatedUser> {
        if self.username_taken(username).await? {
            return Err(UserError::Duplicate {
                field: "username",
                value: username.to_string(),
            });
        }
        if self.email_taken(email).await? {
            return Err(UserError::Duplicate {
                field: "email",
                value: email.to_string(),
            });
        }

        let id = ulid::Ulid::new().to_string();
        let password_hash = crate::auth::password::hash_password(password)?;

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, display_name, password_hash)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(username)
        .bind(email)
        .bind(display_name)
        .bind(&password_hash)
        .execute(&self.pool)
        .await?;

        self.audit_logger
            .log_event(Some(&id), "user_created", Some(username.to_string()), None, true)
            .await?;

        self.find_by_id(&id)
            .await?
            .ok_or_else(|| UserError::UserNotFound(id))
    }

    /// Whether any principals exist yet
    pub async fn has_users(&self) -> Result<bool> {
        let any = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users)")
            .fetch_one(&self.pool)
            .await?;
        Ok(any)
    }

    /// Explicit uniqueness predicate for usernames
    pub async fn username_taken(&self, username: &str) -> Result<bool> {
        let taken =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE username = ?)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(taken)
    }

    /// Explicit uniqueness predicate for email addresses
    pub async fn email_taken(&self, email: &str) -> Result<bool> {
        let taken =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM users WHERE email = ?)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(taken)
    }

    /// Look up a principal by id
    pub async fn find_by_id(&self, user_id: &str) -> Result<Option<AuthenticatedUser>> {
        let user = sqlx::query_as::<_, AuthenticatedUser>(
            r#"
            SELECT id, username, email, display_name, created_at, updated_at
            FROM users
            WHERE id = ? AND is_active = 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Look up a principal by username
    pub async fn find_by_username(&self, username: &str) -> Result<Option<AuthenticatedUser>> {
        let user = sqlx::query_as::<_, AuthenticatedUser>(
            r#"
            SELECT id, username, email, display_name, created_at, updated_at
            FROM users
            WHERE username = ? AND is_active = 1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Fetch the stored password hash for a principal, if any
    pub async fn password_hash_for(&self, username: &str) -> Result<Option<String>> {
        let hash = sqlx::query_scalar::<_, String>(
            "SELECT password_hash FROM users WHERE username = ? AND is_active = 1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(hash)
    }

    /// Record a successful login
    pub async fn update_last_login(&self, user_id: &str) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Authority graph edges
    // ------------------------------------------------------------------

    /// Current roles held by a principal
    pub async fn roles_for(&self, user_id: &str) -> Result<Vec<RoleDetail>> {
        let roles = sqlx::query_as::<_, RoleDetail>(
            r#"
            SELECT r.id, r.name, r.description
            FROM roles r
            INNER JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = ?
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }

    /// Current role names held by a principal
    pub async fn role_names_for(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .roles_for(user_id)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect())
    }

    /// Assign a role to a principal. Idempotent per (principal, role) pair.
    pub async fn assign_role(&self, user_id: &str, role_name: &str) -> Result<()> {
        let role_id = self.role_id_by_name(role_name).await?;

        sqlx::query(
            "INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?, ?)",
        )
        .bind(user_id)
        .bind(&role_id)
        .execute(&self.pool)
        .await?;

        self.audit_logger
            .log_event(
                Some(user_id),
                "role_assigned",
                Some(role_name.to_string()),
                None,
                true,
            )
            .await?;

        Ok(())
    }

    /// Remove a role from a principal
    pub async fn revoke_role(&self, user_id: &str, role_name: &str) -> Result<()> {
        let role_id = self.role_id_by_name(role_name).await?;

        sqlx::query("DELETE FROM user_roles WHERE user_id = ? AND role_id = ?")
            .bind(user_id)
            .bind(&role_id)
            .execute(&self.pool)
            .await?;

        self.audit_logger
            .log_event(
                Some(user_id),
                "role_revoked",
                Some(role_name.to_string()),
                None,
                true,
            )
            .await?;

        Ok(())
    }

    /// Link a permission to a role. Idempotent per (role, permission) pair.
    pub async fn grant_permission(&self, role_name: &str, permission_name: &str) -> Result<()> {
        let role_id = self.role_id_by_name(role_name).await?;
        let permission_id = self.permission_id_by_name(permission_name).await?;

        sqlx::query(
            "INSERT OR IGNORE INTO role_permissions (role_id, permission_id) VALUES (?, ?)",
        )
        .bind(&role_id)
        .bind(&permission_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a permission from a role. Takes effect on the very next
    /// authorization check; sessions are not touched.
    pub async fn revoke_permission(&self, role_name: &str, permission_name: &str) -> Result<()> {
        let role_id = self.role_id_by_name(role_name).await?;
        let permission_id = self.permission_id_by_name(permission_name).await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = ? AND permission_id = ?")
            .bind(&role_id)
            .bind(&permission_id)
            .execute(&self.pool)
            .await?;

        self.audit_logger
            .log_event(
                None,
                "permission_revoked",
                Some(format!("{}:{}", role_name, permission_name)),
                None,
                true,
            )
            .await?;

        Ok(())
    }

    async fn role_id_by_name(&self, role_name: &str) -> Result<String> {
        sqlx::query_scalar::<_, String>("SELECT id FROM roles WHERE name = ?")
            .bind(role_name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| UserError::Configuration(format!("Unknown role: {}", role_name)))
    }

    async fn permission_id_by_name(&self, permission_name: &str) -> Result<String> {
        sqlx::query_scalar::<_, String>("SELECT id FROM permissions WHERE name = ?")
            .bind(permission_name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| {
                UserError::Configuration(format!("Unknown permission: {}", permission_name))
            })
    }

    /// Get the database pool for external use
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Get a shared handle to the audit logger
    pub fn audit_logger(&self) -> Arc<AuditLogger> {
        self.audit_logger.clone()
    }

    /// Verify database integrity
    pub async fn verify_integrity(&self) -> Result<bool> {
        let tables = vec![
            "users",
            "roles",
            "permissions",
            "user_roles",
            "role_permissions",
            "tower_sessions",
        ];

        for table in tables {
            let exists = sqlx::query_scalar::<_, bool>(&format!(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='{}')",
                table
            ))
            .fetch_one(&self.pool)
            .await?;

            if !exists {
                warn!("Missing table: {}", table);
                return Ok(false);
            }
        }

        let log_valid = self.audit_logger.verify_log_chain().await?;
        if !log_valid {
            warn!("Audit log chain verification failed");
            return Ok(false);
        }

        info!("Database integrity check passed");
        Ok(true)
    }

    /// Close the database connection
    pub async fn close(self) -> Result<()> {
        self.pool.close().await;
        info!("User database connection closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_db(temp_dir: &TempDir) -> UserDatabase {
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

        UserDatabase::new(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_database_initialization() {
        let temp_dir = TempDir::new().unwrap();
        let db = test_db(&temp_dir).await;

        assert!(temp_dir.path().join("test_user.db").exists());
        assert!(db.verify_integrity().await.unwrap());

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_default_graph_seeding() {
        let temp_dir = TempDir::new().unwrap();
        let db = test_db(&temp_dir).await;

        let role_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM roles")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(role_count, 3); // Admin, Editor, Viewer

        let permission_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM permissions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(permission_count, 4);

        let link_count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM role_permissions")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(link_count, 7);

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_user_creation_and_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let db = test_db(&temp_dir).await;

        let user = db
            .create_user("alice", "alice@example.com", "Alice", "s3cret!")
            .await
            .unwrap();
        assert_eq!(user.username, "alice");

        let err = db
            .create_user("alice", "other@example.com", "Alice Again", "s3cret!")
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::Duplicate { field: "username", .. }));

        let err = db
            .create_user("alice2", "alice@example.com", "Alice Again", "s3cret!")
            .await
            .unwrap_err();
        assert!(matches!(err, UserError::Duplicate { field: "email", .. }));

        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_role_assignment_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let db = test_db(&temp_dir).await;

        let user = db
            .create_user("bob", "bob@example.com", "Bob", "s3cret!")
            .await
            .unwrap();

        assert!(db.role_names_for(&user.id).await.unwrap().is_empty());

        db.assign_role(&user.id, "Viewer").await.unwrap();
        db.assign_role(&user.id, "Editor").await.unwrap();
        // Assigning twice is a no-op
        db.assign_role(&user.id, "Viewer").await.unwrap();

        let names = db.role_names_for(&user.id).await.unwrap();
        assert_eq!(names, vec!["Editor".to_string(), "Viewer".to_string()]);

        db.revoke_role(&user.id, "Editor").await.unwrap();
        let names = db.role_names_for(&user.id).await.unwrap();
        assert_eq!(names, vec!["Viewer".to_string()]);

        db.close().await.unwrap();
    }
}
