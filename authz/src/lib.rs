//! Dynamic permission resolution for Cadence.
//!
//! Authorization is answered by walking the authority graph at request
//! time: principal → roles (user_roles) → capabilities (role_permissions
//! → permissions). Nothing is cached in the session, so revoking a
//! capability from a role takes effect on the very next check without
//! forcing affected principals to log out.
//!
//! # Authorization Flow
//!
//! 1. **Request arrives** at the API layer
//! 2. **Authentication** resolves the principal from the session
//! 3. **Authorization middleware** maps the route to a [`Policy`]
//! 4. **PolicyEngine** traverses the graph and decides
//! 5. **Decision** is made: Allow or Deny
//!
//! A principal holding *any* role that carries the capability is
//! granted; the graph is a union across roles, not an intersection.

pub mod error;
pub mod types;

use sqlx::SqlitePool;
use std::collections::BTreeSet;
use tracing::debug;

use error::{AuthzError, Result};
use types::{AccessDecision, Policy};

/// The core authorization engine.
///
/// Holds a pool onto the authority graph and performs a read-only
/// traversal per decision. Safe for unbounded concurrent use.
///
/// # Example
///
/// ```rust,no_run
/// use authz::{types::Policy, PolicyEngine};
///
/// # async fn demo(pool: sqlx::SqlitePool) -> authz::error::Result<()> {
/// let engine = PolicyEngine::new(pool);
///
/// let decision = engine.check("01ARZ3NDEKTSV4RRFFQ69G5FAV", "CanManageEvents").await?;
/// if decision.is_allow() {
///     println!("Access granted");
/// }
///
/// engine.require(Some("01ARZ3NDEKTSV4RRFFQ69G5FAV"), Policy::ManageEvents).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PolicyEngine {
    pool: SqlitePool,
}

impl PolicyEngine {
    /// Creates a new engine over the authority graph pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Decide whether a principal holds a named capability.
    ///
    /// The capability name is matched case-sensitively against stored
    /// permission names. A principal with no roles, or an unknown
    /// capability name, resolves to `Deny`; neither is an error.
    pub async fn check(&self, principal_id: &str, capability: &str) -> Result<AccessDecision> {
        let allowed = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1
                FROM user_roles ur
                INNER JOIN role_permissions rp ON rp.role_id = ur.role_id
                INNER JOIN permissions p ON p.id = rp.permission_id
                WHERE ur.user_id = ? AND p.name = ?
            )
            "#,
        )
        .bind(principal_id)
        .bind(capability)
        .fetch_one(&self.pool)
        .await?;

        let decision = AccessDecision::from(allowed);
        debug!(
            "Capability check: principal={}, capability={}, decision={:?}",
            principal_id, capability, decision
        );

        Ok(decision)
    }

    /// Decide a typed policy for a principal
    pub async fn check_policy(&self, principal_id: &str, policy: Policy) -> Result<AccessDecision> {
        self.check(principal_id, policy.capability()).await
    }

    /// Gate an operation on a typed policy.
    ///
    /// `None` means no authenticated principal was presented and yields
    /// `Unauthenticated`; a failed check yields `Forbidden` carrying the
    /// capability name.
    pub async fn require(&self, principal_id: Option<&str>, policy: Policy) -> Result<()> {
        let Some(principal_id) = principal_id else {
            return Err(AuthzError::Unauthenticated);
        };

        match self.check_policy(principal_id, policy).await? {
            AccessDecision::Allow => Ok(()),
            AccessDecision::Deny => Err(AuthzError::Forbidden {
                capability: policy.capability().to_string(),
            }),
        }
    }

    /// Every capability reachable from the principal's current roles
    pub async fn capabilities_for(&self, principal_id: &str) -> Result<BTreeSet<String>> {
        let names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT p.name
            FROM user_roles ur
            INNER JOIN role_permissions rp ON rp.role_id = ur.role_id
            INNER JOIN permissions p ON p.id = rp.permission_id
            WHERE ur.user_id = ?
            "#,
        )
        .bind(principal_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(names.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Builds the authority graph tables and returns a connected pool
    async fn test_pool(temp_dir: &TempDir) -> SqlitePool {
        let db_path = temp_dir.path().join("test_authz.db");
        std::fs::File::create(&db_path).unwrap();

        let pool = SqlitePool::connect(&format!("sqlite:{}", db_path.display()))
            .await
            .unwrap();

        for ddl in [
            "CREATE TABLE users (id TEXT PRIMARY KEY, username TEXT NOT NULL UNIQUE)",
            "CREATE TABLE roles (id TEXT PRIMARY KEY, name TEXT NOT NULL UNIQUE)",
            "CREATE TABLE permissions (id TEXT PRIMARY KEY, name TEXT NOT NULL UNIQUE)",
            "CREATE TABLE user_roles (user_id TEXT NOT NULL, role_id TEXT NOT NULL, PRIMARY KEY (user_id, role_id))",
            "CREATE TABLE role_permissions (role_id TEXT NOT NULL, permission_id TEXT NOT NULL, PRIMARY KEY (role_id, permission_id))",
        ] {
            sqlx::query(ddl).execute(&pool).await.unwrap();
        }

        pool
    }

    async fn insert_user(pool: &SqlitePool, username: &str) -> String {
        let id = ulid::Ulid::new().to_string();
        sqlx::query("INSERT INTO users (id, username) VALUES (?, ?)")
            .bind(&id)
            .bind(username)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    async fn insert_role(pool: &SqlitePool, name: &str) -> String {
        let id = ulid::Ulid::new().to_string();
        sqlx::query("INSERT INTO roles (id, name) VALUES (?, ?)")
            .bind(&id)
            .bind(name)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    async fn insert_permission(pool: &SqlitePool, name: &str) -> String {
        let id = ulid::Ulid::new().to_string();
        sqlx::query("INSERT INTO permissions (id, name) VALUES (?, ?)")
            .bind(&id)
            .bind(name)
            .execute(pool)
            .await
            .unwrap();
        id
    }

    async fn link_user_role(pool: &SqlitePool, user_id: &str, role_id: &str) {
        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(role_id)
            .execute(pool)
            .await
            .unwrap();
    }

    async fn link_role_permission(pool: &SqlitePool, role_id: &str, permission_id: &str) {
        sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES (?, ?)")
            .bind(role_id)
            .bind(permission_id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_allow_through_any_held_role() {
        let temp_dir = TempDir::new().unwrap();
        let pool = test_pool(&temp_dir).await;
        let engine = PolicyEngine::new(pool.clone());

        let user = insert_user(&pool, "alice").await;
        let viewer = insert_role(&pool, "Viewer").await;
        let editor = insert_role(&pool, "Editor").await;
        let view = insert_permission(&pool, "CanViewEvents").await;
        let manage = insert_permission(&pool, "CanManageEvents").await;

        link_role_permission(&pool, &viewer, &view).await;
        link_role_permission(&pool, &editor, &manage).await;

        // Holding both roles grants the union of their capabilities
        link_user_role(&pool, &user, &viewer).await;
        link_user_role(&pool, &user, &editor).await;

        assert!(engine.check(&user, "CanViewEvents").await.unwrap().is_allow());
        assert!(engine.check(&user, "CanManageEvents").await.unwrap().is_allow());
        assert!(!engine.check(&user, "CanManageUsers").await.unwrap().is_allow());
    }

    #[tokio::test]
    async fn test_no_roles_means_deny() {
        let temp_dir = TempDir::new().unwrap();
        let pool = test_pool(&temp_dir).await;
        let engine = PolicyEngine::new(pool.clone());

        let user = insert_user(&pool, "nobody").await;
        insert_permission(&pool, "CanViewEvents").await;

        assert!(!engine.check(&user, "CanViewEvents").await.unwrap().is_allow());
        assert!(engine.capabilities_for(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_capability_is_deny_not_error() {
        let temp_dir = TempDir::new().unwrap();
        let pool = test_pool(&temp_dir).await;
        let engine = PolicyEngine::new(pool.clone());

        let user = insert_user(&pool, "alice").await;
        let role = insert_role(&pool, "Viewer").await;
        link_user_role(&pool, &user, &role).await;

        let decision = engine.check(&user, "NoSuchCapability").await.unwrap();
        assert!(!decision.is_allow());
    }

    #[tokio::test]
    async fn test_capability_match_is_case_sensitive() {
        let temp_dir = TempDir::new().unwrap();
        let pool = test_pool(&temp_dir).await;
        let engine = PolicyEngine::new(pool.clone());

        let user = insert_user(&pool, "alice").await;
        let role = insert_role(&pool, "Viewer").await;
        let view = insert_permission(&pool, "CanViewEvents").await;
        link_user_role(&pool, &user, &role).await;
        link_role_permission(&pool, &role, &view).await;

        assert!(engine.check(&user, "CanViewEvents").await.unwrap().is_allow());
        assert!(!engine.check(&user, "canviewevents").await.unwrap().is_allow());
    }

    #[tokio::test]
    async fn test_revocation_flips_decision_without_relogin() {
        let temp_dir = TempDir::new().unwrap();
        let pool = test_pool(&temp_dir).await;
        let engine = PolicyEngine::new(pool.clone());

        let user = insert_user(&pool, "alice").await;
        let role = insert_role(&pool, "Editor").await;
        let manage = insert_permission(&pool, "CanManageEvents").await;
        link_user_role(&pool, &user, &role).await;
        link_role_permission(&pool, &role, &manage).await;

        assert!(engine.check(&user, "CanManageEvents").await.unwrap().is_allow());

        // Revoke the link; the next check must observe the change
        sqlx::query("DELETE FROM role_permissions WHERE role_id = ? AND permission_id = ?")
            .bind(&role)
            .bind(&manage)
            .execute(&pool)
            .await
            .unwrap();

        assert!(!engine.check(&user, "CanManageEvents").await.unwrap().is_allow());
    }

    #[tokio::test]
    async fn test_require_distinguishes_unauthenticated_from_forbidden() {
        let temp_dir = TempDir::new().unwrap();
        let pool = test_pool(&temp_dir).await;
        let engine = PolicyEngine::new(pool.clone());

        let user = insert_user(&pool, "viewer_only").await;
        let viewer = insert_role(&pool, "Viewer").await;
        let view = insert_permission(&pool, "CanViewEvents").await;
        insert_permission(&pool, "CanManageEvents").await;
        link_user_role(&pool, &user, &viewer).await;
        link_role_permission(&pool, &viewer, &view).await;

        let err = engine.require(None, Policy::ViewEvents).await.unwrap_err();
        assert!(matches!(err, AuthzError::Unauthenticated));

        assert!(engine.require(Some(&user), Policy::ViewEvents).await.is_ok());

        let err = engine
            .require(Some(&user), Policy::ManageEvents)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AuthzError::Forbidden { capability } if capability == "CanManageEvents"
        ));
    }

    #[tokio::test]
    async fn test_capabilities_for_unions_roles() {
        let temp_dir = TempDir::new().unwrap();
        let pool = test_pool(&temp_dir).await;
        let engine = PolicyEngine::new(pool.clone());

        let user = insert_user(&pool, "alice").await;
        let viewer = insert_role(&pool, "Viewer").await;
        let editor = insert_role(&pool, "Editor").await;
        let view = insert_permission(&pool, "CanViewEvents").await;
        let manage = insert_permission(&pool, "CanManageEvents").await;

        link_user_role(&pool, &user, &viewer).await;
        link_user_role(&pool, &user, &editor).await;
        link_role_permission(&pool, &viewer, &view).await;
        // Both roles carry the view capability; the set must not duplicate it
        link_role_permission(&pool, &editor, &view).await;
        link_role_permission(&pool, &editor, &manage).await;

        let capabilities = engine.capabilities_for(&user).await.unwrap();
        assert_eq!(capabilities.len(), 2);
        assert!(capabilities.contains("CanViewEvents"));
        assert!(capabilities.contains("CanManageEvents"));
    }
}
