//! Integration tests for the policy engine over the seeded authority
//! graph
//!
//! These exercise the wiring the handlers rely on: the user database
//! seeds roles, permissions and their links, and the policy engine
//! traverses them per check.

#[cfg(test)]
mod tests {
    use authz::{types::Policy, PolicyEngine};
    use tempfile::TempDir;
    use user::{AuditLogConfig, SessionConfig, UserDatabaseConfig, UserManager};

    async fn test_manager(temp_dir: &TempDir) -> UserManager {
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

        UserManager::new(config, SessionConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_viewer_capabilities_from_seeded_graph() {
        let temp_dir = TempDir::new().unwrap();
        let manager = test_manager(&temp_dir).await;
        let db = manager.database();
        let engine = PolicyEngine::new(db.pool().clone());

        let viewer = db
            .create_user("viewer", "viewer@example.com", "Viewer Only", "s3cret!")
            .await
            .unwrap();
        db.assign_role(&viewer.id, "Viewer").await.unwrap();

        // Viewer carries CanViewEvents but nothing administrative
        assert!(engine
            .check(&viewer.id, "CanViewEvents")
            .await
            .unwrap()
            .is_allow());
        assert!(!engine
            .check(&viewer.id, "CanManageUsers")
            .await
            .unwrap()
            .is_allow());
        assert!(engine
            .require(Some(&viewer.id), Policy::ViewEvents)
            .await
            .is_ok());
        assert!(engine
            .require(Some(&viewer.id), Policy::ManageEvents)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_admin_holds_every_seeded_capability() {
        let temp_dir = TempDir::new().unwrap();
        let manager = test_manager(&temp_dir).await;
        let db = manager.database();
        let engine = PolicyEngine::new(db.pool().clone());

        let admin = db
            .create_user("admin", "admin@example.com", "Admin", "s3cret!")
            .await
            .unwrap();
        db.assign_role(&admin.id, "Admin").await.unwrap();

        for policy in Policy::ALL {
            assert!(
                engine.require(Some(&admin.id), policy).await.is_ok(),
                "admin should hold {}",
                policy
            );
        }
    }

    #[tokio::test]
    async fn test_revocation_applies_without_new_session() {
        let temp_dir = TempDir::new().unwrap();
        let manager = test_manager(&temp_dir).await;
        let db = manager.database();
        let engine = PolicyEngine::new(db.pool().clone());

        let editor = db
            .create_user("editor", "editor@example.com", "Editor", "s3cret!")
            .await
            .unwrap();
        db.assign_role(&editor.id, "Editor").await.unwrap();

        assert!(engine
            .check(&editor.id, "CanManageEvents")
            .await
            .unwrap()
            .is_allow());

        db.revoke_permission("Editor", "CanManageEvents")
            .await
            .unwrap();

        // The very next check observes the revocation
        assert!(!engine
            .check(&editor.id, "CanManageEvents")
            .await
            .unwrap()
            .is_allow());

        // Re-granting restores access just as immediately
        db.grant_permission("Editor", "CanManageEvents")
            .await
            .unwrap();
        assert!(engine
            .check(&editor.id, "CanManageEvents")
            .await
            .unwrap()
            .is_allow());
    }
}
