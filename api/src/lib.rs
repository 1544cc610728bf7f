use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{Expiry, SessionManagerLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error;
pub mod handlers;
pub mod middleware_hooks;
pub mod models;
pub mod server;

#[cfg(test)]
mod policy_tests;

// Re-export server functions for convenience
pub use server::{
    spawn_server, spawn_server_with_config, start_server, start_server_with_config, ApiConfig,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub user_manager: Arc<user::UserManager>,
    pub events: events::EventStore,
    pub policy: authz::PolicyEngine,
}

impl AppState {
    /// Wire the state from its components
    pub fn new(user_manager: Arc<user::UserManager>, events: events::EventStore) -> Self {
        let policy = authz::PolicyEngine::new(user_manager.database().pool().clone());
        Self {
            user_manager,
            events,
            policy,
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::me,
        handlers::auth::token_status,
        handlers::auth::refresh_token,
        handlers::auth::check_permission,
        handlers::events::create_event,
        handlers::events::list_events,
        handlers::events::get_event,
        handlers::events::bulk_complete,
        handlers::events::bulk_postpone,
        handlers::events::bulk_follow_up,
        handlers::events::bulk_reject,
        handlers::audit::verify_audit_chain,
        handlers::health::health_check,
    ),
    components(
        schemas(
            models::LoginRequest,
            models::PrincipalResponse,
            models::RoleDetailResponse,
            models::TokenStatusResponse,
            models::PermissionCheckResponse,
            models::CreateEventRequest,
            models::EventResponse,
            models::EventListResponse,
            models::BulkEventRequest,
            models::BulkEventResponse,
            models::BulkFailureResponse,
            models::SuccessResponse,
            models::HealthResponse,
            error::ApiErrorResponse,
        )
    ),
    tags(
        (name = "auth", description = "Session lifecycle and permission probes"),
        (name = "events", description = "Event operations, single and bulk"),
        (name = "audit", description = "Audit log verification"),
        (name = "health", description = "Health check endpoints"),
    ),
    info(
        title = "Cadence API",
        version = "1.0.0",
        description = "Event management backend with dynamic RBAC and session refresh",
    ),
)]
pub struct ApiDoc;

/// Create the main API router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let session_config = state.user_manager.session_config();

    // Cookie-level sliding expiry; the assertion's own expires_at only
    // moves on explicit refresh
    let session_layer =
        SessionManagerLayer::new(state.user_manager.session_store().inner().clone())
            .with_name(session_config.cookie_name.clone())
            .with_secure(session_config.secure)
            .with_http_only(session_config.http_only)
            .with_same_site(session_config.same_site.into())
            .with_expiry(Expiry::OnInactivity(time::Duration::seconds(
                session_config.lifetime_seconds,
            )));

    // API v1 routes
    let api_v1 = Router::new()
        // Session endpoints
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/token/status", get(handlers::auth::token_status))
        .route("/auth/token/refresh", post(handlers::auth::refresh_token))
        .route(
            "/auth/permissions/check/:capability",
            get(handlers::auth::check_permission),
        )
        // Event endpoints
        .route(
            "/events",
            post(handlers::events::create_event).get(handlers::events::list_events),
        )
        .route("/events/:id", get(handlers::events::get_event))
        .route(
            "/events/bulk/complete",
            post(handlers::events::bulk_complete),
        )
        .route(
            "/events/bulk/postpone",
            post(handlers::events::bulk_postpone),
        )
        .route(
            "/events/bulk/follow-up",
            post(handlers::events::bulk_follow_up),
        )
        .route("/events/bulk/reject", post(handlers::events::bulk_reject))
        // Audit log verification
        .route("/audit/verify", get(handlers::audit::verify_audit_chain))
        // Health check
        .route("/health", get(handlers::health::health_check))
        // Apply middleware to all API routes
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_hooks::authorization_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_hooks::request_middleware,
        ));

    // Main router
    Router::new()
        .nest("/api/v1", api_v1)
        .merge(SwaggerUi::new("/api/v1/swagger").url("/api/v1/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(session_layer),
        )
        .with_state(state)
}
