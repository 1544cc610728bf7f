//! Session endpoints: login, logout, me, token status, refresh and the
//! self-service permission probe

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use tower_sessions::Session;
use tracing::{debug, info, warn};

use crate::{
    error::{ApiError, ApiErrorResponse, ApiResult},
    models::{
        LoginRequest, PermissionCheckResponse, PrincipalResponse, RoleDetailResponse,
        SuccessResponse, TokenStatusResponse,
    },
    AppState,
};
use user::{Credentials, IdentityAssertion, RequiredIdentity, SessionManager, TokenStatus};

impl AppState {
    /// Build the principal payload for an identity, re-reading role
    /// details from the authority graph
    async fn principal_response(
        &self,
        assertion: &IdentityAssertion,
    ) -> ApiResult<PrincipalResponse> {
        let role_details = self
            .user_manager
            .database()
            .roles_for(&assertion.principal_id)
            .await?;

        Ok(PrincipalResponse {
            principal_id: assertion.principal_id.clone(),
            username: assertion.username.clone(),
            email: assertion.email.clone(),
            roles: assertion.roles.clone(),
            role_details: role_details.into_iter().map(RoleDetailResponse::from).collect(),
        })
    }
}

/// Authenticate with username/password and issue a session
///
/// POST /api/v1/auth/login
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authentication successful", body = PrincipalResponse),
        (status = 401, description = "Invalid credentials", body = ApiErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<PrincipalResponse>> {
    debug!("Login attempt for username: {}", req.username);

    let credentials = Credentials::Password {
        username: req.username.clone(),
        password: req.password,
        ip_address: None,
    };

    let user = state
        .user_manager
        .auth_backend()
        .verify_credentials(credentials)
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("invalid credentials".to_string()))?;

    let roles = state.user_manager.database().role_names_for(&user.id).await?;

    let assertion = state
        .user_manager
        .session_manager()
        .issue(&session, &user, roles)
        .await?;

    info!("Session issued for principal: {}", user.id);

    Ok(Json(state.principal_response(&assertion).await?))
}

/// Invalidate the current session
///
/// POST /api/v1/auth/logout
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = SuccessResponse),
        (status = 401, description = "Not authenticated", body = ApiErrorResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    RequiredIdentity(identity): RequiredIdentity,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<SuccessResponse>> {
    SessionManager::destroy(&session).await?;

    state
        .user_manager
        .database()
        .audit_logger()
        .log_event(
            Some(&identity.principal_id),
            "logout",
            Some(identity.username.clone()),
            None,
            true,
        )
        .await?;

    info!("Principal {} logged out", identity.principal_id);

    Ok(Json(SuccessResponse {
        success: true,
        message: "Logged out successfully".to_string(),
    }))
}

/// Get the current principal
///
/// GET /api/v1/auth/me
#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current principal", body = PrincipalResponse),
        (status = 401, description = "Not authenticated", body = ApiErrorResponse)
    ),
    tag = "auth"
)]
pub async fn me(
    State(state): State<AppState>,
    RequiredIdentity(identity): RequiredIdentity,
) -> ApiResult<Json<PrincipalResponse>> {
    Ok(Json(state.principal_response(&identity).await?))
}

/// Introspect the current session without mutating it
///
/// GET /api/v1/auth/token/status
#[utoipa::path(
    get,
    path = "/api/v1/auth/token/status",
    responses(
        (status = 200, description = "Session state; is_authenticated=false when absent or expired", body = TokenStatusResponse)
    ),
    tag = "auth"
)]
pub async fn token_status(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<TokenStatusResponse>> {
    let status = state
        .user_manager
        .session_manager()
        .token_status(&session)
        .await?;

    Ok(Json(status.into()))
}

/// Re-issue the session with a fresh expiry
///
/// POST /api/v1/auth/token/refresh
#[utoipa::path(
    post,
    path = "/api/v1/auth/token/refresh",
    responses(
        (status = 200, description = "Session refreshed", body = TokenStatusResponse),
        (status = 401, description = "No live session to refresh", body = ApiErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> ApiResult<Json<TokenStatusResponse>> {
    let manager = state.user_manager.session_manager();

    let refreshed = manager
        .refresh(state.user_manager.database(), &session)
        .await
        .map_err(|e| match e {
            user::UserError::NotAuthenticated => {
                warn!("Refresh attempted without a live session");
                ApiError::Unauthenticated("not authenticated; log in again".to_string())
            }
            other => other.into(),
        })?;

    state
        .user_manager
        .database()
        .audit_logger()
        .log_event(
            Some(&refreshed.principal_id),
            "session_refreshed",
            Some(refreshed.username.clone()),
            None,
            true,
        )
        .await?;

    let status =
        TokenStatus::from_assertion(&refreshed, manager.config().expiring_soon_threshold());

    Ok(Json(status.into()))
}

/// Self-service capability probe: check any named capability without
/// attempting the protected action
///
/// GET /api/v1/auth/permissions/check/{capability}
#[utoipa::path(
    get,
    path = "/api/v1/auth/permissions/check/{capability}",
    params(
        ("capability" = String, Path, description = "Capability name, matched case-sensitively")
    ),
    responses(
        (status = 200, description = "Probe result", body = PermissionCheckResponse),
        (status = 401, description = "Not authenticated", body = ApiErrorResponse)
    ),
    tag = "auth"
)]
pub async fn check_permission(
    State(state): State<AppState>,
    RequiredIdentity(identity): RequiredIdentity,
    Path(capability): Path<String>,
) -> ApiResult<Json<PermissionCheckResponse>> {
    let decision = state
        .policy
        .check(&identity.principal_id, &capability)
        .await?;

    let has_access = decision.is_allow();

    debug!(
        "Permission probe: principal={}, capability={}, has_access={}",
        identity.principal_id, capability, has_access
    );

    Ok(Json(PermissionCheckResponse {
        has_access,
        message: if has_access {
            format!("Access granted for capability {}", capability)
        } else {
            format!("Access denied for capability {}", capability)
        },
        capability,
        principal_id: identity.principal_id,
        username: identity.username,
    }))
}
