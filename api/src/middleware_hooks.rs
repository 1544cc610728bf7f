//! Request middleware: policy enforcement and correlation ids

use authz::{error::AuthzError, types::Policy};
use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tower_sessions::Session;
use tracing::{debug, info, warn};
use user::SessionManager;

use crate::AppState;

/// Authorization middleware over the typed policy set
///
/// The principal is resolved from the session, the route is mapped to
/// its [`Policy`], and the permission resolver walks the authority graph
/// for the decision. Routes with no mapped policy pass through; their
/// handlers still enforce authentication via extractors where required.
///
/// Unauthenticated requests answer 401, failed checks answer 403, and
/// resolver errors fail closed as 403.
pub async fn authorization_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let Some(policy) = route_policy(&method, &path) else {
        return Ok(next.run(request).await);
    };

    let assertion = match request.extensions().get::<Session>() {
        Some(session) => SessionManager::current(session)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?,
        None => None,
    };

    let principal_id = assertion.as_ref().map(|a| a.principal_id.as_str());

    match state.policy.require(principal_id, policy).await {
        Ok(()) => {
            debug!(
                "Access allowed: principal={:?}, policy={}, path={}",
                principal_id, policy, path
            );
            Ok(next.run(request).await)
        }
        Err(AuthzError::Unauthenticated) => {
            debug!("Unauthenticated request to protected path: {}", path);
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(AuthzError::Forbidden { capability }) => {
            warn!(
                "Access denied: principal={:?}, capability={}, path={}",
                principal_id, capability, path
            );

            if let Err(e) = state
                .user_manager
                .database()
                .audit_logger()
                .log_event(principal_id, "access_denied", Some(capability), None, false)
                .await
            {
                warn!("Failed to audit access denial: {}", e);
            }

            Err(StatusCode::FORBIDDEN)
        }
        Err(e) => {
            // Fail closed on resolver errors
            warn!("Authorization error for path {}: {}", path, e);
            Err(StatusCode::FORBIDDEN)
        }
    }
}

/// Map a route to the policy that gates it.
///
/// The policy set is fixed at startup; what each policy's capability
/// grants is decided by the authority graph rows at check time.
pub fn route_policy(method: &Method, path: &str) -> Option<Policy> {
    if path.starts_with("/api/v1/events") {
        return Some(match *method {
            Method::GET | Method::HEAD => Policy::ViewEvents,
            _ => Policy::ManageEvents,
        });
    }

    if path.starts_with("/api/v1/audit") {
        return Some(Policy::ViewAuditLog);
    }

    // Session endpoints and health carry their own authentication
    // requirements in the handlers
    None
}

/// Request processing middleware
///
/// Injects a correlation id, echoes it on the response and logs timing.
pub async fn request_middleware(
    State(_state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let correlation_id = ulid::Ulid::new().to_string();
    request.extensions_mut().insert(CorrelationId(correlation_id.clone()));

    info!(
        correlation_id = %correlation_id,
        "Processing {} request to {}",
        method, uri
    );

    let mut response = next.run(request).await;

    if let Ok(value) = correlation_id.parse() {
        response.headers_mut().insert("x-correlation-id", value);
    }

    let duration = start.elapsed();
    debug!(
        correlation_id = %correlation_id,
        "Request processed in {:?}",
        duration
    );

    Ok(response)
}

/// Correlation id carried through request extensions
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);
