use axum::{extract::State, response::Json};
use tracing::info;

use crate::{
    error::{ApiErrorResponse, ApiResult},
    models::SuccessResponse,
    AppState,
};

/// Verify the audit log hash chain
///
/// GET /api/v1/audit/verify
#[utoipa::path(
    get,
    path = "/api/v1/audit/verify",
    responses(
        (status = 200, description = "Chain verification result", body = SuccessResponse),
        (status = 401, description = "Not authenticated", body = ApiErrorResponse),
        (status = 403, description = "Missing capability", body = ApiErrorResponse)
    ),
    tag = "audit"
)]
pub async fn verify_audit_chain(
    State(state): State<AppState>,
) -> ApiResult<Json<SuccessResponse>> {
    let valid = state
        .user_manager
        .database()
        .audit_logger()
        .verify_log_chain()
        .await?;

    info!("Audit chain verification requested: valid={}", valid);

    Ok(Json(SuccessResponse {
        success: valid,
        message: if valid {
            "Audit log chain verified".to_string()
        } else {
            "Audit log chain verification failed".to_string()
        },
    }))
}
