use axum::{
    extract::{FromRequestParts, Path, State},
    http::request::Parts,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    typed_header::TypedHeader,
};
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use tracing::{error, warn};

use crate::models::payment::{ProjectStatus, ProjectView};
use crate::responses::JsonResponse;
use crate::services::project_status::TransitionError;
use crate::state::AppState;

/// Proof that the request carried the configured admin bearer token.
pub struct AdminAuth;

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| JsonResponse::unauthorized("Missing bearer token").into_response())?;

        let expected = state.config.admin_api_token.as_bytes();
        if expected.is_empty() || !bool::from(bearer.token().as_bytes().ct_eq(expected)) {
            warn!("rejected admin request with invalid token");
            return Err(JsonResponse::unauthorized("Invalid admin token").into_response());
        }
        Ok(AdminAuth)
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

pub async fn update_project_status(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(project_code): Path<String>,
    Json(payload): Json<StatusUpdateRequest>,
) -> Response {
    let target = match payload.status.parse::<ProjectStatus>() {
        Ok(status) => status,
        Err(msg) => return JsonResponse::bad_request(&msg).into_response(),
    };

    match state
        .status_machine()
        .request_transition(&project_code, target)
        .await
    {
        Ok(result) => Json(json!({
            "success": true,
            "changed": result.changed,
            "project": ProjectView::from(&result.record),
        }))
        .into_response(),
        Err(TransitionError::NotFound(_)) => {
            JsonResponse::not_found("Project not found").into_response()
        }
        Err(err @ TransitionError::Conflict { .. }) => {
            JsonResponse::conflict_with_code(&err.to_string(), "stale_status").into_response()
        }
        Err(TransitionError::Database(err)) => {
            error!(?err, %project_code, "failed to update project status");
            JsonResponse::server_error("Something went wrong").into_response()
        }
        Err(err) => {
            JsonResponse::unprocessable_with_code(&err.to_string(), "invalid_transition")
                .into_response()
        }
    }
}

pub async fn email_quota(_admin: AdminAuth, State(state): State<AppState>) -> Response {
    match state.quota.status().await {
        Ok(status) => Json(status).into_response(),
        Err(err) => {
            error!(%err, "failed to read email quota");
            JsonResponse::server_error("Something went wrong").into_response()
        }
    }
}
