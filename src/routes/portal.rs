use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use tracing::error;

use crate::models::payment::ProjectView;
use crate::responses::JsonResponse;
use crate::state::AppState;

/// The access token is the credential; no session is involved.
pub async fn get_project(
    State(state): State<AppState>,
    Path(access_token): Path<String>,
) -> Response {
    let token = access_token.trim();
    if token.is_empty() {
        return JsonResponse::not_found("Project not found").into_response();
    }

    match state.payments.find_by_access_token(token).await {
        Ok(Some(record)) => Json(ProjectView::from(&record)).into_response(),
        Ok(None) => JsonResponse::not_found("Project not found").into_response(),
        Err(err) => {
            error!(?err, "failed to load project for portal");
            JsonResponse::server_error("Something went wrong").into_response()
        }
    }
}
