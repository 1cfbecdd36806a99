use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, warn};

use crate::models::checkout::{FinalCheckoutRequest, InitialCheckoutRequest};
use crate::models::payment::ProjectView;
use crate::responses::JsonResponse;
use crate::services::checkout::CheckoutError;
use crate::services::reconcile::{ReconcileError, ResolvedBy};
use crate::state::AppState;

const CONTACT_SUPPORT: &str =
    "If you were charged, check your email for a confirmation or contact support with your project code.";

fn checkout_error_response(err: CheckoutError) -> Response {
    match err {
        CheckoutError::InvalidRequest(msg) => JsonResponse::bad_request(&msg).into_response(),
        CheckoutError::ProjectNotFound(_) => {
            JsonResponse::not_found("We could not find a project with that code.").into_response()
        }
        CheckoutError::NotPayable { .. } => {
            JsonResponse::conflict_with_code(&err.to_string(), "not_payable").into_response()
        }
        other => {
            error!(err = %other, "failed to create checkout session");
            JsonResponse::bad_gateway_with_code(
                "We could not start checkout right now. Please try again in a moment.",
                "checkout_unavailable",
            )
            .into_response()
        }
    }
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<InitialCheckoutRequest>,
) -> Response {
    match state.checkout().start_initial(payload).await {
        Ok(started) => (StatusCode::OK, Json(started)).into_response(),
        Err(err) => checkout_error_response(err),
    }
}

pub async fn create_final_checkout(
    State(state): State<AppState>,
    Json(payload): Json<FinalCheckoutRequest>,
) -> Response {
    match state.checkout().start_final(payload).await {
        Ok(started) => (StatusCode::OK, Json(started)).into_response(),
        Err(err) => checkout_error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub struct SuccessQuery {
    pub project_code: Option<String>,
    pub session_id: Option<String>,
}

pub async fn checkout_success(
    State(state): State<AppState>,
    Query(query): Query<SuccessQuery>,
) -> Response {
    let Some(session_id) = query
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    else {
        return JsonResponse::bad_request("Missing session_id").into_response();
    };

    match state
        .reconciler()
        .reconcile(query.project_code.as_deref(), session_id)
        .await
    {
        Ok(reconciled) => Json(json!({
            "success": true,
            "recovered": reconciled.resolved_by == ResolvedBy::Fallback,
            "project": ProjectView::from(&reconciled.record),
        }))
        .into_response(),
        Err(ReconcileError::NotPaid { .. }) => JsonResponse::unprocessable_with_code(
            "Your payment has not completed. No charge was recorded for this checkout.",
            "payment_not_completed",
        )
        .into_response(),
        Err(err) if err.is_transient() => {
            warn!(%err, session_id, "could not confirm payment on success page");
            JsonResponse::service_unavailable_with_code(
                &format!("We could not confirm your payment yet; it may still be processing. {CONTACT_SUPPORT}"),
                "payment_pending",
            )
            .into_response()
        }
        Err(err) => {
            error!(%err, session_id, "refusing to confirm payment from success page");
            JsonResponse::conflict_with_code(
                &format!("We could not verify this payment. {CONTACT_SUPPORT}"),
                "payment_unverified",
            )
            .into_response()
        }
    }
}
