use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error, warn};

use crate::responses::JsonResponse;
use crate::state::AppState;

pub async fn webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let sig = match headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
    {
        Some(s) => s,
        None => return JsonResponse::bad_request("Missing Stripe-Signature").into_response(),
    };

    let evt = match app_state.stripe.verify_webhook(&body, sig) {
        Ok(e) => e,
        Err(err) => {
            warn!(?err, "stripe webhook verification failed");
            return JsonResponse::bad_request("invalid webhook").into_response();
        }
    };

    match app_state.webhooks().handle_event(&evt).await {
        Ok(outcome) => debug!(event_id = %evt.id, ?outcome, "stripe webhook processed"),
        // Store failures are the only case where redelivery can help.
        Err(err) if err.is_retryable() => {
            error!(event_id = %evt.id, %err, "stripe webhook failed, asking for redelivery");
            return JsonResponse::server_error("webhook processing failed").into_response();
        }
        Err(err) => err.log(),
    }

    Json(serde_json::json!({ "received": true })).into_response()
}
