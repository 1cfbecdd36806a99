pub mod admin;
pub mod checkout;
pub mod portal;
pub mod stripe;


use axum::{
    routing::{get, post, put},
    Router,
};

use crate::state::AppState;

/// Every API route, without the transport layers `main` adds on top.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/checkout", post(checkout::create_checkout))
        .route("/api/checkout/final", post(checkout::create_final_checkout))
        .route("/api/checkout/success", get(checkout::checkout_success))
        .route("/api/stripe/webhook", post(stripe::webhook))
        .route(
            "/api/admin/projects/{project_code}/status",
            put(admin::update_project_status),
        )
        .route("/api/admin/email-quota", get(admin::email_quota))
        .route("/api/portal/{access_token}", get(portal::get_project))
        .with_state(state)
}
