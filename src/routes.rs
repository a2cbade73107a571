use axum::{
    routing::{get, post},
    Router,
};

use crate::billing;

pub fn api_routes() -> Router {
    Router::new()
        .route("/plans", get(billing::api::list_plans))
        .route("/pay", post(billing::api::initiate_payment))
        .route("/callback", post(billing::api::payment_callback))
        .route("/validate-user/:phone", get(billing::api::validate_user))
}
