// libs/availability-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn availability_routes(state: Arc<AppConfig>) -> Router {
    // Template management and slot generation require an authenticated doctor
    let protected_routes = Router::new()
        .route("/templates", post(handlers::create_template))
        .route("/templates", get(handlers::list_my_templates))
        .route("/templates/{template_id}", patch(handlers::update_template))
        .route("/templates/{template_id}", delete(handlers::delete_template))
        .route("/slots/generate", post(handlers::generate_slots))
        .route("/slots/cleanup", post(handlers::cleanup_slots))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Slot browsing is public so patients can pick a slot before booking
    let public_routes = Router::new().route(
        "/doctors/{doctor_id}/slots",
        get(handlers::list_doctor_slots),
    );

    Router::new()
        .merge(protected_routes)
        .merge(public_routes)
        .with_state(state)
}
