pub mod devices;
pub mod error;
pub mod medications;
pub mod middleware;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// All routes. Everything but `/health` needs a bearer token.
pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/medications",
            post(medications::create_medication).get(medications::list_medications),
        )
        .route("/medications/next", get(medications::next_medications))
        .route("/medications/search", get(medications::search_medications))
        .route(
            "/medications/{medication_id}",
            get(medications::get_medication).put(medications::update_medication),
        )
        .route("/devices", post(devices::register_device))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    Router::new().route("/health", get(health)).merge(protected)
}

async fn health() -> &'static str {
    "ok"
}
