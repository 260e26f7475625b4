//! Axum router construction for the SCIMS API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use scims_core::ScimsStore;

use crate::handlers;
use crate::state::AppState;

/// Build the complete router over `state`.
///
/// See [`handlers`] for the endpoint table. CORS allows any origin; put a
/// gateway in front of the service to restrict it.
pub fn build_router<S: ScimsStore>(state: Arc<AppState<S>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        // Catalog
        .route("/api/items", post(handlers::put_item::<S>))
        .route(
            "/api/items/{id}",
            get(handlers::get_item::<S>).delete(handlers::delete_item::<S>),
        )
        .route("/api/locations", post(handlers::put_location::<S>))
        .route("/api/locations/{id}", get(handlers::get_location::<S>))
        .route("/api/me/locations", get(handlers::my_locations::<S>))
        .route(
            "/api/stock/{item_id}/{location_id}",
            get(handlers::get_stock::<S>),
        )
        .route("/api/stock/adjust", post(handlers::adjust_stock::<S>))
        .route("/api/blueprints", post(handlers::put_blueprint::<S>))
        .route("/api/blueprints/{id}", get(handlers::get_blueprint::<S>))
        .route(
            "/api/blueprints/{id}/resolve",
            get(handlers::resolve_blueprint::<S>),
        )
        .route(
            "/api/resource-sources",
            post(handlers::put_resource_source::<S>),
        )
        .route(
            "/api/resource-sources/{id}/verify",
            post(handlers::verify_resource_source::<S>),
        )
        // Crafts
        .route("/api/crafts", post(handlers::create_craft::<S>))
        .route("/api/crafts/{id}", get(handlers::get_craft::<S>))
        .route("/api/crafts/{id}/start", post(handlers::start_craft::<S>))
        .route(
            "/api/crafts/{id}/complete",
            post(handlers::complete_craft::<S>),
        )
        .route("/api/crafts/{id}/cancel", post(handlers::cancel_craft::<S>))
        .route("/api/crafts/{id}/gaps", get(handlers::craft_gaps::<S>))
        // Planning and stats
        .route("/api/suggestions", get(handlers::suggestions::<S>))
        .route("/api/stats", get(handlers::usage_stats::<S>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
