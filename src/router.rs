use std::sync::Arc;

use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let auth = Router::new()
        .route("/signup", post(handlers::auth::signup))
        .route("/login", post(handlers::auth::login))
        .route("/me", get(handlers::auth::me));

    let providers = Router::new()
        .route("/", get(handlers::providers::list_providers))
        .route(
            "/:id",
            get(handlers::providers::get_provider).put(handlers::providers::update_profile),
        )
        .route("/:id/status", patch(handlers::providers::set_status))
        .route(
            "/:id/availability",
            put(handlers::providers::set_availability),
        )
        .route(
            "/:id/reviews",
            get(handlers::providers::list_reviews).post(handlers::providers::add_review),
        );

    // Static segments win over `/:id`, so `/client` and `/provider` are safe.
    let bookings = Router::new()
        .route("/", post(handlers::bookings::create_booking))
        .route("/client", get(handlers::bookings::client_bookings))
        .route("/provider", get(handlers::bookings::provider_bookings))
        .route(
            "/provider/requests",
            get(handlers::bookings::pending_requests),
        )
        .route("/provider/stats", get(handlers::bookings::provider_stats))
        .route("/:id", get(handlers::bookings::get_booking))
        .route("/:id/accept", put(handlers::bookings::accept_booking))
        .route("/:id/reject", put(handlers::bookings::reject_booking))
        .route("/:id/complete", put(handlers::bookings::complete_booking))
        .route("/:id/cancel", put(handlers::bookings::cancel_booking));

    Router::new()
        .route("/health", get(handlers::health::health))
        .nest("/api/auth", auth)
        .nest("/api/providers", providers)
        .nest("/api/bookings", bookings)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
