use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;
use crate::middleware::request_id::{make_span_with_request_id, request_id_middleware};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Owners
        .route("/members", post(handlers::create_member))
        .route("/movies", post(handlers::create_movie))
        // Reviews
        .route("/reviews", post(handlers::create_review))
        .route("/reviews/:id", get(handlers::get_review))
        .route("/reviews/:id", put(handlers::edit_review))
        .route("/reviews/:id", delete(handlers::delete_review))
        // Likes
        .route("/movies/:id/likes", post(handlers::like_movie))
        .route("/movies/:id/likes/:member_id", delete(handlers::unlike_movie))
        // Profiles
        .route("/members/:id/profile", get(handlers::get_member_profile))
        .route("/movies/:id/profile", get(handlers::get_movie_profile))
        .route("/profiles/:kind/:id/recompute", post(handlers::recompute_profile))
        .route("/admin/profiles/rebuild", post(handlers::rebuild_profiles))
        // Recommendations
        .route("/recommendations", post(handlers::recommend))
        .route(
            "/members/:id/recommendations",
            get(handlers::recommend_for_member),
        )
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
        .with_state(state)
}
