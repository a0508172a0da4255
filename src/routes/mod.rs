use std::any::Any;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, OriginalUri},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, timeout::TimeoutLayer};

use crate::error::AppError;
use crate::handlers::{auth, reviews, tours, users};
use crate::middleware::auth::{auth_middleware, require_admin};
use crate::AppState;

/// Limit for JSON bodies.
const BODY_LIMIT: usize = 10 * 1024;
/// Limit for the profile photo upload.
const UPLOAD_LIMIT: usize = 5 * 1024 * 1024;

pub fn create_router(state: AppState) -> Router {
    let auth_layer = middleware::from_fn_with_state(state.clone(), auth_middleware);

    // Public tour routes
    let tour_routes = Router::new()
        .route("/", get(tours::list_tours))
        .route("/top-5-cheap", get(tours::top_cheap_tours))
        .route("/tour-stats", get(tours::tour_stats))
        .route("/monthly-plan/{year}", get(tours::monthly_plan))
        .route("/{id}", get(tours::get_tour))
        .route("/{id}/reviews", get(reviews::list_tour_reviews));

    // Catalogue management (requires auth + admin role)
    let tour_admin_routes = Router::new()
        .route("/", post(tours::create_tour))
        .route("/{id}", patch(tours::update_tour).delete(tours::delete_tour))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(auth_layer.clone());

    let tour_review_routes = Router::new()
        .route("/{id}/reviews", post(reviews::create_review))
        .route_layer(auth_layer.clone());

    let review_routes = Router::new()
        .route("/", get(reviews::list_reviews))
        .route("/{id}", get(reviews::get_review))
        .merge(
            Router::new()
                .route(
                    "/{id}",
                    patch(reviews::update_review).delete(reviews::delete_review),
                )
                .route_layer(auth_layer.clone()),
        );

    // Public account routes
    let auth_routes = Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/forgotPassword", post(auth::forgot_password))
        .route("/resetPassword/{token}", patch(auth::reset_password));

    let account_routes = Router::new()
        .route("/me", get(users::me))
        .route("/updatePassword", patch(auth::update_password))
        .route(
            "/updateMe",
            patch(users::update_me).layer(DefaultBodyLimit::max(UPLOAD_LIMIT)),
        )
        .route("/deleteMe", delete(users::delete_me))
        .route_layer(auth_layer.clone());

    // User management (requires auth + admin role)
    let admin_routes = Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route(
            "/{id}",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(auth_layer);

    let api_routes = Router::new()
        .nest(
            "/tours",
            tour_routes.merge(tour_admin_routes).merge(tour_review_routes),
        )
        .nest("/reviews", review_routes)
        .nest(
            "/users",
            auth_routes.merge(account_routes).merge(admin_routes),
        );

    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .nest("/api/v1", api_routes)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            timeout,
        ))
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

async fn not_found(OriginalUri(uri): OriginalUri) -> AppError {
    AppError::NotFound(format!("Can't find {} on this server!", uri))
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());

    AppError::Internal(format!("Handler panicked: {}", detail)).into_response()
}
