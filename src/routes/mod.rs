use axum::{
    middleware,
    routing::{delete, get, patch, post, put},
    Router,
};

use crate::handlers::{auth, bookings, profile, provider, reviews, services};
use crate::middleware::auth::{auth_middleware, require_provider};
use crate::middleware::rate_limit::create_public_governor;
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // IP-based governor for unauthenticated routes
    let public_governor = create_public_governor();

    // Public auth routes
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(public_governor.clone());

    // Token introspection (requires auth)
    let me_routes = Router::new()
        .route("/me", get(auth::me))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Public browse routes (service catalogue, provider pages, reviews)
    let public_routes = Router::new()
        .route("/services", get(services::list_services))
        .route("/services/{id}", get(services::get_service))
        .route("/providers/{id}", get(provider::public_profile))
        .route("/reviews", get(reviews::list_reviews))
        .route("/reviews/{id}", get(reviews::get_review))
        .layer(public_governor);

    // Service creation requires the provider role; updates and deletes
    // check ownership (or admin) in the handler
    let service_create_routes = Router::new()
        .route("/services", post(services::create_service))
        .layer(middleware::from_fn(require_provider))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let service_manage_routes = Router::new()
        .route("/services/{id}", put(services::update_service))
        .route("/services/{id}", delete(services::delete_service))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Review writes (authorship checks live in the handlers)
    let review_write_routes = Router::new()
        .route("/reviews", post(reviews::create_review))
        .route("/reviews/{id}", delete(reviews::delete_review))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Booking routes (any authenticated account may reserve)
    let booking_routes = Router::new()
        .route("/", post(bookings::create_booking))
        .route("/", get(bookings::list_bookings))
        .route("/{id}", get(bookings::get_booking))
        .route("/{id}", patch(bookings::update_booking))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Provider console (requires auth + provider role)
    let provider_routes = Router::new()
        .route("/profile", get(provider::get_profile))
        .route("/profile", put(provider::update_profile))
        .route("/stats", get(provider::stats))
        .route("/notifications", get(provider::notifications))
        .route("/notifications/{id}", patch(provider::ack_notification))
        .route("/notifications/{id}", delete(provider::dismiss_notification))
        .layer(middleware::from_fn(require_provider))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Account profile
    let user_routes = Router::new()
        .route("/profile", get(profile::get_profile))
        .route("/profile", put(profile::update_profile))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Combine all routes
    Router::new()
        .nest("/api/auth", auth_routes.merge(me_routes))
        .nest(
            "/api",
            public_routes
                .merge(service_create_routes)
                .merge(service_manage_routes)
                .merge(review_write_routes),
        )
        .nest("/api/bookings", booking_routes)
        .nest("/api/provider", provider_routes)
        .nest("/api/user", user_routes)
        .with_state(state)
}
