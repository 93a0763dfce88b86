//! HTTP server and routes.

mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let book_routes = Router::new()
        .route("/", get(handlers::list_books))
        .route("/", post(handlers::create_book))
        .route("/{id}", get(handlers::get_book))
        .route("/{id}", put(handlers::update_book))
        .route("/{id}", delete(handlers::delete_book))
        .route("/{id}/purchase", post(handlers::purchase_book))
        .route("/{id}/rent", post(handlers::rent_book))
        .route("/{id}/read", get(handlers::read_book));

    let auth_routes = Router::new()
        .route("/login", post(handlers::auth_login))
        .route("/register", post(handlers::auth_register))
        .route("/logout", post(handlers::auth_logout))
        .route("/profile", get(handlers::auth_profile));

    let user_routes = Router::new()
        .route("/books", get(handlers::user_books))
        .route("/notifications", get(handlers::user_notifications))
        .route(
            "/notifications/{id}/read",
            put(handlers::mark_notification_read),
        )
        .route("/notifications/unread", get(handlers::unread_notifications));

    let admin_routes = Router::new().route("/check-rentals", post(handlers::check_rentals));

    Router::new()
        .route("/", get(handlers::index))
        .nest("/api/books", book_routes)
        .nest("/api/auth", auth_routes)
        .nest("/api/users", user_routes)
        .nest("/api/admin", admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
