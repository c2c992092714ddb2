use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod repo;
pub mod services;

use dto::MAX_UPLOAD_BYTES;

pub fn router() -> Router<AppState> {
    Router::new()
        // public
        .route("/register", post(handlers::register))
        .route("/login", post(handlers::login))
        // session
        .route(
            "/profile",
            get(handlers::get_profile)
                .put(handlers::update_profile)
                .delete(handlers::delete_profile),
        )
        // admin
        .route("/", get(handlers::list_users).post(handlers::create_admin))
        .route(
            "/:id",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        // headroom over the picture cap for the remaining form fields
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024))
}
