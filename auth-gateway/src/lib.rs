//! HTTP boundary for the clinic identity service.
//!
//! Exposes sign-in and password recovery, and a [`RouteGuard`] that enforces
//! the permission set each protected route declares.

pub mod error;
pub mod guard;
pub mod handlers;
pub mod state;

pub use error::{GatewayError, GatewayResult};
pub use guard::RouteGuard;
pub use state::GatewayState;

use auth_identity::RequiredPermissions;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

/// Doctor-facing routes.
pub const DOCTOR: RequiredPermissions = RequiredPermissions::new(&["doctor"]);
/// Patient-facing routes.
pub const PATIENT: RequiredPermissions = RequiredPermissions::new(&["patient"]);

/// Build the application router.
pub fn router(state: GatewayState) -> Router {
    let guard = |required| {
        middleware::from_fn_with_state(RouteGuard::new(state.clone(), required), RouteGuard::enforce)
    };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/auth/signin", post(handlers::sign_in))
        .route("/auth/password/recover", post(handlers::recover_password))
        .route("/auth/password/reset", post(handlers::reset_password))
        .route(
            "/doctors/me",
            get(handlers::current_user).route_layer(guard(DOCTOR)),
        )
        .route(
            "/patients/me",
            get(handlers::current_user).route_layer(guard(PATIENT)),
        )
        .with_state(state)
}
