//! Per-route permission enforcement.
//!
//! Each protected route declares a [`RequiredPermissions`] constant and is
//! layered with a [`RouteGuard`]:
//!
//! ```ignore
//! get(handler).route_layer(middleware::from_fn_with_state(
//!     RouteGuard::new(state.clone(), DOCTOR),
//!     RouteGuard::enforce,
//! ))
//! ```
//!
//! On success the request carries the [`AuthorizedSubject`] as an extension.

use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;
use auth_identity::{AuthorizedSubject, IdentityError, RequiredPermissions};
use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

#[derive(Clone)]
pub struct RouteGuard {
    state: GatewayState,
    required: RequiredPermissions,
}

impl RouteGuard {
    pub fn new(state: GatewayState, required: RequiredPermissions) -> Self {
        Self { state, required }
    }

    /// Middleware body for `axum::middleware::from_fn_with_state`.
    pub async fn enforce(
        State(guard): State<RouteGuard>,
        mut request: Request,
        next: Next,
    ) -> GatewayResult<Response> {
        let Some(token) = extract_bearer(&request) else {
            debug!(path = %request.uri().path(), "No bearer token on protected route");
            return Err(GatewayError::MissingToken);
        };

        let subject = match guard.check(&token).await {
            Ok(subject) => subject,
            Err(err) => {
                warn!(
                    path = %request.uri().path(),
                    required = ?guard.required.as_slice(),
                    error = %err,
                    "Request rejected by route guard"
                );
                return Err(err);
            }
        };

        debug!(user_id = %subject.user_id(), "Route guard passed");
        request.extensions_mut().insert(subject);
        Ok(next.run(request).await)
    }

    async fn check(&self, token: &str) -> GatewayResult<AuthorizedSubject> {
        self.state
            .identity()
            .authorize(token, self.required.as_slice())
            .await
            .map_err(|err| match err {
                // A token for a deleted account is an invalid token at this edge.
                IdentityError::UserNotFound => GatewayError::Identity(IdentityError::InvalidToken),
                other => GatewayError::Identity(other),
            })
    }
}

fn extract_bearer(request: &Request<Body>) -> Option<String> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}
