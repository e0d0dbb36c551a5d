use crate::error::{GatewayError, GatewayResult};
use crate::state::GatewayState;
use auth_identity::{
    AuthorizedSubject, ConfirmationId, IdentityError, LoginResponse, NotificationOutcome, RoleSet,
    UserProfile,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RecoverRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetRequest {
    #[serde(rename = "confirmationID")]
    pub confirmation_id: ConfirmationId,
    pub secret: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub notification: NotificationOutcome,
}

#[derive(Debug, Serialize)]
pub struct CurrentUserResponse {
    pub user: UserProfile,
    pub roles: RoleSet,
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `POST /auth/signin`
pub async fn sign_in(
    State(state): State<GatewayState>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> GatewayResult<Json<LoginResponse>> {
    let Json(body) = payload?;
    let response = state
        .identity()
        .login(&body.email, &body.password)
        .await
        .map_err(GatewayError::sign_in)?;
    Ok(Json(response))
}

/// `POST /auth/password/recover`
///
/// Accepted once the reset token is stored, even if the link could not be
/// delivered; the outcome is reported in the body. An unknown email gets the
/// same answer as a delivered link so the endpoint does not reveal accounts.
pub async fn recover_password(
    State(state): State<GatewayState>,
    payload: Result<Json<RecoverRequest>, JsonRejection>,
) -> GatewayResult<(StatusCode, Json<NotificationResponse>)> {
    let Json(body) = payload?;
    let notification = match state.identity().request_password_reset(&body.email).await {
        Ok(requested) => requested.notification,
        Err(IdentityError::UserNotFound) => NotificationOutcome::Delivered,
        Err(other) => return Err(other.into()),
    };
    Ok((StatusCode::ACCEPTED, Json(NotificationResponse { notification })))
}

/// `POST /auth/password/reset`
pub async fn reset_password(
    State(state): State<GatewayState>,
    payload: Result<Json<ResetRequest>, JsonRejection>,
) -> GatewayResult<Json<NotificationResponse>> {
    let Json(body) = payload?;
    if body.password.is_empty() {
        return Err(GatewayError::BadRequest("password must not be empty".to_string()));
    }

    let completed = state
        .identity()
        .apply_password_reset(body.confirmation_id, &body.secret, &body.password)
        .await?;
    Ok(Json(NotificationResponse {
        notification: completed.notification,
    }))
}

/// Profile of the caller; mounted behind a [`crate::RouteGuard`].
pub async fn current_user(
    State(state): State<GatewayState>,
    Extension(subject): Extension<AuthorizedSubject>,
) -> GatewayResult<Json<CurrentUserResponse>> {
    let user = state.identity().get_user(subject.user_id()).await?;
    Ok(Json(CurrentUserResponse {
        user,
        roles: subject.roles,
    }))
}
