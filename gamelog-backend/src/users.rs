//! Operator account administration.

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::helpers::now;
use crate::validation;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_macros::debug_handler;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

#[derive(Deserialize)]
pub(crate) struct CreateUserRequest {
    username: String,
    password: String,
    display_name: String,
}

#[derive(Deserialize)]
pub(crate) struct SetPasswordRequest {
    new_password: String,
}

#[derive(Deserialize)]
pub(crate) struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

#[debug_handler]
pub(crate) async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_username(&payload.username)?;
    validation::validate_password(&payload.password)?;
    validation::validate_display_name(&payload.display_name)?;

    let identity = state
        .users
        .create(
            &payload.username,
            &payload.password,
            payload.display_name.trim(),
            now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(identity)))
}

pub(crate) async fn list_users(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let users = state.users.list();
    Json(json!({ "count": users.len(), "users": users }))
}

pub(crate) async fn set_password(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Json(payload): Json<SetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_password(&payload.new_password)?;
    state
        .users
        .update_password(&username, &payload.new_password)
        .await?;

    Ok(Json(json!({ "message": format!("password updated for {username}") })))
}

pub(crate) async fn deactivate_user(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.users.deactivate(&username).await.inspect_err(|e| {
        warn!(caller = %caller.identity.username, account = %username, error = %e, "deactivation refused");
    })?;

    Ok(Json(json!({ "message": format!("user {username} deactivated") })))
}

pub(crate) async fn current_user(Extension(caller): Extension<CurrentUser>) -> impl IntoResponse {
    Json(caller.identity)
}

pub(crate) async fn change_own_password(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let username = caller.identity.username;
    if !state
        .users
        .check_password(&username, &payload.current_password)
    {
        warn!(%username, "password change with wrong current password");
        return Err(AppError::Unauthorized);
    }
    validation::validate_password(&payload.new_password)?;

    state
        .users
        .update_password(&username, &payload.new_password)
        .await?;

    Ok(Json(json!({ "message": "password updated" })))
}
