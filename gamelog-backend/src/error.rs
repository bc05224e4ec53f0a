use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use gamelog_db::DbError;
use serde::Serialize;

use crate::directory::DirectoryError;

/// API error response structure
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
  pub error: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub details: Option<String>,
}

impl ErrorResponse {
  pub fn new(error: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: None,
    }
  }

  pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      details: Some(details.into()),
    }
  }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
  InvalidInput(String),
  /// Missing, expired or bad session, or bad credentials. Never says which.
  Unauthorized,
  Conflict(String),
  Forbidden(String),
  NotFound(String),
  StoreFailure(DbError),
}

impl IntoResponse for AppError {
  fn into_response(self) -> Response {
    let (status, body) = match self {
      AppError::InvalidInput(msg) => {
        tracing::warn!(validation_error = %msg, "Validation failed");
        (
          StatusCode::BAD_REQUEST,
          ErrorResponse::with_details("invalid input", msg),
        )
      }
      AppError::Unauthorized => (
        StatusCode::UNAUTHORIZED,
        ErrorResponse::new("invalid credentials"),
      ),
      AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorResponse::new(msg)),
      AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, ErrorResponse::new(msg)),
      AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::new(msg)),
      AppError::StoreFailure(db_err) => {
        // Don't expose internal database errors
        tracing::error!(?db_err, "Database error occurred");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          ErrorResponse::new("An internal error occurred. Please try again later."),
        )
      }
    };

    (status, Json(body)).into_response()
  }
}

impl From<DbError> for AppError {
  fn from(err: DbError) -> Self {
    match err {
      DbError::UserExists => AppError::Conflict(err.to_string()),
      DbError::UserNotFound => AppError::NotFound(err.to_string()),
      other => AppError::StoreFailure(other),
    }
  }
}

impl From<DirectoryError> for AppError {
  fn from(err: DirectoryError) -> Self {
    match err {
      DirectoryError::AlreadyExists(_) => AppError::Conflict(err.to_string()),
      DirectoryError::NotFound(_) => AppError::NotFound(err.to_string()),
      DirectoryError::Forbidden => AppError::Forbidden(err.to_string()),
      DirectoryError::Store(db_err) => AppError::from(db_err),
    }
  }
}

impl From<crate::validation::ValidationError> for AppError {
  fn from(err: crate::validation::ValidationError) -> Self {
    AppError::InvalidInput(err.to_string())
  }
}
