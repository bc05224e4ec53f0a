/// Input validation functions for all backend routes
use thiserror::Error;

use crate::online::BucketWidth;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 50;
pub const PASSWORD_MIN: usize = 6;
pub const DISPLAY_NAME_MAX: usize = 100;
pub const ROLE_ID_MAX: usize = 64;
pub const PLAYER_NAME_MAX: usize = 64;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Username must be 3-50 characters (got {0})")]
    UsernameLength(usize),

    #[error("Username contains invalid characters (only alphanumeric and underscore allowed)")]
    UsernameInvalidChars,

    #[error("Password must be at least 6 characters")]
    PasswordTooShort,

    #[error("Display name must be 1-100 characters (got {0})")]
    DisplayNameLength(usize),

    #[error("Role id cannot be empty")]
    RoleIdEmpty,

    #[error("Role id too long (max 64 characters, got {0})")]
    RoleIdTooLong(usize),

    #[error("Player name too long (max 64 characters, got {0})")]
    PlayerNameTooLong(usize),

    #[error("Game server id must be positive (got {0})")]
    ServerIdInvalid(i64),

    #[error("Server filter must be a server id, 0 or empty (got '{0}')")]
    ServerFilterInvalid(String),

    #[error("{field} cannot be negative (got {value})")]
    Negative { field: &'static str, value: i64 },

    #[error("Payment amount must be positive (got {0})")]
    AmountNotPositive(i64),

    #[error("new_player must be 0 or 1 (got {0})")]
    NewPlayerFlag(i64),

    #[error("Bucket width must be a positive number of minutes dividing a day (got '{0}')")]
    BucketWidthInvalid(String),
}

/// Validates an operator username
///
/// Rules:
/// - 3 to 50 characters
/// - Only alphanumeric characters and underscores
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(ValidationError::UsernameLength(len));
    }

    if !username.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(ValidationError::UsernameInvalidChars);
    }

    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < PASSWORD_MIN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

/// Validates a display name (1 to 100 characters, not only whitespace)
pub fn validate_display_name(display_name: &str) -> Result<(), ValidationError> {
    let len = display_name.trim().chars().count();
    if len == 0 || display_name.chars().count() > DISPLAY_NAME_MAX {
        return Err(ValidationError::DisplayNameLength(display_name.chars().count()));
    }
    Ok(())
}

/// Validates the identity part of a player or payment report
///
/// Rules:
/// - Role id is non-empty and at most 64 characters
/// - Name is at most 64 characters
/// - Server id is positive, level is not negative
pub fn validate_player_report(
    role_id: &str,
    name: &str,
    level: i64,
    server_id: i64,
) -> Result<(), ValidationError> {
    if role_id.is_empty() {
        return Err(ValidationError::RoleIdEmpty);
    }
    if role_id.chars().count() > ROLE_ID_MAX {
        return Err(ValidationError::RoleIdTooLong(role_id.chars().count()));
    }
    if name.chars().count() > PLAYER_NAME_MAX {
        return Err(ValidationError::PlayerNameTooLong(name.chars().count()));
    }
    validate_server_id(server_id)?;
    validate_non_negative("level", level)
}

pub fn validate_server_id(server_id: i64) -> Result<(), ValidationError> {
    if server_id <= 0 {
        return Err(ValidationError::ServerIdInvalid(server_id));
    }
    Ok(())
}

pub fn validate_non_negative(field: &'static str, value: i64) -> Result<(), ValidationError> {
    if value < 0 {
        return Err(ValidationError::Negative { field, value });
    }
    Ok(())
}

pub fn validate_amount(amount: i64) -> Result<(), ValidationError> {
    if amount <= 0 {
        return Err(ValidationError::AmountNotPositive(amount));
    }
    Ok(())
}

/// Accepts the wire encoding of the novelty flag (0 or 1)
pub fn parse_new_player_flag(flag: i64) -> Result<bool, ValidationError> {
    match flag {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ValidationError::NewPlayerFlag(other)),
    }
}

/// Parses the `server` query parameter.
///
/// Missing, empty or `0` means every server.
pub fn parse_server_filter(raw: Option<&str>) -> Result<Option<i64>, ValidationError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<i64>() {
        Ok(0) => Ok(None),
        Ok(id) if id > 0 => Ok(Some(id)),
        _ => Err(ValidationError::ServerFilterInvalid(raw.to_string())),
    }
}

/// Parses the `width` query parameter, falling back to `default` when absent.
pub fn parse_bucket_width(
    raw: Option<&str>,
    default: BucketWidth,
) -> Result<BucketWidth, ValidationError> {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Ok(default);
    }
    raw.parse::<u32>()
        .ok()
        .and_then(BucketWidth::new)
        .ok_or_else(|| ValidationError::BucketWidthInvalid(raw.to_string()))
}
