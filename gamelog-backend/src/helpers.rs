use crate::session::SessionToken;
use chrono::DateTime;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// 128 random bits, hex-encoded.
pub fn generate_session_token() -> SessionToken {
  let bytes: [u8; 16] = rand::random();
  // 16 bytes always encode to exactly 32 hex chars
  SessionToken::from(&hex::encode(bytes)).unwrap_or_default()
}

pub fn hash_password(password: &str) -> String {
  format!("{:x}", Sha256::digest(password.as_bytes()))
}

pub fn now() -> i64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .map(|d| d.as_secs() as i64)
    .unwrap_or_default()
}

/// `YYYY-MM-DD HH:MM:SS` in UTC.
pub fn format_timestamp(ts: i64) -> String {
  DateTime::from_timestamp(ts, 0)
    .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
    .unwrap_or_default()
}
