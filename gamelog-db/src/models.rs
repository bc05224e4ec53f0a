use crate::DateBucket;

/// One online-count report from a game server. Append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlineSample {
  pub server_id: i64,
  pub count: i64,
  /// Unix timestamp (seconds, UTC) when the report arrived
  pub observed_at: i64,
}

/// First-seen-today record of a player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRecord {
  /// In-game role id (natural key)
  pub role_id: String,
  pub name: String,
  pub level: i64,
  pub server_id: i64,
  /// Frozen at creation for the rest of the day
  pub is_new_player: bool,
  /// Day the record was created for
  pub date: DateBucket,
}

/// A single payment report. Append-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
  pub role_id: String,
  pub name: String,
  pub level: i64,
  pub server_id: i64,
  pub amount: i64,
  pub vip_level: i64,
  /// Unix timestamp (seconds, UTC) when the payment was reported
  pub observed_at: i64,
}

/// Paying players and revenue for a day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaymentStats {
  pub paying_player_count: u64,
  pub total_payment: i64,
}

/// An operator account for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
  pub username: String,
  /// Hex-encoded one-way hash of the password
  pub password_hash: String,
  pub display_name: String,
  /// Soft-delete flag; inactive accounts are never physically removed
  pub is_active: bool,
  /// Unix timestamp of the last successful login
  pub last_login: Option<i64>,
  pub created_at: i64,
}
