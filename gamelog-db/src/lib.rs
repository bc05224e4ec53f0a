mod date;
mod error;
mod models;

pub use date::DateBucket;
pub use error::{DbError, Result};
pub use models::{OnlineSample, PaymentEvent, PaymentStats, PlayerRecord, UserAccount};

use std::path::Path;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::{self, OptionalExtension, Row, params};
use tracing::{debug, info};

/// Durable record store for all telemetry and operator accounts.
#[derive(Clone)]
pub struct Database {
  conn: Connection,
}

impl Database {
  /// Open or create a database at the given path.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path).await.map_err(DbError::Sqlite)?;
    let db = Self { conn };
    db.initialize().await?;
    Ok(db)
  }

  /// Create an in-memory database (useful for testing).
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .await
      .map_err(DbError::Sqlite)?;
    let db = Self { conn };
    db.initialize().await?;
    Ok(db)
  }

  /// Initialize the database schema. Safe to run on every startup.
  async fn initialize(&self) -> Result<()> {
    self.conn
            .call(|conn| {
                conn.pragma_update(None, "journal_mode", "WAL")?;

                conn.execute_batch(
                    r#"
                    -- Raw online-count reports, one row per report
                    CREATE TABLE IF NOT EXISTS online_num (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        gamesvr_id INTEGER NOT NULL,
                        online_num INTEGER NOT NULL,
                        date_int INTEGER NOT NULL,
                        created_at INTEGER NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_online_num_date_gamesvr ON online_num(date_int, gamesvr_id);

                    -- First login of a role on a given day
                    CREATE TABLE IF NOT EXISTS player (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        roleid TEXT NOT NULL,
                        name TEXT NOT NULL,
                        level INTEGER NOT NULL,
                        gamesvr INTEGER NOT NULL,
                        new_player INTEGER NOT NULL DEFAULT 1,
                        date_int INTEGER NOT NULL,
                        created_at INTEGER NOT NULL,
                        UNIQUE(roleid, date_int)
                    );
                    CREATE INDEX IF NOT EXISTS idx_player_date_gamesvr ON player(date_int, gamesvr);

                    -- Payment reports
                    CREATE TABLE IF NOT EXISTS pay_report (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        roleid TEXT NOT NULL,
                        name TEXT NOT NULL,
                        level INTEGER NOT NULL,
                        gamesvr INTEGER NOT NULL,
                        money INTEGER NOT NULL,
                        vip_level INTEGER NOT NULL DEFAULT 0,
                        date_int INTEGER NOT NULL,
                        created_at INTEGER NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_pay_report_date_gamesvr ON pay_report(date_int, gamesvr);
                    CREATE INDEX IF NOT EXISTS idx_pay_report_created_at ON pay_report(created_at);

                    -- Dashboard operator accounts
                    CREATE TABLE IF NOT EXISTS log_users (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        username TEXT NOT NULL UNIQUE,
                        password TEXT NOT NULL,
                        display_name TEXT NOT NULL,
                        is_active INTEGER NOT NULL DEFAULT 1,
                        last_login INTEGER,
                        created_at INTEGER NOT NULL
                    );
                    "#,
                )?;
                Ok(())
            })
            .await?;

    info!("database initialized");
    Ok(())
  }

  // ========================================================================
  // Online samples
  // ========================================================================

  /// Append one online-count sample. Returns the generated row id.
  pub async fn insert_online_sample(&self, server_id: i64, count: i64, now: i64) -> Result<i64> {
    let date = DateBucket::of_timestamp(now).as_int();
    let id = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(
            "INSERT INTO online_num (gamesvr_id, online_num, date_int, created_at) VALUES (?1, ?2, ?3, ?4)",
          )?
          .execute(params![server_id, count, date, now])?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    debug!(server_id, count, "stored online sample");
    Ok(id)
  }

  /// All samples for a day, optionally filtered to one server, oldest first.
  pub async fn online_samples(
    &self,
    date: DateBucket,
    server_id: Option<i64>,
  ) -> Result<Vec<OnlineSample>> {
    let date = date.as_int();
    let samples = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          r#"
                    SELECT gamesvr_id, online_num, created_at
                    FROM online_num
                    WHERE date_int = ?1 AND (?2 IS NULL OR gamesvr_id = ?2)
                    ORDER BY created_at ASC, id ASC
                    "#,
        )?;

        let samples = stmt
          .query_map(params![date, server_id], |row| {
            Ok(OnlineSample {
              server_id: row.get(0)?,
              count: row.get(1)?,
              observed_at: row.get(2)?,
            })
          })?
          .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(samples)
      })
      .await?;

    Ok(samples)
  }

  // ========================================================================
  // Players
  // ========================================================================

  /// Insert the first record of a role for its day.
  ///
  /// At most one row exists per (role, day). When the row is already there
  /// it is returned untouched and the flag is `false`.
  pub async fn insert_player_if_absent(
    &self,
    record: PlayerRecord,
    now: i64,
  ) -> Result<(PlayerRecord, bool)> {
    let result = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let inserted = tx
          .prepare_cached(
            r#"
                    INSERT INTO player (roleid, name, level, gamesvr, new_player, date_int, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(roleid, date_int) DO NOTHING
                    "#,
          )?
          .execute(params![
            &record.role_id,
            &record.name,
            record.level,
            record.server_id,
            record.is_new_player,
            record.date.as_int(),
            now
          ])?;

        let stored = tx
          .prepare_cached(
            "SELECT roleid, name, level, gamesvr, new_player, date_int FROM player WHERE roleid = ?1 AND date_int = ?2",
          )?
          .query_row(params![&record.role_id, record.date.as_int()], player_from_row)?;

        tx.commit()?;
        Ok((stored, inserted > 0))
      })
      .await?;

    debug!(role_id = %result.0.role_id, created = result.1, "stored player");
    Ok(result)
  }

  /// Fetch the stored record of a role for a day.
  pub async fn get_player(&self, role_id: String, date: DateBucket) -> Result<Option<PlayerRecord>> {
    let date = date.as_int();
    let player = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(
            "SELECT roleid, name, level, gamesvr, new_player, date_int FROM player WHERE roleid = ?1 AND date_int = ?2",
          )?
          .query_row(params![&role_id, date], player_from_row)
          .optional()
      })
      .await?;

    Ok(player)
  }

  /// Distinct roles that logged in on a day.
  pub async fn count_active_players(&self, date: DateBucket, server_id: Option<i64>) -> Result<u64> {
    let date = date.as_int();
    let count = self
      .conn
      .call(move |conn| {
        let count: i64 = conn
          .prepare_cached(
            "SELECT COUNT(DISTINCT roleid) FROM player WHERE date_int = ?1 AND (?2 IS NULL OR gamesvr = ?2)",
          )?
          .query_row(params![date, server_id], |row| row.get(0))?;
        Ok(count)
      })
      .await?;

    Ok(count as u64)
  }

  /// Roles first flagged as new players on a day.
  pub async fn count_new_players(&self, date: DateBucket, server_id: Option<i64>) -> Result<u64> {
    let date = date.as_int();
    let count = self
      .conn
      .call(move |conn| {
        let count: i64 = conn
          .prepare_cached(
            "SELECT COUNT(*) FROM player WHERE date_int = ?1 AND new_player = 1 AND (?2 IS NULL OR gamesvr = ?2)",
          )?
          .query_row(params![date, server_id], |row| row.get(0))?;
        Ok(count)
      })
      .await?;

    Ok(count as u64)
  }

  // ========================================================================
  // Payments
  // ========================================================================

  /// Append a payment event. Returns the generated row id.
  pub async fn insert_payment(&self, event: PaymentEvent) -> Result<i64> {
    let date = DateBucket::of_timestamp(event.observed_at).as_int();
    let role_id_log = event.role_id.clone();
    let amount = event.amount;

    let id = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(
            r#"
                    INSERT INTO pay_report (roleid, name, level, gamesvr, money, vip_level, date_int, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
          )?
          .execute(params![
            &event.role_id,
            &event.name,
            event.level,
            event.server_id,
            event.amount,
            event.vip_level,
            date,
            event.observed_at
          ])?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    debug!(role_id = %role_id_log, amount, "stored payment");
    Ok(id)
  }

  /// Every payment at or after `since`, in arrival order.
  pub async fn payments_since(&self, since: i64) -> Result<Vec<PaymentEvent>> {
    let events = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          r#"
                    SELECT roleid, name, level, gamesvr, money, vip_level, created_at
                    FROM pay_report
                    WHERE created_at >= ?1
                    ORDER BY created_at ASC, id ASC
                    "#,
        )?;

        let events = stmt
          .query_map(params![since], payment_from_row)?
          .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
      })
      .await?;

    Ok(events)
  }

  /// Payments of a day, optionally filtered to one server, in arrival order.
  pub async fn payments_on(
    &self,
    date: DateBucket,
    server_id: Option<i64>,
  ) -> Result<Vec<PaymentEvent>> {
    let date = date.as_int();
    let events = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          r#"
                    SELECT roleid, name, level, gamesvr, money, vip_level, created_at
                    FROM pay_report
                    WHERE date_int = ?1 AND (?2 IS NULL OR gamesvr = ?2)
                    ORDER BY created_at ASC, id ASC
                    "#,
        )?;

        let events = stmt
          .query_map(params![date, server_id], payment_from_row)?
          .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
      })
      .await?;

    Ok(events)
  }

  /// Paying players and revenue for a day.
  pub async fn payment_stats(&self, date: DateBucket, server_id: Option<i64>) -> Result<PaymentStats> {
    let date = date.as_int();
    let stats = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(
            r#"
                    SELECT COUNT(DISTINCT roleid), TOTAL(money)
                    FROM pay_report
                    WHERE date_int = ?1 AND (?2 IS NULL OR gamesvr = ?2)
                    "#,
          )?
          .query_row(params![date, server_id], |row| {
            let payers: i64 = row.get(0)?;
            // TOTAL never overflows; the cast saturates at i64::MAX
            let total: f64 = row.get(1)?;
            Ok(PaymentStats {
              paying_player_count: payers as u64,
              total_payment: total as i64,
            })
          })
      })
      .await?;

    Ok(stats)
  }

  /// Drop one of the store's tables so later operations on it fail.
  /// Only meant for exercising store-failure paths in tests.
  #[doc(hidden)]
  pub async fn drop_table(&self, table: &'static str) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(&format!("DROP TABLE {table}"))?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ========================================================================
  // Operator accounts
  // ========================================================================

  /// Look up an account by username, active or not.
  pub async fn get_user(&self, username: String) -> Result<Option<UserAccount>> {
    let user = self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(
            "SELECT username, password, display_name, is_active, last_login, created_at FROM log_users WHERE username = ?1",
          )?
          .query_row(params![&username], user_from_row)
          .optional()
      })
      .await?;

    Ok(user)
  }

  /// Create a new active account.
  /// Returns an error if the username is already taken (active or not).
  pub async fn create_user(&self, account: UserAccount) -> Result<UserAccount> {
    let result = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let exists: bool = tx
                    .prepare_cached("SELECT EXISTS(SELECT 1 FROM log_users WHERE username = ?1)")?
                    .query_row(params![&account.username], |row| row.get(0))?;

                if exists {
                    return Ok(Err(DbError::UserExists));
                }

                tx.prepare_cached(
                    "INSERT INTO log_users (username, password, display_name, is_active, last_login, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?
                    .execute(params![
                        &account.username,
                        &account.password_hash,
                        &account.display_name,
                        account.is_active,
                        account.last_login,
                        account.created_at
                    ])?;

                tx.commit()?;
                Ok(Ok(account))
            })
            .await??;

    debug!(username = %result.username, "created user");
    Ok(result)
  }

  /// All accounts with `is_active` set.
  pub async fn active_users(&self) -> Result<Vec<UserAccount>> {
    let users = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT username, password, display_name, is_active, last_login, created_at FROM log_users WHERE is_active = 1 ORDER BY id",
        )?;

        let users = stmt
          .query_map([], user_from_row)?
          .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(users)
      })
      .await?;

    Ok(users)
  }

  /// Replace the stored password hash.
  pub async fn update_password(&self, username: String, password_hash: String) -> Result<()> {
    self
      .update_user_field(
        username,
        "UPDATE log_users SET password = ?2 WHERE username = ?1",
        rusqlite::types::Value::Text(password_hash),
      )
      .await?;
    debug!("updated user password");
    Ok(())
  }

  /// Soft-delete an account.
  pub async fn deactivate_user(&self, username: String) -> Result<()> {
    self
      .update_user_field(
        username,
        "UPDATE log_users SET is_active = ?2 WHERE username = ?1",
        rusqlite::types::Value::Integer(0),
      )
      .await?;
    debug!("deactivated user");
    Ok(())
  }

  /// Record a successful login.
  pub async fn update_last_login(&self, username: String, now: i64) -> Result<()> {
    self
      .update_user_field(
        username,
        "UPDATE log_users SET last_login = ?2 WHERE username = ?1",
        rusqlite::types::Value::Integer(now),
      )
      .await
  }

  /// Single-field update keyed by username.
  async fn update_user_field(
    &self,
    username: String,
    sql: &'static str,
    value: rusqlite::types::Value,
  ) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        let updated = conn.prepare_cached(sql)?.execute(params![&username, value])?;

        if updated == 0 {
          return Ok(Err(DbError::UserNotFound));
        }

        Ok(Ok(()))
      })
      .await?
  }
}

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<PlayerRecord> {
  let date: u32 = row.get(5)?;
  Ok(PlayerRecord {
    role_id: row.get(0)?,
    name: row.get(1)?,
    level: row.get(2)?,
    server_id: row.get(3)?,
    is_new_player: row.get(4)?,
    date: DateBucket::from_int(date)
      .ok_or(rusqlite::Error::IntegralValueOutOfRange(5, date as i64))?,
  })
}

fn payment_from_row(row: &Row<'_>) -> rusqlite::Result<PaymentEvent> {
  Ok(PaymentEvent {
    role_id: row.get(0)?,
    name: row.get(1)?,
    level: row.get(2)?,
    server_id: row.get(3)?,
    amount: row.get(4)?,
    vip_level: row.get(5)?,
    observed_at: row.get(6)?,
  })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserAccount> {
  Ok(UserAccount {
    username: row.get(0)?,
    password_hash: row.get(1)?,
    display_name: row.get(2)?,
    is_active: row.get(3)?,
    last_login: row.get(4)?,
    created_at: row.get(5)?,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn now() -> i64 {
    1700000000 // 2023-11-14T22:13:20Z
  }

  fn today() -> DateBucket {
    DateBucket::of_timestamp(now())
  }

  fn player(role_id: &str, server_id: i64, is_new_player: bool) -> PlayerRecord {
    PlayerRecord {
      role_id: role_id.to_string(),
      name: format!("name-{}", role_id),
      level: 10,
      server_id,
      is_new_player,
      date: today(),
    }
  }

  fn payment(role_id: &str, server_id: i64, amount: i64, at: i64) -> PaymentEvent {
    PaymentEvent {
      role_id: role_id.to_string(),
      name: format!("name-{}", role_id),
      level: 20,
      server_id,
      amount,
      vip_level: 1,
      observed_at: at,
    }
  }

  fn account(username: &str) -> UserAccount {
    UserAccount {
      username: username.to_string(),
      password_hash: "hash".to_string(),
      display_name: "Operator".to_string(),
      is_active: true,
      last_login: None,
      created_at: now(),
    }
  }

  #[tokio::test]
  async fn test_online_samples_filtered_by_day_and_server() {
    let db = Database::open_in_memory().await.unwrap();

    db.insert_online_sample(1, 10, now()).await.unwrap();
    db.insert_online_sample(2, 5, now() + 60).await.unwrap();
    db.insert_online_sample(1, 12, now() + 120).await.unwrap();
    // Next day
    db.insert_online_sample(1, 99, now() + 86400).await.unwrap();

    let all = db.online_samples(today(), None).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].count, 10);
    assert_eq!(all[2].observed_at, now() + 120);

    let server_one = db.online_samples(today(), Some(1)).await.unwrap();
    let counts: Vec<i64> = server_one.iter().map(|s| s.count).collect();
    assert_eq!(counts, vec![10, 12]);
  }

  #[tokio::test]
  async fn test_player_inserted_once_per_day() {
    let db = Database::open_in_memory().await.unwrap();

    let (stored, created) = db
      .insert_player_if_absent(player("p1", 1, true), now())
      .await
      .unwrap();
    assert!(created);
    assert!(stored.is_new_player);

    // Second report the same day with a different novelty flag
    let mut again = player("p1", 2, false);
    again.name = "renamed".to_string();
    let (stored, created) = db.insert_player_if_absent(again, now() + 10).await.unwrap();
    assert!(!created);
    assert!(stored.is_new_player);
    assert_eq!(stored.server_id, 1);
    assert_eq!(stored.name, "name-p1");

    assert_eq!(db.count_active_players(today(), None).await.unwrap(), 1);
  }

  #[tokio::test]
  async fn test_player_counts() {
    let db = Database::open_in_memory().await.unwrap();

    db.insert_player_if_absent(player("p1", 1, true), now()).await.unwrap();
    db.insert_player_if_absent(player("p2", 1, false), now()).await.unwrap();
    db.insert_player_if_absent(player("p3", 2, true), now()).await.unwrap();

    assert_eq!(db.count_active_players(today(), None).await.unwrap(), 3);
    assert_eq!(db.count_active_players(today(), Some(1)).await.unwrap(), 2);
    assert_eq!(db.count_new_players(today(), None).await.unwrap(), 2);
    assert_eq!(db.count_new_players(today(), Some(2)).await.unwrap(), 1);

    let other_day = DateBucket::of_timestamp(now() - 86400);
    assert_eq!(db.count_active_players(other_day, None).await.unwrap(), 0);

    let p2 = db.get_player("p2".to_string(), today()).await.unwrap().unwrap();
    assert!(!p2.is_new_player);
  }

  #[tokio::test]
  async fn test_payments_ordering_and_stats() {
    let db = Database::open_in_memory().await.unwrap();

    db.insert_payment(payment("p1", 1, 100, now())).await.unwrap();
    db.insert_payment(payment("p2", 2, 50, now() + 5)).await.unwrap();
    db.insert_payment(payment("p1", 1, 30, now() + 10)).await.unwrap();
    db.insert_payment(payment("p9", 1, 7, now() - 86400)).await.unwrap();

    let since = db.payments_since(now()).await.unwrap();
    let amounts: Vec<i64> = since.iter().map(|e| e.amount).collect();
    assert_eq!(amounts, vec![100, 50, 30]);

    let server_one = db.payments_on(today(), Some(1)).await.unwrap();
    assert_eq!(server_one.len(), 2);

    let stats = db.payment_stats(today(), None).await.unwrap();
    assert_eq!(stats.paying_player_count, 2);
    assert_eq!(stats.total_payment, 180);

    let empty = db
      .payment_stats(DateBucket::of_timestamp(now() + 86400), None)
      .await
      .unwrap();
    assert_eq!(empty, PaymentStats::default());
  }

  #[tokio::test]
  async fn test_payment_stats_total_saturates() {
    let db = Database::open_in_memory().await.unwrap();

    db.insert_payment(payment("p1", 1, i64::MAX, now())).await.unwrap();
    db.insert_payment(payment("p2", 1, i64::MAX, now() + 1)).await.unwrap();

    let stats = db.payment_stats(today(), None).await.unwrap();
    assert_eq!(stats.paying_player_count, 2);
    assert_eq!(stats.total_payment, i64::MAX);
  }

  #[tokio::test]
  async fn test_dropped_table_fails_operations() {
    let db = Database::open_in_memory().await.unwrap();
    db.drop_table("pay_report").await.unwrap();

    assert!(db.insert_payment(payment("p1", 1, 10, now())).await.is_err());
    assert!(db.payment_stats(today(), None).await.is_err());
    // Other tables are untouched
    db.insert_online_sample(1, 5, now()).await.unwrap();
  }

  #[tokio::test]
  async fn test_user_lifecycle() {
    let db = Database::open_in_memory().await.unwrap();

    db.create_user(account("alice")).await.unwrap();
    assert!(matches!(
      db.create_user(account("alice")).await,
      Err(DbError::UserExists)
    ));

    db.update_password("alice".to_string(), "newhash".to_string())
      .await
      .unwrap();
    db.update_last_login("alice".to_string(), now() + 5)
      .await
      .unwrap();

    let alice = db.get_user("alice".to_string()).await.unwrap().unwrap();
    assert_eq!(alice.password_hash, "newhash");
    assert_eq!(alice.last_login, Some(now() + 5));

    db.deactivate_user("alice".to_string()).await.unwrap();
    assert!(db.active_users().await.unwrap().is_empty());
    let alice = db.get_user("alice".to_string()).await.unwrap().unwrap();
    assert!(!alice.is_active);
  }

  #[tokio::test]
  async fn test_update_missing_user_fails() {
    let db = Database::open_in_memory().await.unwrap();

    assert!(matches!(
      db.update_password("ghost".to_string(), "x".to_string()).await,
      Err(DbError::UserNotFound)
    ));
    assert!(matches!(
      db.deactivate_user("ghost".to_string()).await,
      Err(DbError::UserNotFound)
    ));
  }
}
