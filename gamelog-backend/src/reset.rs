//! Midnight housekeeping.
//!
//! Once per UTC day the player cache is emptied and the payment leaderboard
//! starts a new scope. Sessions, users and online counts are left alone.

use chrono::{DateTime, Days, Utc};
use gamelog_db::DateBucket;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::AppState;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

/// Time left until the next UTC midnight strictly after `now`.
pub fn until_next_midnight(now: DateTime<Utc>) -> Duration {
    let next = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc());

    match next {
        Some(next) => (next - now).to_std().unwrap_or(Duration::from_secs(1)),
        None => Duration::from_secs(SECS_PER_DAY as u64),
    }
}

/// Start the day that begins at `day_start`. Returns (players cleared,
/// leaderboard entries carried into the new day).
///
/// The leaderboard is rebuilt from stored payments at or after `day_start`
/// so reports accepted between midnight and this call are kept. If the store
/// cannot be read the leaderboard is emptied instead.
pub async fn run_daily_reset(state: &AppState, day_start: i64) -> (usize, usize) {
    let players = state.players.clear();
    let ranked = match state.pay_rank.rebuild_from_store(&state.db, day_start).await {
        Ok(ranked) => ranked,
        Err(e) => {
            error!(error = %e, "failed to rebuild payment leaderboard, starting empty");
            state.pay_rank.reset();
            0
        }
    };
    info!(players, ranked, "daily reset complete");
    (players, ranked)
}

/// Spawn the background task that fires [`run_daily_reset`] at every UTC
/// midnight. The wait is recomputed from the wall clock after every fire.
pub fn spawn_daily_reset(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let wait = until_next_midnight(now);
            info!(wait_secs = wait.as_secs(), "next daily reset scheduled");
            tokio::time::sleep(wait).await;
            let day_start = DateBucket::of_timestamp(now.timestamp()).day_start() + SECS_PER_DAY;
            run_daily_reset(&state, day_start).await;
        }
    })
}
