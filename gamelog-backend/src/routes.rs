use crate::AppState;
use crate::cache::PlayerLogin;
use crate::error::AppError;
use crate::helpers::{format_timestamp, now};
use crate::online::bucketize;
use crate::pay_rank::fold_payments;
use crate::validation;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_macros::debug_handler;
use gamelog_db::{DateBucket, PaymentEvent};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Deserialize)]
pub(crate) struct OnlineNumRequest {
    #[serde(rename = "gamesvrID")]
    server_id: i64,
    #[serde(rename = "onlineNum")]
    online_num: i64,
}

#[derive(Deserialize)]
pub(crate) struct UserLoginRequest {
    roleid: String,
    name: String,
    level: i64,
    gamesvr: i64,
    new_player: i64,
}

#[derive(Deserialize)]
pub(crate) struct PayReportRequest {
    roleid: String,
    name: String,
    level: i64,
    gamesvr: i64,
    money: i64,
    viplevel: i64,
}

/// Shared `?date=YYYY-MM-DD&server=N&width=M` query.
#[derive(Deserialize)]
pub(crate) struct StatsQuery {
    date: Option<String>,
    server: Option<String>,
    width: Option<String>,
}

impl StatsQuery {
    /// Day (falls back to today) and optional server filter.
    fn scope(&self) -> Result<(DateBucket, Option<i64>), AppError> {
        let date = DateBucket::parse(self.date.as_deref().unwrap_or_default());
        let server = validation::parse_server_filter(self.server.as_deref())?;
        Ok((date, server))
    }
}

#[derive(Serialize)]
pub(crate) struct OnlineNow {
    servers: BTreeMap<i64, i64>,
    total: i64,
}

/// Per-server counts in id order plus a saturating total.
fn online_totals(snapshot: impl IntoIterator<Item = (i64, i64)>) -> OnlineNow {
    let servers: BTreeMap<i64, i64> = snapshot.into_iter().collect();
    let total = servers.values().fold(0i64, |acc, n| acc.saturating_add(*n));
    OnlineNow { servers, total }
}

#[derive(Serialize)]
pub(crate) struct ClearPlayersResponse {
    before_size: usize,
    after_size: usize,
    cleared_at: String,
}

// =============================================================================
// Reports from game servers
// =============================================================================

#[debug_handler]
pub(crate) async fn online_num(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OnlineNumRequest>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_server_id(payload.server_id)?;
    validation::validate_non_negative("onlineNum", payload.online_num)?;

    // Cache first; a failed store write leaves the cached value in place.
    state.online.set(payload.server_id, payload.online_num);
    state
        .db
        .insert_online_sample(payload.server_id, payload.online_num, now())
        .await?;

    Ok((StatusCode::OK, Json(json!({ "message": "ok" }))))
}

#[debug_handler]
pub(crate) async fn user_login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UserLoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_player_report(
        &payload.roleid,
        &payload.name,
        payload.level,
        payload.gamesvr,
    )?;
    let is_new_player = validation::parse_new_player_flag(payload.new_player)?;

    let action = state
        .players
        .login(
            &state.db,
            PlayerLogin {
                role_id: payload.roleid,
                name: payload.name,
                level: payload.level,
                server_id: payload.gamesvr,
                is_new_player,
            },
            now(),
        )
        .await?;

    Ok((StatusCode::OK, Json(json!({ "action": action }))))
}

#[debug_handler]
pub(crate) async fn pay_report(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PayReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    validation::validate_player_report(
        &payload.roleid,
        &payload.name,
        payload.level,
        payload.gamesvr,
    )?;
    validation::validate_amount(payload.money)?;
    validation::validate_non_negative("viplevel", payload.viplevel)?;

    let event = PaymentEvent {
        role_id: payload.roleid,
        name: payload.name,
        level: payload.level,
        server_id: payload.gamesvr,
        amount: payload.money,
        vip_level: payload.viplevel,
        observed_at: now(),
    };

    state.pay_rank.update(&event);
    state.db.insert_payment(event).await?;

    Ok((StatusCode::OK, Json(json!({ "message": "ok" }))))
}

// =============================================================================
// Dashboard statistics
// =============================================================================

pub(crate) async fn pay_rank(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (date, server) = query.scope()?;

    let rank = if date == DateBucket::today() && server.is_none() {
        state.pay_rank.rank()
    } else {
        debug!(%date, ?server, "folding leaderboard from store");
        fold_payments(&state.db.payments_on(date, server).await?)
    };

    Ok(Json(json!({ "date": date.to_string(), "rank": rank })))
}

pub(crate) async fn today_online(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (date, server) = query.scope()?;
    let width = validation::parse_bucket_width(query.width.as_deref(), state.online_bucket)?;

    let samples = state.db.online_samples(date, server).await?;
    let buckets = bucketize(&samples, width, date.day_start(), server);

    Ok(Json(json!({
        "date": date.to_string(),
        "width": width.minutes(),
        "data": buckets,
    })))
}

pub(crate) async fn online_now(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(online_totals(state.online.snapshot()))
}

pub(crate) async fn active_players(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (date, server) = query.scope()?;
    let count = state.db.count_active_players(date, server).await?;
    Ok(Json(json!({ "active_player_count": count })))
}

pub(crate) async fn new_players(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (date, server) = query.scope()?;
    let count = state.db.count_new_players(date, server).await?;
    Ok(Json(json!({ "new_player_count": count })))
}

pub(crate) async fn payment_stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let (date, server) = query.scope()?;
    let stats = state.db.payment_stats(date, server).await?;
    Ok(Json(json!({
        "paying_player_count": stats.paying_player_count,
        "total_payment": stats.total_payment,
    })))
}

// =============================================================================
// Maintenance
// =============================================================================

pub(crate) async fn clear_players(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let before_size = state.players.len();
    state.players.clear();
    let after_size = state.players.len();
    let cleared_at = format_timestamp(now());

    info!(before_size, after_size, "player cache cleared by operator");
    Json(ClearPlayersResponse {
        before_size,
        after_size,
        cleared_at,
    })
}

pub(crate) async fn session_count(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let count = state.sessions.count(now()).await;
    Json(json!({ "count": count }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_totals_saturate() {
        let totals = online_totals([(2, i64::MAX), (1, 10), (3, i64::MAX)]);
        assert_eq!(totals.total, i64::MAX);
        assert_eq!(totals.servers.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3]);

        let empty = online_totals(Vec::new());
        assert_eq!(empty.total, 0);
        assert!(empty.servers.is_empty());
    }
}
