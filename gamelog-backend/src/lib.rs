mod auth;
pub mod cache;
pub mod config;
pub mod directory;
mod error;
pub mod helpers;
pub mod online;
pub mod pay_rank;
pub mod reset;
mod routes;
pub mod session;
mod users;
mod validation;

use axum::{
    Router,
    http::StatusCode,
    middleware,
    routing::{delete, get, post, put},
};
use gamelog_db::{Database, DateBucket, DbError};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tracing::warn;

pub use auth::{CurrentUser, SESSION_COOKIE};

use cache::{OnlineNumCache, PlayerCache};
use config::Config;
use directory::UserDirectory;
use online::BucketWidth;
use pay_rank::PayRank;
use session::SessionStore;

/// Every long-lived service, constructed once at startup.
pub struct AppState {
    pub db: Database,
    pub sessions: SessionStore,
    pub users: UserDirectory,
    pub players: PlayerCache,
    pub online: OnlineNumCache,
    pub pay_rank: PayRank,
    /// Default chart bucket width when a query does not give one
    pub online_bucket: BucketWidth,
}

impl AppState {
    /// Bootstrap the user directory and rebuild today's leaderboard.
    pub async fn initialize(db: Database, config: &Config) -> Result<Self, DbError> {
        let now = helpers::now();
        let users = UserDirectory::bootstrap(db.clone(), &config.root_default_password, now).await?;

        let pay_rank = PayRank::new();
        pay_rank
            .rebuild_from_store(&db, DateBucket::of_timestamp(now).day_start())
            .await?;

        let online_bucket = BucketWidth::new(config.online_bucket_minutes).unwrap_or_else(|| {
            warn!(
                minutes = config.online_bucket_minutes,
                "bucket width does not divide a day, using 5 minutes"
            );
            BucketWidth::default()
        });

        Ok(Self {
            db,
            sessions: SessionStore::new(config.session_ttl_secs),
            users,
            players: PlayerCache::new(),
            online: OnlineNumCache::new(),
            pay_rank,
            online_bucket,
        })
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests per minute for /login
    pub login_per_min: u64,
    /// Burst size for /login
    pub login_burst: u32,
    /// Requests per second for report endpoints (/onlineNum, /user_login, /pay_report)
    pub report_per_sec: u64,
    /// Burst size for report endpoints
    pub report_burst: u32,
    /// Requests per second for dashboard endpoints
    pub general_per_sec: u64,
    /// Burst size for dashboard endpoints
    pub general_burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            login_per_min: 10,
            login_burst: 5,
            report_per_sec: 200,
            report_burst: 500,
            general_per_sec: 10,
            general_burst: 20,
        }
    }
}

/// Milliseconds between two replenished tokens for `count` requests per `window_ms`.
fn replenish_interval_ms(window_ms: u64, count: u64) -> u64 {
    (window_ms / count.max(1)).max(1)
}

/// Create the application router over already-initialized services
pub fn create_app(
    state: Arc<AppState>,
    request_body_limit: usize,
    request_timeout: Duration,
    rate_limit: RateLimitConfig,
) -> Router {
    // Strict rate limit for /login - slows down password guessing
    let login_governor = GovernorConfigBuilder::default()
        .per_millisecond(replenish_interval_ms(60_000, rate_limit.login_per_min))
        .burst_size(rate_limit.login_burst.max(1))
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("login rate limit is non-zero");

    // Lenient rate limit for game server reports - they arrive in bursts
    let report_governor = GovernorConfigBuilder::default()
        .per_millisecond(replenish_interval_ms(1_000, rate_limit.report_per_sec))
        .burst_size(rate_limit.report_burst.max(1))
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("report rate limit is non-zero");

    // General rate limit for the dashboard
    let general_governor = GovernorConfigBuilder::default()
        .per_millisecond(replenish_interval_ms(1_000, rate_limit.general_per_sec))
        .burst_size(rate_limit.general_burst.max(1))
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("general rate limit is non-zero");

    let login_routes = Router::new()
        .route("/login", post(auth::login))
        .layer(GovernorLayer::new(login_governor));

    let report_routes = Router::new()
        .route("/onlineNum", post(routes::online_num))
        .route("/user_login", post(routes::user_login))
        .route("/pay_report", post(routes::pay_report))
        .layer(GovernorLayer::new(report_governor));

    // Everything here needs a live session
    let protected_routes = Router::new()
        .route("/pay_rank", get(routes::pay_rank))
        .route("/today_online", get(routes::today_online))
        .route("/online_now", get(routes::online_now))
        .route("/getactivateplayer", get(routes::active_players))
        .route("/getnewplayer", get(routes::new_players))
        .route("/get_today_payment_stats", get(routes::payment_stats))
        .route("/api/users", post(users::create_user).get(users::list_users))
        .route("/api/users/{username}/password", put(users::set_password))
        .route("/api/users/{username}", delete(users::deactivate_user))
        .route("/api/current-user", get(users::current_user))
        .route("/api/current-user/password", put(users::change_own_password))
        .route("/api/sessions/count", get(routes::session_count))
        .route("/cache/clear_players", post(routes::clear_players))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_session,
        ));

    let general_routes = Router::new()
        .route("/logout", post(auth::logout))
        .merge(protected_routes)
        .layer(GovernorLayer::new(general_governor));

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .merge(login_routes)
        .merge(report_routes)
        .merge(general_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(RequestBodyLimitLayer::new(request_body_limit))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replenish_interval() {
        assert_eq!(replenish_interval_ms(60_000, 10), 6_000);
        assert_eq!(replenish_interval_ms(1_000, 200), 5);
        assert_eq!(replenish_interval_ms(1_000, 5_000), 1);
        assert_eq!(replenish_interval_ms(1_000, 0), 1_000);
    }

    #[tokio::test]
    async fn test_initialize_rebuilds_todays_leaderboard() {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_payment(gamelog_db::PaymentEvent {
            role_id: "p1".to_string(),
            name: "Alice".to_string(),
            level: 10,
            server_id: 1,
            amount: 300,
            vip_level: 2,
            observed_at: helpers::now(),
        })
        .await
        .unwrap();

        let state = AppState::initialize(db, &Config::default()).await.unwrap();
        let rank = state.pay_rank.rank();
        assert_eq!(rank.len(), 1);
        assert_eq!(rank[0].cumulative_amount, 300);
        assert!(state.users.get(directory::ROOT_USERNAME).is_some());
        assert_eq!(state.online_bucket, BucketWidth::FIVE_MINUTES);
    }
}
