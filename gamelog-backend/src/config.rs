use std::env::var;
use std::time::Duration;

use dotenvy::dotenv;

/// Application configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Request body size limit in bytes
    /// Env: REQUEST_BODY_LIMIT (default: 1048576 = 1MB)
    pub request_body_limit: usize,

    /// Request timeout in seconds
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Server port
    /// Env: PORT (default: 3000)
    pub port: u16,

    /// Database file path
    /// Env: DATABASE_PATH (default: "gamelog.db")
    pub database_path: String,

    /// Dashboard session lifetime in seconds
    /// Env: SESSION_TTL_SECS (default: 86400)
    pub session_ttl_secs: i64,

    /// Password given to the root account when it is first created
    /// Env: ROOT_DEFAULT_PASSWORD (default: "123456")
    pub root_default_password: String,

    /// Default width of the online-count chart buckets in minutes
    /// Env: ONLINE_BUCKET_MINUTES (default: 5)
    pub online_bucket_minutes: u32,

    /// Rate limit for /login (requests per minute)
    /// Env: RATE_LIMIT_LOGIN_PER_MIN (default: 10)
    pub rate_limit_login_per_min: u64,

    /// Burst size for /login
    /// Env: RATE_LIMIT_LOGIN_BURST (default: 5)
    pub rate_limit_login_burst: u32,

    /// Rate limit for report endpoints like /onlineNum, /user_login, /pay_report (requests per second)
    /// Env: RATE_LIMIT_REPORT_PER_SEC (default: 200)
    /// Game servers report in bursts, so this one is lenient
    pub rate_limit_report_per_sec: u64,

    /// Burst size for report endpoints
    /// Env: RATE_LIMIT_REPORT_BURST (default: 500)
    pub rate_limit_report_burst: u32,

    /// Rate limit for dashboard endpoints (requests per second)
    /// Env: RATE_LIMIT_GENERAL_PER_SEC (default: 10)
    pub rate_limit_general_per_sec: u64,

    /// Burst size for dashboard endpoints
    /// Env: RATE_LIMIT_GENERAL_BURST (default: 20)
    pub rate_limit_general_burst: u32,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let _ = dotenv(); //for debugging mostly
        let defaults = Self::default();
        Self {
            request_body_limit: env_or_default("REQUEST_BODY_LIMIT", defaults.request_body_limit),
            request_timeout: Duration::from_secs(env_or_default("REQUEST_TIMEOUT_SECS", 30)),
            port: env_or_default("PORT", defaults.port),
            database_path: env_or_default_string("DATABASE_PATH", &defaults.database_path),
            session_ttl_secs: env_or_default("SESSION_TTL_SECS", defaults.session_ttl_secs),
            root_default_password: env_or_default_string(
                "ROOT_DEFAULT_PASSWORD",
                &defaults.root_default_password,
            ),
            online_bucket_minutes: env_or_default(
                "ONLINE_BUCKET_MINUTES",
                defaults.online_bucket_minutes,
            ),
            rate_limit_login_per_min: env_or_default(
                "RATE_LIMIT_LOGIN_PER_MIN",
                defaults.rate_limit_login_per_min,
            ),
            rate_limit_login_burst: env_or_default(
                "RATE_LIMIT_LOGIN_BURST",
                defaults.rate_limit_login_burst,
            ),
            rate_limit_report_per_sec: env_or_default(
                "RATE_LIMIT_REPORT_PER_SEC",
                defaults.rate_limit_report_per_sec,
            ),
            rate_limit_report_burst: env_or_default(
                "RATE_LIMIT_REPORT_BURST",
                defaults.rate_limit_report_burst,
            ),
            rate_limit_general_per_sec: env_or_default(
                "RATE_LIMIT_GENERAL_PER_SEC",
                defaults.rate_limit_general_per_sec,
            ),
            rate_limit_general_burst: env_or_default(
                "RATE_LIMIT_GENERAL_BURST",
                defaults.rate_limit_general_burst,
            ),
        }
    }

    /// Create configuration with all default values
    pub fn default() -> Self {
        Self {
            request_body_limit: 1024 * 1024, // 1 MB
            request_timeout: Duration::from_secs(30),
            port: 3000,
            database_path: "gamelog.db".to_string(),
            session_ttl_secs: 24 * 60 * 60,
            root_default_password: "123456".to_string(),
            online_bucket_minutes: 5,
            rate_limit_login_per_min: 10,
            rate_limit_login_burst: 5,
            rate_limit_report_per_sec: 200,
            rate_limit_report_burst: 500,
            rate_limit_general_per_sec: 10,
            rate_limit_general_burst: 20,
        }
    }

    pub fn rate_limit(&self) -> crate::RateLimitConfig {
        crate::RateLimitConfig {
            login_per_min: self.rate_limit_login_per_min,
            login_burst: self.rate_limit_login_burst,
            report_per_sec: self.rate_limit_report_per_sec,
            report_burst: self.rate_limit_report_burst,
            general_per_sec: self.rate_limit_general_per_sec,
            general_burst: self.rate_limit_general_burst,
        }
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.request_body_limit, 1024 * 1024);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_path, "gamelog.db");
        assert_eq!(config.session_ttl_secs, 86400);
        assert_eq!(config.root_default_password, "123456");
        assert_eq!(config.online_bucket_minutes, 5);
        assert_eq!(config.rate_limit_login_per_min, 10);
        assert_eq!(config.rate_limit_login_burst, 5);
        assert_eq!(config.rate_limit_report_per_sec, 200);
        assert_eq!(config.rate_limit_report_burst, 500);
        assert_eq!(config.rate_limit_general_per_sec, 10);
        assert_eq!(config.rate_limit_general_burst, 20);
    }

    #[test]
    fn test_rate_limit_mirrors_config() {
        let config = Config::default();
        let rate_limit = config.rate_limit();
        assert_eq!(rate_limit.login_per_min, config.rate_limit_login_per_min);
        assert_eq!(rate_limit.report_burst, config.rate_limit_report_burst);
        assert_eq!(rate_limit.general_per_sec, config.rate_limit_general_per_sec);
    }
}
