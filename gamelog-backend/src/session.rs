//! In-memory dashboard sessions.
//!
//! Sessions live only as long as the process. Expired entries are removed
//! lazily: a full sweep runs before every insert, and a lookup that finds an
//! expired entry schedules its removal in the background.

use arrayvec::ArrayString;
use scc::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::helpers::generate_session_token;

/// Hex-encoded 128-bit token, stored inline.
pub type SessionToken = ArrayString<32>;

/// Default session lifetime: 24 hours.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: SessionToken,
    pub username: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl Session {
    pub fn is_expired(&self, now: i64) -> bool {
        now > self.expires_at
    }
}

/// Thread-safe token → session map.
pub struct SessionStore {
    sessions: Arc<HashMap<SessionToken, Session>>,
    ttl_secs: i64,
}

impl SessionStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            sessions: Arc::new(HashMap::new()),
            ttl_secs,
        }
    }

    /// Issue a fresh session for `username`.
    pub async fn create(&self, username: &str, now: i64) -> Session {
        self.sweep_expired(now).await;

        loop {
            let session = Session {
                token: generate_session_token(),
                username: username.to_string(),
                created_at: now,
                expires_at: now + self.ttl_secs,
            };
            // A collision on 128 random bits means we simply draw again.
            match self
                .sessions
                .insert_async(session.token, session.clone())
                .await
            {
                Ok(()) => {
                    info!(username, "session created");
                    return session;
                }
                Err(_) => continue,
            }
        }
    }

    /// Resolve a token. Expired sessions report as absent and are removed
    /// in the background without blocking the caller.
    pub async fn get(&self, token: &str, now: i64) -> Option<Session> {
        let key = SessionToken::try_from(token).ok()?;
        let session = self
            .sessions
            .read_async(&key, |_, session| session.clone())
            .await?;

        if session.is_expired(now) {
            let sessions = Arc::clone(&self.sessions);
            tokio::spawn(async move {
                if sessions.remove_async(&key).await.is_some() {
                    debug!("removed expired session");
                }
            });
            return None;
        }

        Some(session)
    }

    /// Remove a session. Removing an unknown token is a no-op.
    pub async fn delete(&self, token: &str) -> bool {
        let Ok(key) = SessionToken::try_from(token) else {
            return false;
        };
        match self.sessions.remove_async(&key).await {
            Some((_, session)) => {
                info!(username = %session.username, "session deleted");
                true
            }
            None => false,
        }
    }

    /// Number of sessions that have not expired at `now`.
    /// Counts without removing anything.
    pub async fn count(&self, now: i64) -> usize {
        let mut live = 0;
        self.sessions
            .retain_async(|_, session| {
                if !session.is_expired(now) {
                    live += 1;
                }
                true
            })
            .await;
        live
    }

    async fn sweep_expired(&self, now: i64) {
        self.sessions
            .retain_async(|_, session| !session.is_expired(now))
            .await;
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const NOW: i64 = 1700000000;

    #[tokio::test]
    async fn test_create_then_get() {
        let store = SessionStore::default();
        let session = store.create("root", NOW).await;

        assert_eq!(session.token.len(), 32);
        assert_eq!(session.expires_at, NOW + DEFAULT_SESSION_TTL_SECS);

        let found = store.get(&session.token, NOW + 10).await.unwrap();
        assert_eq!(found, session);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_tokens_are_absent() {
        let store = SessionStore::default();
        assert!(store.get("deadbeef", NOW).await.is_none());
        assert!(store.get(&"f".repeat(64), NOW).await.is_none());
        assert!(store.get("", NOW).await.is_none());
    }

    #[tokio::test]
    async fn test_session_valid_until_expiry_instant() {
        let store = SessionStore::new(100);
        let session = store.create("root", NOW).await;

        assert!(store.get(&session.token, NOW + 100).await.is_some());
        assert!(store.get(&session.token, NOW + 101).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_lookup_removes_in_background() {
        let store = SessionStore::new(100);
        let session = store.create("root", NOW).await;

        assert!(store.get(&session.token, NOW + 500).await.is_none());

        for _ in 0..50 {
            if store.sessions.len() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.sessions.len(), 0);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = SessionStore::default();
        let session = store.create("root", NOW).await;

        assert!(store.delete(&session.token).await);
        assert!(!store.delete(&session.token).await);
        assert!(!store.delete("not-a-token").await);
        assert!(store.get(&session.token, NOW).await.is_none());
    }

    #[tokio::test]
    async fn test_count_ignores_expired_without_removing() {
        let store = SessionStore::new(100);
        store.create("alice", NOW).await;
        store.create("bob", NOW + 50).await;

        assert_eq!(store.count(NOW + 10).await, 2);
        assert_eq!(store.count(NOW + 120).await, 1);
        assert_eq!(store.sessions.len(), 2);
    }

    #[tokio::test]
    async fn test_create_sweeps_expired_sessions() {
        let store = SessionStore::new(100);
        let old = store.create("alice", NOW).await;
        let fresh = store.create("bob", NOW + 200).await;

        assert_eq!(store.sessions.len(), 1);
        assert!(store.get(&old.token, NOW + 200).await.is_none());
        assert!(store.get(&fresh.token, NOW + 200).await.is_some());
    }
}
