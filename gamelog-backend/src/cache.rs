//! Latest-value caches that sit in front of the record store.
//!
//! Each cache owns its own lock. No method holds a lock across a store call.

use gamelog_db::{Database, DateBucket, DbError, PlayerRecord};
use parking_lot::RwLock;
use serde::Serialize;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use tracing::debug;

/// Generic latest-value map guarded by a reader/writer lock.
pub struct EntityCache<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> EntityCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or overwrite the value for `key`.
    pub fn set(&self, key: K, value: V) {
        self.entries.write().insert(key, value);
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.read().get(key).cloned()
    }

    /// Mutate an existing entry in place. Returns a copy of the updated
    /// value, or `None` when the key is not cached.
    pub fn update<Q, F>(&self, key: &Q, f: F) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
        F: FnOnce(&mut V),
    {
        let mut entries = self.entries.write();
        let value = entries.get_mut(key)?;
        f(value);
        Some(value.clone())
    }

    /// Copy of every entry, taken under a single read lock.
    pub fn snapshot(&self) -> HashMap<K, V> {
        self.entries.read().clone()
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K, V> Default for EntityCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Most recent online count per game server, never cleared.
pub type OnlineNumCache = EntityCache<i64, i64>;

/// A player login report.
#[derive(Debug, Clone)]
pub struct PlayerLogin {
    pub role_id: String,
    pub name: String,
    pub level: i64,
    pub server_id: i64,
    pub is_new_player: bool,
}

/// What a login did to the cache and store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginAction {
    /// Role already cached today; display fields refreshed, store untouched.
    CacheUpdate,
    /// First login of the day; store row written and cached.
    DbInsertAndCache,
    /// Store already had today's row (e.g. after a restart); cached from it.
    CacheRestore,
}

/// Today's players keyed by role id.
pub struct PlayerCache {
    entries: EntityCache<String, PlayerRecord>,
}

impl PlayerCache {
    pub fn new() -> Self {
        Self {
            entries: EntityCache::new(),
        }
    }

    /// Apply the merge-on-login rule.
    ///
    /// A role seen earlier today only gets its name, level and server
    /// refreshed; its novelty flag and day stay as first recorded and the
    /// store is not written again. Otherwise the record is written to the
    /// store first and the stored row becomes the cache entry.
    pub async fn login(
        &self,
        db: &Database,
        login: PlayerLogin,
        now: i64,
    ) -> Result<LoginAction, DbError> {
        let today = DateBucket::of_timestamp(now);

        let refreshed = self.entries.update(login.role_id.as_str(), |cached| {
            cached.name.clone_from(&login.name);
            cached.level = login.level;
            cached.server_id = login.server_id;
        });
        if refreshed.is_some_and(|cached| cached.date == today) {
            return Ok(LoginAction::CacheUpdate);
        }

        let role_id = login.role_id.clone();
        let record = PlayerRecord {
            role_id: login.role_id,
            name: login.name.clone(),
            level: login.level,
            server_id: login.server_id,
            is_new_player: login.is_new_player,
            date: today,
        };
        let (stored, created) = db.insert_player_if_absent(record, now).await?;

        // Frozen fields come from the store, display fields from this report.
        let entry = PlayerRecord {
            name: login.name,
            level: login.level,
            server_id: login.server_id,
            ..stored
        };
        self.entries.set(role_id.clone(), entry);

        debug!(%role_id, created, "player cached");
        Ok(if created {
            LoginAction::DbInsertAndCache
        } else {
            LoginAction::CacheRestore
        })
    }

    pub fn get(&self, role_id: &str) -> Option<PlayerRecord> {
        self.entries.get(role_id)
    }

    pub fn snapshot(&self) -> HashMap<String, PlayerRecord> {
        self.entries.snapshot()
    }

    pub fn clear(&self) -> usize {
        self.entries.clear()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PlayerCache {
    fn default() -> Self {
        Self::new()
    }
}
