//! Operator accounts, mirrored in memory.
//!
//! Only active accounts are cached. Credential changes go to the store
//! first and touch the cache only after the store accepted them.

use gamelog_db::{Database, DbError, UserAccount};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::helpers::hash_password;

/// Reserved privileged account. Always exists and can never be deactivated.
pub const ROOT_USERNAME: &str = "root";
const ROOT_DISPLAY_NAME: &str = "System Administrator";

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("user '{0}' already exists")]
    AlreadyExists(String),

    #[error("user '{0}' not found")]
    NotFound(String),

    #[error("the root account cannot be deactivated")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] DbError),
}

/// Public view of an account (no password hash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub username: String,
    pub display_name: String,
    pub is_active: bool,
    pub last_login: Option<i64>,
    pub created_at: i64,
}

impl From<&UserAccount> for Identity {
    fn from(account: &UserAccount) -> Self {
        Self {
            username: account.username.clone(),
            display_name: account.display_name.clone(),
            is_active: account.is_active,
            last_login: account.last_login,
            created_at: account.created_at,
        }
    }
}

pub struct UserDirectory {
    db: Database,
    users: Arc<RwLock<HashMap<String, UserAccount>>>,
}

impl UserDirectory {
    /// Ensure the root account exists, then load every active account.
    pub async fn bootstrap(db: Database, root_password: &str, now: i64) -> Result<Self, DbError> {
        if db.get_user(ROOT_USERNAME.to_string()).await?.is_none() {
            db.create_user(UserAccount {
                username: ROOT_USERNAME.to_string(),
                password_hash: hash_password(root_password),
                display_name: ROOT_DISPLAY_NAME.to_string(),
                is_active: true,
                last_login: None,
                created_at: now,
            })
            .await?;
            warn!(
                username = ROOT_USERNAME,
                "created default root account with the configured default password; change it"
            );
        } else {
            debug!("root account already present");
        }

        let directory = Self {
            db,
            users: Arc::new(RwLock::new(HashMap::new())),
        };
        directory.reload().await?;
        Ok(directory)
    }

    /// Replace the cache with the store's active accounts.
    pub async fn reload(&self) -> Result<usize, DbError> {
        let users: HashMap<String, UserAccount> = self
            .db
            .active_users()
            .await?
            .into_iter()
            .map(|u| (u.username.clone(), u))
            .collect();
        let count = users.len();
        *self.users.write() = users;

        info!(count, "loaded active users");
        Ok(count)
    }

    /// Check a username/password pair.
    ///
    /// Unknown user, inactive user and wrong password are indistinguishable
    /// to the caller. On success the last-login time is refreshed in the
    /// background; a failure there is only logged.
    pub fn validate(&self, username: &str, password: &str, now: i64) -> Option<Identity> {
        let hash = hash_password(password);
        let identity = {
            let users = self.users.read();
            let Some(account) = users.get(username) else {
                debug!(username, "login for unknown user");
                return None;
            };
            if !account.is_active || account.password_hash != hash {
                debug!(username, "login with bad password or inactive account");
                return None;
            }
            Identity::from(account)
        };

        self.refresh_last_login(username.to_string(), now);
        Some(identity)
    }

    /// Password check without any side effect on the account.
    pub fn check_password(&self, username: &str, password: &str) -> bool {
        let hash = hash_password(password);
        self.users
            .read()
            .get(username)
            .is_some_and(|account| account.is_active && account.password_hash == hash)
    }

    fn refresh_last_login(&self, username: String, now: i64) {
        let db = self.db.clone();
        let users = Arc::clone(&self.users);
        tokio::spawn(async move {
            if let Err(e) = db.update_last_login(username.clone(), now).await {
                error!(%username, error = %e, "failed to persist last login");
            }
            if let Some(account) = users.write().get_mut(&username) {
                account.last_login = Some(now);
            }
        });
    }

    /// Create a new active account.
    pub async fn create(
        &self,
        username: &str,
        password: &str,
        display_name: &str,
        now: i64,
    ) -> Result<Identity, DirectoryError> {
        if self.users.read().contains_key(username) {
            return Err(DirectoryError::AlreadyExists(username.to_string()));
        }

        let account = self
            .db
            .create_user(UserAccount {
                username: username.to_string(),
                password_hash: hash_password(password),
                display_name: display_name.to_string(),
                is_active: true,
                last_login: None,
                created_at: now,
            })
            .await
            .map_err(|e| match e {
                DbError::UserExists => DirectoryError::AlreadyExists(username.to_string()),
                other => DirectoryError::Store(other),
            })?;

        let identity = Identity::from(&account);
        self.users.write().insert(account.username.clone(), account);

        info!(username, display_name, "user created");
        Ok(identity)
    }

    /// Replace the password of a cached account. Store first, then cache.
    pub async fn update_password(&self, username: &str, new_password: &str) -> Result<(), DirectoryError> {
        if !self.users.read().contains_key(username) {
            return Err(DirectoryError::NotFound(username.to_string()));
        }

        let hash = hash_password(new_password);
        self.db
            .update_password(username.to_string(), hash.clone())
            .await
            .map_err(|e| match e {
                DbError::UserNotFound => DirectoryError::NotFound(username.to_string()),
                other => DirectoryError::Store(other),
            })?;

        if let Some(account) = self.users.write().get_mut(username) {
            account.password_hash = hash;
        }

        info!(username, "password updated");
        Ok(())
    }

    /// Soft-delete an account and drop it from the cache.
    pub async fn deactivate(&self, username: &str) -> Result<(), DirectoryError> {
        if username == ROOT_USERNAME {
            return Err(DirectoryError::Forbidden);
        }
        if !self.users.read().contains_key(username) {
            return Err(DirectoryError::NotFound(username.to_string()));
        }

        self.db
            .deactivate_user(username.to_string())
            .await
            .map_err(|e| match e {
                DbError::UserNotFound => DirectoryError::NotFound(username.to_string()),
                other => DirectoryError::Store(other),
            })?;

        self.users.write().remove(username);

        info!(username, "user deactivated");
        Ok(())
    }

    pub fn get(&self, username: &str) -> Option<Identity> {
        self.users.read().get(username).map(Identity::from)
    }

    /// Every active account, ordered by username.
    pub fn list(&self) -> Vec<Identity> {
        let mut identities: Vec<Identity> = self
            .users
            .read()
            .values()
            .filter(|u| u.is_active)
            .map(Identity::from)
            .collect();
        identities.sort_by(|a, b| a.username.cmp(&b.username));
        identities
    }

    pub fn count(&self) -> usize {
        self.users.read().len()
    }
}
