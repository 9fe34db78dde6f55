//! The logged-in user, resolved once per command.
//!
//! Commands that act on behalf of a user take a [`Session`] instead of
//! reading the current user name from the config themselves.

use thiserror::Error;

use crate::config::Config;
use crate::storage::{Database, StoreError, User};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No user is logged in, run `login` or `register` first")]
    NotLoggedIn,

    #[error("Logged-in user '{0}' no longer exists, run `login` or `register` again")]
    UnknownUser(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
}

impl Session {
    /// Look up `current_user_name` from `config` in the store.
    pub async fn resolve(db: &Database, config: &Config) -> Result<Self, SessionError> {
        let name = config
            .current_user_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .ok_or(SessionError::NotLoggedIn)?;

        let user = db
            .get_user_by_name(name)
            .await?
            .ok_or_else(|| SessionError::UnknownUser(name.to_string()))?;
        tracing::debug!(user = %user.name, "Resolved session");
        Ok(Self { user })
    }
}
