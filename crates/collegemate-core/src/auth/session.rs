//! The logged-in user on this installation
//!
//! At most one session exists at a time. It is a point-in-time copy of the
//! account taken when the session started; later account edits do not reach
//! it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Account, AuthError};
use crate::clock::Clock;
use crate::store::{KeyValueStore, KEY_SESSION};

/// Snapshot of the signed-in account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(flatten)]
    pub account: Account,
    /// When the session was opened
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn email(&self) -> &str {
        &self.account.email
    }

    pub fn name(&self) -> &str {
        &self.account.name
    }
}

/// Single-slot durable session record
pub trait SessionStore: Send + Sync {
    /// Open a session for `account`, replacing any existing one
    fn start_session(&self, account: &Account) -> Result<Session, AuthError>;

    fn current_session(&self) -> Result<Option<Session>, AuthError>;

    /// Drop the persisted session
    ///
    /// Callers must also discard in-memory auth state (pending attempt and
    /// code); see `Authenticator::log_out`.
    fn end_session(&self) -> Result<(), AuthError>;
}

/// [`SessionStore`] over a [`KeyValueStore`]
#[derive(Clone)]
pub struct KvSessionStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
}

impl KvSessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

impl SessionStore for KvSessionStore {
    fn start_session(&self, account: &Account) -> Result<Session, AuthError> {
        let session = Session {
            account: account.clone(),
            started_at: Some(self.clock.now()),
        };
        self.store.save(KEY_SESSION, &session)?;

        info!(email = %session.email(), "session started");
        Ok(session)
    }

    fn current_session(&self) -> Result<Option<Session>, AuthError> {
        Ok(self.store.load(KEY_SESSION)?)
    }

    fn end_session(&self) -> Result<(), AuthError> {
        if let Some(session) = self.current_session()? {
            info!(email = %session.email(), "session ended");
        }
        self.store.remove(KEY_SESSION)?;
        Ok(())
    }
}
