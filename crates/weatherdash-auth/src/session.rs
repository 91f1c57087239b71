//! Signed-in user context.
//!
//! Only an authenticated session may change the refresh schedule; the poller
//! asks an [`AuthContext`] before every reconfiguration.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Access level granting admin rights.
pub const ACCESS_LEVEL_ADMIN: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub access_level: u8,
}

impl User {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            name: name.into(),
            access_level: 0,
        }
    }

    pub fn with_access_level(mut self, level: u8) -> Self {
        self.access_level = level;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.access_level == ACCESS_LEVEL_ADMIN
    }
}

/// Answers "who is signed in right now".
pub trait AuthContext: Send + Sync {
    fn current_user(&self) -> Option<UserId>;

    fn is_authenticated(&self) -> bool {
        self.current_user().is_some()
    }
}

/// In-process session holding at most one signed-in user.
#[derive(Debug, Default)]
pub struct Session {
    user: RwLock<Option<User>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session that starts out signed in.
    pub fn signed_in(user: User) -> Self {
        Self {
            user: RwLock::new(Some(user)),
        }
    }

    pub fn sign_in(&self, user: User) {
        tracing::info!("User {} signed in", user.id);
        *self.user.write() = Some(user);
    }

    pub fn sign_out(&self) {
        if let Some(user) = self.user.write().take() {
            tracing::info!("User {} signed out", user.id);
        }
    }

    pub fn user(&self) -> Option<User> {
        self.user.read().clone()
    }

    pub fn is_admin(&self) -> bool {
        self.user.read().as_ref().map(User::is_admin).unwrap_or(false)
    }
}

impl AuthContext for Session {
    fn current_user(&self) -> Option<UserId> {
        self.user.read().as_ref().map(|u| u.id.clone())
    }
}
