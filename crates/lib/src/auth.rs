//! Authenticated session state with write-through persistence.
//!
//! The store holds the logged-in user (username, bearer token, avatar) and
//! the debug-mode flag, mirrored to a JSON state file on every change.
//! A malformed state file is discarded and removed at load time.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Authenticated user identity as returned by the backend login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_pic: Option<String>,
}

impl User {
    /// True when both required fields are present and non-empty.
    pub fn is_valid(&self) -> bool {
        !self.username.trim().is_empty() && !self.token.trim().is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid user: username and token must be non-empty")]
    InvalidUser,
    #[error("failed to persist session: {0}")]
    Persist(#[source] anyhow::Error),
}

/// On-disk shape of the session state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedState {
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    debug_mode: bool,
}

/// Session store: current user, debug flag, and the backing state file.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    user: Option<User>,
    debug_mode: bool,
}

impl SessionStore {
    /// Restore a session from `path`. Unreadable or malformed state (missing
    /// required user fields included) is discarded and the file removed, so a
    /// later load starts unauthenticated.
    pub fn load(path: PathBuf) -> Self {
        let mut store = Self {
            path,
            user: None,
            debug_mode: false,
        };
        let Ok(raw) = std::fs::read_to_string(&store.path) else {
            return store;
        };
        match serde_json::from_str::<PersistedState>(&raw) {
            Ok(state) => {
                match state.user {
                    Some(user) if user.is_valid() => {
                        log::debug!("restored session for {}", user.username);
                        store.user = Some(user);
                        store.debug_mode = state.debug_mode;
                    }
                    Some(_) => {
                        log::warn!("persisted user is missing required fields, clearing state");
                        store.clear_file();
                    }
                    None => {
                        store.debug_mode = state.debug_mode;
                    }
                }
            }
            Err(e) => {
                log::warn!("failed to parse session state, clearing: {}", e);
                store.clear_file();
            }
        }
        store
    }

    /// Load from the default state path (or PARLEY_STATE_PATH).
    pub fn load_default() -> Self {
        Self::load(crate::config::default_state_path())
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode
    }

    /// Bearer token of the current user, empty string when logged out.
    /// The mock client ignores it; remote calls require a logged-in user anyway.
    pub fn token(&self) -> &str {
        self.user.as_ref().map(|u| u.token.as_str()).unwrap_or("")
    }

    /// Store `user` and persist. Fails with a validation error before any IO
    /// when username or token is empty.
    pub fn login(&mut self, user: User) -> Result<(), AuthError> {
        if !user.is_valid() {
            return Err(AuthError::InvalidUser);
        }
        log::info!("logged in as {}", user.username);
        self.user = Some(user);
        self.save().map_err(AuthError::Persist)
    }

    /// Clear user and debug flag and erase persisted state.
    pub fn logout(&mut self) {
        log::info!("logging out");
        self.user = None;
        self.debug_mode = false;
        self.clear_file();
    }

    /// Toggle debug mode (mock backend) and persist.
    pub fn set_debug_mode(&mut self, debug: bool) -> Result<(), AuthError> {
        self.debug_mode = debug;
        self.save().map_err(AuthError::Persist)
    }

    /// The fixed identity used by the offline debug mode.
    pub fn debug_user() -> User {
        User {
            username: "Debug User".to_string(),
            token: "debug_token_123".to_string(),
            profile_pic: Some(
                "https://images.unsplash.com/photo-1472099645785-5658abf4ff4e?w=150&h=150&fit=crop&crop=face"
                    .to_string(),
            ),
        }
    }

    fn save(&self) -> Result<()> {
        let state = PersistedState {
            user: self.user.clone(),
            debug_mode: self.debug_mode,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating state dir {}", parent.display()))?;
        }
        let body = serde_json::to_string_pretty(&state).context("serializing session state")?;
        std::fs::write(&self.path, body)
            .with_context(|| format!("writing session state to {}", self.path.display()))
    }

    fn clear_file(&self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_state_path() -> PathBuf {
        std::env::temp_dir().join(format!("parley-state-{}.json", uuid::Uuid::new_v4()))
    }

    fn user(name: &str, token: &str) -> User {
        User {
            username: name.to_string(),
            token: token.to_string(),
            profile_pic: None,
        }
    }

    #[test]
    fn login_rejects_empty_fields() {
        let mut store = SessionStore::load(temp_state_path());
        assert!(matches!(
            store.login(user("", "tok")),
            Err(AuthError::InvalidUser)
        ));
        assert!(matches!(
            store.login(user("alice", "  ")),
            Err(AuthError::InvalidUser)
        ));
        assert!(store.user().is_none());
    }

    #[test]
    fn login_persists_and_reloads() {
        let path = temp_state_path();
        let mut store = SessionStore::load(path.clone());
        store.login(user("alice", "tok-1")).expect("login");
        store.set_debug_mode(true).expect("set debug");

        let restored = SessionStore::load(path.clone());
        assert_eq!(restored.user().map(|u| u.username.as_str()), Some("alice"));
        assert_eq!(restored.token(), "tok-1");
        assert!(restored.debug_mode());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn logout_clears_persisted_state() {
        let path = temp_state_path();
        let mut store = SessionStore::load(path.clone());
        store.login(user("alice", "tok-1")).expect("login");
        store.set_debug_mode(true).expect("set debug");
        store.logout();
        assert!(store.user().is_none());
        assert!(!store.debug_mode());

        // A fresh load is unauthenticated.
        let restored = SessionStore::load(path);
        assert!(restored.user().is_none());
        assert!(!restored.debug_mode());
    }

    #[test]
    fn malformed_state_is_discarded_and_removed() {
        let path = temp_state_path();
        std::fs::write(&path, "{not json").expect("write");
        let store = SessionStore::load(path.clone());
        assert!(store.user().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn persisted_user_missing_token_is_discarded() {
        let path = temp_state_path();
        std::fs::write(&path, r#"{"user":{"username":"alice","token":""}}"#).expect("write");
        let store = SessionStore::load(path.clone());
        assert!(store.user().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn debug_user_is_valid() {
        assert!(SessionStore::debug_user().is_valid());
    }
}
