use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::session::AuthState;
use crate::api::SessionHook;
use crate::config::{AppConfig, MappingTable};
use crate::error::Result;
use crate::storage::{StorageEvent, StorageHub};

/// Response body key under which the backend embeds an updated session.
pub const SESSION_RESPONSE_KEY: &str = "auth";

/// Holds the current session, persists it, and follows changes made by other
/// instances sharing the same [`StorageHub`].
pub struct AuthStore {
    key: String,
    logout_header: String,
    scopes: MappingTable,
    hub: StorageHub,
    origin: Uuid,
    state: Arc<watch::Sender<AuthState>>,
    listener: Option<JoinHandle<()>>,
}

impl AuthStore {
    /// Open the store, restoring any persisted session.
    ///
    /// When called inside a tokio runtime a listener task applies changes
    /// announced by other instances; outside a runtime the store still works
    /// but does not follow remote changes.
    pub fn open(
        hub: StorageHub,
        key: impl Into<String>,
        logout_header: impl Into<String>,
        scopes: MappingTable,
    ) -> Self {
        let key = key.into();
        // Subscribe before reading so no change slips between the two.
        let events = hub.subscribe();
        let (tx, _) = watch::channel(load_state(&hub, &key));
        let state = Arc::new(tx);
        let origin = Uuid::new_v4();

        let listener = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(follow_remote_changes(
                events,
                hub.clone(),
                key.clone(),
                origin,
                state.clone(),
            ))),
            Err(_) => {
                tracing::debug!(key = %key, "No runtime, remote session changes will not be followed");
                None
            }
        };

        Self {
            key,
            logout_header: logout_header.into(),
            scopes,
            hub,
            origin,
            state,
            listener,
        }
    }

    /// Open with the storage key, logout header and scope table from config.
    pub fn from_config(config: &AppConfig, hub: StorageHub) -> Self {
        Self::open(
            hub,
            config.auth_key.clone(),
            config.auth_logout_header.clone(),
            config.scopes.clone(),
        )
    }

    /// Current session snapshot.
    pub fn state(&self) -> AuthState {
        self.state.borrow().clone()
    }

    /// Receive every session change, local or remote.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    /// Persist the session, then replace it wholesale.
    ///
    /// A failed write leaves the in-memory session untouched.
    pub fn set(&self, state: AuthState) -> Result<()> {
        let raw = serde_json::to_string(&state)?;
        self.hub.set(&self.key, &raw, self.origin)?;
        self.state.send_replace(state);
        Ok(())
    }

    /// Remove the persisted copy, then clear the session.
    pub fn logout(&self) -> Result<()> {
        self.hub.remove(&self.key, self.origin)?;
        self.state.send_replace(AuthState::default());
        Ok(())
    }

    /// Check a scope by name against the current session.
    pub fn has_scope(&self, name: &str) -> bool {
        self.state.borrow().has_scope(name, &self.scopes)
    }

    /// Apply session side effects of an API response.
    ///
    /// The logout header wins over an embedded session.
    pub fn apply_response(
        &self,
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
    ) -> Result<()> {
        if headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case(&self.logout_header))
        {
            tracing::warn!(header = %self.logout_header, "Backend invalidated the session");
            return self.logout();
        }

        let session = body
            .and_then(|b| b.get(SESSION_RESPONSE_KEY))
            .filter(|v| v.is_object());
        if let Some(session) = session {
            let state: AuthState = serde_json::from_value(session.clone())?;
            tracing::debug!(
                authenticated = state.is_authenticated(),
                "Session replaced from response"
            );
            return self.set(state);
        }

        Ok(())
    }
}

impl SessionHook for AuthStore {
    fn on_response(&self, headers: &BTreeMap<String, String>, body: Option<&Value>) {
        if let Err(e) = self.apply_response(headers, body) {
            tracing::warn!(error = %e, "Failed to apply session from response");
        }
    }
}

impl Drop for AuthStore {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

impl std::fmt::Debug for AuthStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthStore")
            .field("key", &self.key)
            .field("origin", &self.origin)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

fn load_state(hub: &StorageHub, key: &str) -> AuthState {
    match hub.get(key) {
        Ok(Some(raw)) => parse_state(&raw),
        Ok(None) => AuthState::default(),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Failed to read persisted session");
            AuthState::default()
        }
    }
}

fn parse_state(raw: &str) -> AuthState {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Discarding unreadable persisted session");
        AuthState::default()
    })
}

async fn follow_remote_changes(
    mut events: broadcast::Receiver<StorageEvent>,
    hub: StorageHub,
    key: String,
    origin: Uuid,
    state: Arc<watch::Sender<AuthState>>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if event.key != key || event.origin == origin {
                    continue;
                }
                let next = event
                    .value
                    .as_deref()
                    .map(parse_state)
                    .unwrap_or_default();
                state.send_replace(next);
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Session listener lagged, reloading from storage");
                state.send_replace(load_state(&hub, &key));
            }
            Err(RecvError::Closed) => break,
        }
    }
}
