use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MappingTable;

/// The signed-in user as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Id in the user role table.
    pub user_role_id: u32,
    /// Fields this client does not interpret.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Descriptor of the access token backing the session.
///
/// The secret itself travels as an HTTP-only cookie and never appears here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: i64,
    /// Expiration time.
    pub expiry: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl AccessToken {
    /// Check if the token is expired.
    pub fn is_expired(&self) -> bool {
        self.expiry < Utc::now()
    }
}

/// Session snapshot: current user, granted scopes and token descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub scope_ids: Vec<u32>,
    #[serde(default)]
    pub access_token: Option<AccessToken>,
}

impl AuthState {
    /// A user is present and the token, if any, has not expired.
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
            && !self
                .access_token
                .as_ref()
                .map(AccessToken::is_expired)
                .unwrap_or(false)
    }

    pub fn has_scope_id(&self, id: u32) -> bool {
        self.scope_ids.contains(&id)
    }

    /// Check a scope by name through the scope table.
    pub fn has_scope(&self, name: &str, scopes: &MappingTable) -> bool {
        scopes.id(name).map(|id| self.has_scope_id(id)).unwrap_or(false)
    }

    /// Names of the granted scopes; ids unknown to the table are skipped.
    pub fn scope_names<'a>(&self, scopes: &'a MappingTable) -> Vec<&'a str> {
        self.scope_ids.iter().filter_map(|id| scopes.name(*id)).collect()
    }
}
