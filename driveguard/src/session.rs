use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{DriveGuardError, Result};

/// Role granted by the role contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ADMIN_ROLE")]
    Admin,
    #[serde(rename = "POLICY_HOLDER_ROLE")]
    PolicyHolder,
    #[serde(rename = "NONE")]
    None,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN_ROLE",
            Role::PolicyHolder => "POLICY_HOLDER_ROLE",
            Role::None => "NONE",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = DriveGuardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ADMIN_ROLE" => Ok(Role::Admin),
            "POLICY_HOLDER_ROLE" => Ok(Role::PolicyHolder),
            "NONE" => Ok(Role::None),
            other => Err(DriveGuardError::Validation(format!(
                "unknown role '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connected wallet and the role it held when it logged in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub wallet_address: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(wallet_address: impl Into<String>, role: Role) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            wallet_address: wallet_address.into(),
            role,
            created_at: Utc::now(),
        }
    }
}

/// Trait for storing and retrieving sessions
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn save(&self, session: Session) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Session>>;
    async fn delete(&self, id: &str) -> Result<()>;
}

/// In-memory implementation of SessionStorage
pub struct InMemorySessionStorage {
    sessions: Arc<DashMap<String, Session>>,
}

impl InMemorySessionStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemorySessionStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorage for InMemorySessionStorage {
    async fn save(&self, session: Session) -> Result<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(id).map(|entry| entry.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.sessions.remove(id);
        Ok(())
    }
}
