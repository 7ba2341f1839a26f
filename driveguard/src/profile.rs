use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{error::Result, session::Role};

/// Document stored in the `Users` collection, keyed by wallet address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub wallet_address: String,
    pub role: Role,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Insert or replace the profile for `profile.wallet_address`
    async fn put(&self, profile: UserProfile) -> Result<()>;
    async fn get(&self, wallet_address: &str) -> Result<Option<UserProfile>>;
}

/// In-memory implementation of ProfileStore
pub struct InMemoryProfileStore {
    users: Arc<DashMap<String, UserProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self {
            users: Arc::new(DashMap::new()),
        }
    }
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn put(&self, profile: UserProfile) -> Result<()> {
        self.users.insert(profile.wallet_address.clone(), profile);
        Ok(())
    }

    async fn get(&self, wallet_address: &str) -> Result<Option<UserProfile>> {
        Ok(self.users.get(wallet_address).map(|entry| entry.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_replaces_by_wallet() {
        let store = InMemoryProfileStore::new();
        let mut profile = UserProfile {
            first_name: "Somchai".to_string(),
            last_name: "Jaidee".to_string(),
            email: "old@example.com".to_string(),
            wallet_address: "0xabc".to_string(),
            role: Role::PolicyHolder,
        };
        store.put(profile.clone()).await.unwrap();

        profile.email = "new@example.com".to_string();
        store.put(profile.clone()).await.unwrap();

        assert_eq!(store.get("0xabc").await.unwrap(), Some(profile));
        assert!(store.get("0xdef").await.unwrap().is_none());
    }
}
