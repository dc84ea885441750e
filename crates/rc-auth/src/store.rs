use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::errors::{RcAuthError, Result};
use crate::session::TokenChainState;

/// Trait for storing and retrieving per-account token chains
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the chain stored under `account_key`
    async fn load(&self, account_key: &str) -> Result<Option<TokenChainState>>;

    /// Save the chain under `account_key`, replacing what was there
    async fn save(&self, account_key: &str, state: &TokenChainState) -> Result<()>;

    /// Remove the chain stored under `account_key`
    async fn remove(&self, account_key: &str) -> Result<()>;

    /// List all stored account keys
    async fn list_accounts(&self) -> Result<Vec<String>>;
}

/// In-memory token store for testing and simple use cases
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    chains: Arc<RwLock<HashMap<String, TokenChainState>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> RcAuthError {
    RcAuthError::Store("Lock poisoned".to_string())
}

#[async_trait::async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self, account_key: &str) -> Result<Option<TokenChainState>> {
        Ok(self.chains.read().map_err(poisoned)?.get(account_key).cloned())
    }

    async fn save(&self, account_key: &str, state: &TokenChainState) -> Result<()> {
        self.chains
            .write()
            .map_err(poisoned)?
            .insert(account_key.to_string(), state.clone());
        Ok(())
    }

    async fn remove(&self, account_key: &str) -> Result<()> {
        self.chains.write().map_err(poisoned)?.remove(account_key);
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.chains.read().map_err(poisoned)?.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryTokenStore::new();
        let state = TokenChainState::with_refresh_token("refresh");

        store.save("b-account", &state).await.unwrap();
        store.save("a-account", &TokenChainState::default()).await.unwrap();

        assert_eq!(store.load("b-account").await.unwrap(), Some(state));
        assert_eq!(
            store.list_accounts().await.unwrap(),
            vec!["a-account".to_string(), "b-account".to_string()]
        );

        store.remove("b-account").await.unwrap();
        assert_eq!(store.load("b-account").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemoryTokenStore::new();
        let other = store.clone();
        store
            .save("acc", &TokenChainState::with_refresh_token("r"))
            .await
            .unwrap();
        assert!(other.load("acc").await.unwrap().is_some());
    }
}
