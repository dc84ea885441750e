use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::{MsGrant, RcAuthClient, cancellable};
use crate::errors::{RcAuthError, Result};
use crate::grant::InteractiveGrant;
use crate::secret::SecretString;
use crate::session::{ChainStage, Session, TokenChainState};
use crate::store::TokenStore;

/// Hands out Minecraft sessions, re-deriving only the stages of an account's
/// token chain that have gone stale.
///
/// Calls for the same account are serialized: a second caller waits for the
/// derivation in flight and then finds its result in the store. Different
/// accounts proceed independently.
pub struct TokenChainManager {
    client: RcAuthClient,
    store: Arc<dyn TokenStore>,
    grant: Option<Arc<dyn InteractiveGrant>>,
    accounts: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl std::fmt::Debug for TokenChainManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenChainManager")
            .field("client", &self.client)
            .field("interactive", &self.grant.is_some())
            .finish_non_exhaustive()
    }
}

impl TokenChainManager {
    pub fn new(client: RcAuthClient, store: Arc<dyn TokenStore>) -> Self {
        Self {
            client,
            store,
            grant: None,
            accounts: Mutex::new(HashMap::new()),
        }
    }

    /// Grant used when the account has no usable refresh token
    pub fn with_interactive_grant(mut self, grant: Arc<dyn InteractiveGrant>) -> Self {
        self.grant = Some(grant);
        self
    }

    pub fn client(&self) -> &RcAuthClient {
        &self.client
    }

    fn account_lock(&self, account_key: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut accounts = self
            .accounts
            .lock()
            .map_err(|_| RcAuthError::Store("Lock poisoned".to_string()))?;
        Ok(accounts.entry(account_key.to_string()).or_default().clone())
    }

    fn skew(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.client.config().expiry_skew)
            .unwrap_or_else(|_| chrono::Duration::zero())
    }

    /// Session for `account_key`, deriving whatever part of the chain is
    /// missing or expired.
    #[instrument(skip(self, cancel))]
    pub async fn get_authorized_session(
        &self,
        account_key: &str,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        let lock = self.account_lock(account_key)?;
        let _guard = tokio::select! {
            _ = cancel.cancelled() => return Err(RcAuthError::Cancelled),
            guard = lock.lock() => guard,
        };

        let mut state = self.store.load(account_key).await?.unwrap_or_default();
        let stale = state.first_stale_stage(Utc::now(), self.skew());
        if let (None, Some(session)) = (stale, state.session()) {
            debug!("Cached session is still valid");
            return Ok(session);
        }
        let stale = stale.unwrap_or(ChainStage::Minecraft);

        info!(stage = %stale, "Re-deriving token chain");
        match self.derive_from(stale, &mut state, cancel).await {
            Ok(session) => {
                self.store.save(account_key, &state).await?;
                info!(profile = %session.profile.name, "Session ready");
                Ok(session)
            }
            Err(e) => {
                // Stages derived before the failure stay usable for the next attempt
                let persisted = if state.refresh_token.is_none() && state.microsoft.is_none() {
                    self.store.remove(account_key).await
                } else {
                    self.store.save(account_key, &state).await
                };
                if let Err(store_err) = persisted {
                    warn!(error = %store_err, "Failed to persist partial token chain");
                }
                Err(e)
            }
        }
    }

    /// Session from the store if the whole chain is still valid. Never
    /// touches the network.
    pub async fn cached_session(&self, account_key: &str) -> Result<Option<Session>> {
        let state = self.store.load(account_key).await?;
        Ok(state.and_then(|s| match s.first_stale_stage(Utc::now(), self.skew()) {
            None => s.session(),
            Some(_) => None,
        }))
    }

    /// Seed an account with a refresh token obtained elsewhere. Any chain
    /// already stored for the account is replaced.
    #[instrument(skip(self, refresh_token))]
    pub async fn import_refresh_token(
        &self,
        account_key: &str,
        refresh_token: impl Into<SecretString>,
    ) -> Result<()> {
        let lock = self.account_lock(account_key)?;
        let _guard = lock.lock().await;
        self.store
            .save(account_key, &TokenChainState::with_refresh_token(refresh_token))
            .await
    }

    #[instrument(skip(self))]
    pub async fn sign_out(&self, account_key: &str) -> Result<()> {
        let lock = self.account_lock(account_key)?;
        let _guard = lock.lock().await;
        self.store.remove(account_key).await?;

        let mut accounts = self
            .accounts
            .lock()
            .map_err(|_| RcAuthError::Store("Lock poisoned".to_string()))?;
        // Keep the entry while another caller still waits on it
        if Arc::strong_count(&lock) <= 2 {
            accounts.remove(account_key);
        }
        info!("Signed out");
        Ok(())
    }

    pub async fn accounts(&self) -> Result<Vec<String>> {
        self.store.list_accounts().await
    }

    async fn derive_from(
        &self,
        stage: ChainStage,
        state: &mut TokenChainState,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        state.invalidate_from(stage);

        if state.microsoft.is_none() {
            self.microsoft_stage(state, cancel).await?;
        }

        if state.xbox_live.is_none() {
            let ms = state
                .microsoft
                .as_ref()
                .map(|m| m.access_token.clone())
                .ok_or(RcAuthError::MissingRefreshToken)?;
            let xbl = self
                .run_stage(ChainStage::XboxLive, cancel, || {
                    self.client.xbl_authenticate(&ms)
                })
                .await?;
            state.xbox_live = Some(xbl);
        }

        if state.xsts.is_none() {
            let xbl = state
                .xbox_live
                .clone()
                .ok_or_else(|| RcAuthError::InvalidResponse("missing Xbox Live token".into()))?;
            let xsts = self
                .run_stage(ChainStage::Xsts, cancel, || self.client.xsts_authorize(&xbl))
                .await?;
            state.xsts = Some(xsts);
        }

        let xsts = state
            .xsts
            .clone()
            .ok_or_else(|| RcAuthError::InvalidResponse("missing XSTS token".into()))?;
        let mc = self
            .run_stage(ChainStage::Minecraft, cancel, || self.client.mc_login(&xsts))
            .await?;
        let mc_access = mc.access_token.clone();
        state.minecraft = Some(mc);

        let profile = self
            .run_stage(ChainStage::Minecraft, cancel, || {
                self.client.fetch_profile(&mc_access)
            })
            .await?;
        state.profile = Some(profile);

        state
            .session()
            .ok_or_else(|| RcAuthError::InvalidResponse("incomplete token chain".into()))
    }

    /// Refresh-token exchange, falling back to the interactive grant when
    /// there is no refresh token or Microsoft rejects it
    async fn microsoft_stage(
        &self,
        state: &mut TokenChainState,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let grant = match state.refresh_token.clone() {
            Some(refresh) => {
                let refreshed = self
                    .run_stage(ChainStage::Microsoft, cancel, || {
                        self.client.refresh_ms_token(&refresh)
                    })
                    .await;
                match refreshed {
                    Ok(grant) => grant,
                    Err(RcAuthError::OAuthInvalidGrant) if self.grant.is_some() => {
                        warn!("Refresh token rejected, falling back to interactive sign-in");
                        state.refresh_token = None;
                        self.interactive(cancel).await?
                    }
                    Err(RcAuthError::OAuthInvalidGrant) => {
                        state.refresh_token = None;
                        return Err(RcAuthError::OAuthInvalidGrant);
                    }
                    Err(e) => return Err(e),
                }
            }
            None => self.interactive(cancel).await?,
        };

        state.microsoft = Some(grant.tokens);
        if let Some(refresh) = grant.refresh_token {
            state.refresh_token = Some(refresh);
        }
        Ok(())
    }

    async fn interactive(&self, cancel: &CancellationToken) -> Result<MsGrant> {
        let grant = self.grant.as_ref().ok_or(RcAuthError::MissingRefreshToken)?;
        info!("Starting interactive sign-in");
        grant.authorize(&self.client, cancel).await
    }

    /// Run one stage request, retrying transient failures per the retry policy
    async fn run_stage<T, F, Fut>(
        &self,
        stage: ChainStage,
        cancel: &CancellationToken,
        mut request: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = &self.client.config().retry;
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(RcAuthError::Cancelled);
            }
            match cancellable(cancel, request()).await {
                Ok(value) => {
                    debug!(%stage, "Stage derived");
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                    attempt += 1;
                    warn!(%stage, attempt, error = %e, "Transient failure, retrying stage");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RcAuthError::Cancelled),
                        _ = tokio::time::sleep(policy.base_delay * attempt) => {}
                    }
                }
                Err(e) => {
                    warn!(%stage, error = %e, "Stage failed");
                    return Err(e);
                }
            }
        }
    }
}
