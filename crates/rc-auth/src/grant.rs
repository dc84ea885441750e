use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::client::{MsGrant, RcAuthClient};
use crate::device_code::{DeviceCode, DeviceCodeFlow};
use crate::errors::{RcAuthError, Result};

/// Obtains Microsoft tokens with the user's involvement, used when there is
/// no refresh token or the one on file was rejected.
#[async_trait]
pub trait InteractiveGrant: Send + Sync {
    async fn authorize(&self, client: &RcAuthClient, cancel: &CancellationToken)
    -> Result<MsGrant>;
}

/// Shows the device code to the user
#[async_trait]
pub trait DeviceCodePrompt: Send + Sync {
    async fn present(&self, code: &DeviceCode);
}

/// Device authorization grant driven by a [`DeviceCodeFlow`]
#[derive(Debug)]
pub struct DeviceCodeGrant<P> {
    prompt: P,
}

impl<P: DeviceCodePrompt> DeviceCodeGrant<P> {
    pub fn new(prompt: P) -> Self {
        Self { prompt }
    }
}

#[async_trait]
impl<P: DeviceCodePrompt> InteractiveGrant for DeviceCodeGrant<P> {
    async fn authorize(
        &self,
        client: &RcAuthClient,
        cancel: &CancellationToken,
    ) -> Result<MsGrant> {
        let mut flow = DeviceCodeFlow::new(client.clone());
        let code = flow.request_code(cancel).await?;
        self.prompt.present(&code).await;
        flow.poll(cancel).await
    }
}

/// Asks the user to open the authorize URL and hand back the redirect URL
/// the browser landed on
#[async_trait]
pub trait RedirectPrompt: Send + Sync {
    async fn redirect_url(&self, authorize_url: &Url) -> Result<String>;
}

/// Authorization code grant for the desktop redirect flow
#[derive(Debug)]
pub struct AuthorizationCodeGrant<P> {
    prompt: P,
}

impl<P: RedirectPrompt> AuthorizationCodeGrant<P> {
    pub fn new(prompt: P) -> Self {
        Self { prompt }
    }
}

#[async_trait]
impl<P: RedirectPrompt> InteractiveGrant for AuthorizationCodeGrant<P> {
    async fn authorize(
        &self,
        client: &RcAuthClient,
        cancel: &CancellationToken,
    ) -> Result<MsGrant> {
        let state = random_state()?;
        let url = client.build_authorize_url(Some(state.clone()))?;
        info!("Waiting for the user to complete sign-in in the browser");

        let redirect =
            crate::client::cancellable(cancel, self.prompt.redirect_url(&url)).await?;
        let code = client.parse_redirect(&redirect, Some(&state))?;
        crate::client::cancellable(cancel, client.exchange_code(&code)).await
    }
}

/// 128 bits from the OS RNG, hex encoded, for the OAuth `state` parameter
fn random_state() -> Result<String> {
    let mut bytes = [0u8; 16];
    getrandom::fill(&mut bytes)
        .map_err(|e| RcAuthError::InvalidResponse(format!("OS random source failed: {e}")))?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Endpoints, RcAuthConfig};
    use rc_core::testing::{ScriptedReply, ScriptedSender};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const BASE: &str = "http://grant.test";

    fn client(sender: Arc<ScriptedSender>) -> RcAuthClient {
        let mut config = RcAuthConfig::default();
        config.endpoints = Endpoints::with_base(BASE);
        config.device_code.min_interval = Duration::from_millis(5);
        RcAuthClient::new(config, sender)
    }

    #[derive(Default)]
    struct RecordingPrompt {
        shown: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DeviceCodePrompt for Arc<RecordingPrompt> {
        async fn present(&self, code: &DeviceCode) {
            self.shown.lock().unwrap().push(code.user_code.clone());
        }
    }

    #[tokio::test]
    async fn test_device_code_grant_presents_code_then_polls() {
        let sender = Arc::new(ScriptedSender::new());
        sender.on(
            format!("{BASE}/consumers/oauth2/v2.0/devicecode"),
            ScriptedReply::json(
                200,
                json!({"device_code": "d", "user_code": "WXYZ", "verification_uri": "https://microsoft.com/link", "expires_in": 600}),
            ),
        );
        sender.on(
            format!("{BASE}/consumers/oauth2/v2.0/token"),
            ScriptedReply::json(200, json!({"access_token": "ms", "refresh_token": "r", "expires_in": 3600})),
        );

        let prompt = Arc::new(RecordingPrompt::default());
        let grant = DeviceCodeGrant::new(prompt.clone());
        let result = grant
            .authorize(&client(sender), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.tokens.access_token.expose(), "ms");
        assert_eq!(*prompt.shown.lock().unwrap(), vec!["WXYZ".to_string()]);
    }

    struct EchoRedirect {
        code: &'static str,
        tamper_state: bool,
    }

    #[async_trait]
    impl RedirectPrompt for EchoRedirect {
        async fn redirect_url(&self, authorize_url: &Url) -> Result<String> {
            let params: HashMap<_, _> = authorize_url.query_pairs().into_owned().collect();
            let state = if self.tamper_state {
                "forged".to_string()
            } else {
                params["state"].clone()
            };
            Ok(format!(
                "https://login.live.com/oauth20_desktop.srf?code={}&state={}",
                self.code, state
            ))
        }
    }

    #[tokio::test]
    async fn test_authorization_code_grant_exchanges_code() {
        let sender = Arc::new(ScriptedSender::new());
        sender.on(
            format!("{BASE}/oauth20_token.srf"),
            ScriptedReply::json(200, json!({"access_token": "ms", "refresh_token": "r", "expires_in": 3600})),
        );

        let grant = AuthorizationCodeGrant::new(EchoRedirect {
            code: "M.code",
            tamper_state: false,
        });
        let result = grant
            .authorize(&client(sender.clone()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.refresh_token.unwrap().expose(), "r");
        let body = sender.requests()[0].body_text().unwrap();
        assert!(body.contains("code=M.code"));
        assert!(body.contains("grant_type=authorization_code"));
    }

    #[tokio::test]
    async fn test_authorization_code_grant_rejects_forged_state() {
        let sender = Arc::new(ScriptedSender::new());
        let grant = AuthorizationCodeGrant::new(EchoRedirect {
            code: "M.code",
            tamper_state: true,
        });
        let err = grant
            .authorize(&client(sender.clone()), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, RcAuthError::StateMismatch));
        assert!(sender.requests().is_empty());
    }

    #[test]
    fn test_random_state_is_lowercase_hex_and_unique() {
        let first = random_state().unwrap();
        let second = random_state().unwrap();

        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert_ne!(first, second);
    }
}
