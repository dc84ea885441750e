use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rc_core::{HttpRequest, HttpResponse, HttpSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use crate::config::{AuthorizeFlavor, RP_MINECRAFT, RP_XBOX_AUTH, RcAuthConfig, official};
use crate::errors::{RcAuthError, Result, XstsError};
use crate::models::*;
use crate::secret::SecretString;
use crate::session::{McToken, MsTokens, XboxToken};

/// Microsoft OAuth grant result: the access token stage plus the refresh
/// token to keep for next time.
#[derive(Debug, Clone)]
pub struct MsGrant {
    pub tokens: MsTokens,
    pub refresh_token: Option<SecretString>,
}

impl From<MsTokenResponse> for MsGrant {
    fn from(response: MsTokenResponse) -> Self {
        Self {
            tokens: MsTokens::new(response.access_token, response.expires_in),
            refresh_token: response.refresh_token.map(SecretString::new),
        }
    }
}

/// One request per chain hop. Retry, cancellation and ordering live in
/// [`crate::TokenChainManager`].
#[derive(Clone)]
pub struct RcAuthClient {
    config: RcAuthConfig,
    http: Arc<dyn HttpSender>,
}

impl std::fmt::Debug for RcAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcAuthClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RcAuthClient {
    /// Create a new authentication client
    pub fn new(config: RcAuthConfig, http: Arc<dyn HttpSender>) -> Self {
        Self { config, http }
    }

    pub fn config(&self) -> &RcAuthConfig {
        &self.config
    }

    pub(crate) fn http(&self) -> &dyn HttpSender {
        self.http.as_ref()
    }

    fn request_post(&self, url: &str) -> HttpRequest {
        HttpRequest::post(url).timeout(self.config.request_timeout)
    }

    /// Build the authorization URL for the user to visit
    #[instrument(skip(self))]
    pub fn build_authorize_url(&self, state: Option<String>) -> Result<Url> {
        let mut url = Url::parse(&self.config.endpoints.ms_authorize)?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", self.config.scope())
            .append_pair("prompt", "select_account");

        if self.config.authorize_flavor == AuthorizeFlavor::OfficialDesktop {
            for (key, value) in official::EXTRA_PARAMS {
                url.query_pairs_mut().append_pair(key, value);
            }
        }

        if let Some(s) = state {
            url.query_pairs_mut().append_pair("state", &s);
        }

        debug!("Built authorize URL: {}", url);
        Ok(url)
    }

    /// Parse the redirect URL and extract the authorization code
    #[instrument(skip(self, redirect_url))]
    pub fn parse_redirect(
        &self,
        redirect_url: &str,
        expected_state: Option<&str>,
    ) -> Result<SecretString> {
        let url = Url::parse(redirect_url)?;
        let params: HashMap<_, _> = url.query_pairs().collect();

        if let Some(error) = params.get("error") {
            if error == "access_denied" {
                return Err(RcAuthError::UserCancelled);
            }
            return Err(RcAuthError::InvalidRedirect);
        }

        if let Some(expected) = expected_state {
            match params.get("state") {
                Some(actual) if actual == expected => {}
                _ => return Err(RcAuthError::StateMismatch),
            }
        }

        params
            .get("code")
            .map(|c| SecretString::new(c.to_string()))
            .ok_or(RcAuthError::InvalidRedirect)
    }

    /// Exchange authorization code for Microsoft tokens
    #[instrument(skip(self, code))]
    pub async fn exchange_code(&self, code: &SecretString) -> Result<MsGrant> {
        debug!("Exchanging authorization code for tokens");
        let request = self.request_post(&self.config.endpoints.ms_token).form(&[
            ("client_id", self.config.client_id.as_str()),
            ("code", code.expose()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
            ("scope", self.config.scope()),
        ]);
        let response = self.http.send(request).await?;
        read_ms_token(response).await
    }

    /// Refresh Microsoft tokens using refresh_token
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_ms_token(&self, refresh_token: &SecretString) -> Result<MsGrant> {
        debug!("Refreshing Microsoft access token");
        let request = self.request_post(&self.config.endpoints.ms_token).form(&[
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token.expose()),
            ("grant_type", "refresh_token"),
            ("scope", self.config.scope()),
        ]);
        let response = self.http.send(request).await?;
        read_ms_token(response).await
    }

    /// Authenticate with Xbox Live
    #[instrument(skip(self, ms_access_token))]
    pub async fn xbl_authenticate(&self, ms_access_token: &SecretString) -> Result<XboxToken> {
        let body = XblAuthRequest {
            properties: XblAuthProperties {
                auth_method: "RPS".to_string(),
                site_name: "user.auth.xboxlive.com".to_string(),
                rps_ticket: format!("d={}", ms_access_token.expose()),
            },
            relying_party: RP_XBOX_AUTH.to_string(),
            token_type: "JWT".to_string(),
        };

        debug!("Authenticating with Xbox Live");
        let request = self
            .request_post(&self.config.endpoints.xbl_authenticate)
            .json(&body)?;
        let response = self.http.send(request).await?;

        if response.status() == 401 {
            return Err(RcAuthError::InvalidMicrosoftToken);
        }
        let response = response.error_for_status().await?;

        let xbl: XboxTokenResponse = response.json().await?;
        xbox_token(xbl)
    }

    /// Authorize with XSTS for the Minecraft relying party
    #[instrument(skip(self, xbl_token))]
    pub async fn xsts_authorize(&self, xbl_token: &XboxToken) -> Result<XboxToken> {
        let body = XstsAuthRequest {
            properties: XstsAuthProperties {
                sandbox_id: "RETAIL".to_string(),
                user_tokens: vec![xbl_token.token.expose().to_string()],
            },
            relying_party: RP_MINECRAFT.to_string(),
            token_type: "JWT".to_string(),
        };

        debug!("Authorizing with XSTS");
        let request = self
            .request_post(&self.config.endpoints.xsts_authorize)
            .json(&body)?;
        let response = self.http.send(request).await?;

        if response.status() == 401 {
            let body = response.bytes().await?;
            return match serde_json::from_slice::<XstsErrorResponse>(&body) {
                Ok(error_response) => Err(XstsError::from_xerr(error_response.xerr).into()),
                Err(_) => Err(RcAuthError::Http {
                    status: 401,
                    body_snippet: String::from_utf8_lossy(&body).chars().take(200).collect(),
                }),
            };
        }
        let response = response.error_for_status().await?;

        let xsts: XboxTokenResponse = response.json().await?;
        xbox_token(xsts)
    }

    /// Login to Minecraft with XSTS token
    #[instrument(skip(self, xsts))]
    pub async fn mc_login(&self, xsts: &XboxToken) -> Result<McToken> {
        let identity_token = format!("XBL3.0 x={};{}", xsts.user_hash, xsts.token.expose());
        let body = McLoginRequest { identity_token };

        debug!("Logging in to Minecraft Services");
        let request = self.request_post(&self.config.endpoints.mc_login).json(&body)?;
        let response = self.http.send(request).await?.error_for_status().await?;

        let mc_response: McLoginResponse = response.json().await?;
        Ok(McToken::new(mc_response.access_token, mc_response.expires_in))
    }

    /// Fetch Minecraft profile, which doubles as the ownership check
    #[instrument(skip(self, mc_access_token))]
    pub async fn fetch_profile(&self, mc_access_token: &SecretString) -> Result<McProfile> {
        debug!("Fetching Minecraft profile");
        let request = HttpRequest::get(&self.config.endpoints.mc_profile)
            .timeout(self.config.request_timeout)
            .bearer(mc_access_token.expose());
        let response = self.http.send(request).await?;

        if response.status() == 404 {
            return Err(RcAuthError::NoGameOwnership);
        }
        let response = response.error_for_status().await?;

        let profile: McProfile = response.json().await?;
        Ok(profile)
    }
}

async fn read_ms_token(response: HttpResponse) -> Result<MsGrant> {
    if response.is_success() {
        let token_response: MsTokenResponse = response.json().await?;
        return Ok(token_response.into());
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let invalid_grant = serde_json::from_str::<OAuthErrorResponse>(&body)
        .map(|e| e.error == "invalid_grant")
        .unwrap_or_else(|_| body.contains("invalid_grant"));
    if invalid_grant {
        return Err(RcAuthError::OAuthInvalidGrant);
    }

    Err(RcAuthError::Http {
        status,
        body_snippet: body.chars().take(200).collect(),
    })
}

/// Race `fut` against `cancel`, dropping the request if cancellation wins
pub(crate) async fn cancellable<T, E, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    RcAuthError: From<E>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(RcAuthError::Cancelled),
        result = fut => result.map_err(RcAuthError::from),
    }
}

fn xbox_token(response: XboxTokenResponse) -> Result<XboxToken> {
    let uhs = response
        .user_hash()
        .ok_or_else(|| RcAuthError::InvalidResponse("Missing XUI claims".to_string()))?
        .to_string();
    Ok(XboxToken::new(response.token, uhs, response.not_after.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoints;
    use rc_core::testing::{ScriptedReply, ScriptedSender};
    use serde_json::json;

    const BASE: &str = "http://auth.test";

    fn client(sender: Arc<ScriptedSender>) -> RcAuthClient {
        let mut config = RcAuthConfig::official_desktop();
        config.endpoints = Endpoints::with_base(BASE);
        RcAuthClient::new(config, sender)
    }

    fn xbox_reply(token: &str) -> ScriptedReply {
        ScriptedReply::json(
            200,
            json!({
                "Token": token,
                "NotAfter": "2099-01-01T00:00:00.0000000Z",
                "DisplayClaims": {"xui": [{"uhs": "userhash"}]}
            }),
        )
    }

    #[test]
    fn test_build_authorize_url_official() {
        let client = RcAuthClient::new(
            RcAuthConfig::official_desktop(),
            Arc::new(ScriptedSender::new()),
        );
        let url = client.build_authorize_url(Some("xyz".to_string())).unwrap();
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], official::CLIENT_ID);
        assert_eq!(params["scope"], official::SCOPE);
        assert_eq!(params["state"], "xyz");
        assert_eq!(params["nopa"], "2");
    }

    #[test]
    fn test_parse_redirect() {
        let client = client(Arc::new(ScriptedSender::new()));

        let code = client
            .parse_redirect("https://login.live.com/oauth20_desktop.srf?code=M.abc&state=s1", Some("s1"))
            .unwrap();
        assert_eq!(code.expose(), "M.abc");

        assert!(matches!(
            client.parse_redirect("https://x/?code=a&state=other", Some("s1")),
            Err(RcAuthError::StateMismatch)
        ));
        assert!(matches!(
            client.parse_redirect("https://x/?error=access_denied", None),
            Err(RcAuthError::UserCancelled)
        ));
        assert!(matches!(
            client.parse_redirect("https://x/?foo=bar", None),
            Err(RcAuthError::InvalidRedirect)
        ));
    }

    #[tokio::test]
    async fn test_refresh_invalid_grant() {
        let sender = Arc::new(ScriptedSender::new());
        sender.on(
            format!("{BASE}/oauth20_token.srf"),
            ScriptedReply::json(400, json!({"error": "invalid_grant", "error_description": "expired"})),
        );

        let err = client(sender)
            .refresh_ms_token(&SecretString::new("old"))
            .await
            .unwrap_err();
        assert!(matches!(err, RcAuthError::OAuthInvalidGrant));
    }

    #[tokio::test]
    async fn test_refresh_sends_form_and_reads_tokens() {
        let sender = Arc::new(ScriptedSender::new());
        sender.on(
            format!("{BASE}/oauth20_token.srf"),
            ScriptedReply::json(
                200,
                json!({"access_token": "ms-access", "refresh_token": "ms-refresh", "expires_in": 3600, "token_type": "bearer"}),
            ),
        );

        let grant = client(sender.clone())
            .refresh_ms_token(&SecretString::new("old-refresh"))
            .await
            .unwrap();

        assert_eq!(grant.tokens.access_token.expose(), "ms-access");
        assert_eq!(grant.refresh_token.unwrap().expose(), "ms-refresh");
        let body = sender.requests()[0].body_text().unwrap();
        assert!(body.contains("grant_type=refresh_token"));
        assert!(body.contains("refresh_token=old-refresh"));
    }

    #[tokio::test]
    async fn test_xbl_uses_d_prefixed_ticket() {
        let sender = Arc::new(ScriptedSender::new());
        sender.on(format!("{BASE}/user/authenticate"), xbox_reply("xbl-token"));

        let token = client(sender.clone())
            .xbl_authenticate(&SecretString::new("ms-access"))
            .await
            .unwrap();

        assert_eq!(token.token.expose(), "xbl-token");
        assert_eq!(token.user_hash, "userhash");
        let body = sender.requests()[0].body_json().unwrap();
        assert_eq!(body["Properties"]["RpsTicket"], "d=ms-access");
    }

    #[tokio::test]
    async fn test_xbl_401_is_invalid_microsoft_token() {
        let sender = Arc::new(ScriptedSender::new());
        sender.on(format!("{BASE}/user/authenticate"), ScriptedReply::body(401, ""));

        let err = client(sender)
            .xbl_authenticate(&SecretString::new("ms-access"))
            .await
            .unwrap_err();
        assert!(matches!(err, RcAuthError::InvalidMicrosoftToken));
    }

    #[tokio::test]
    async fn test_xsts_child_account_error() {
        let sender = Arc::new(ScriptedSender::new());
        sender.on(
            format!("{BASE}/xsts/authorize"),
            ScriptedReply::json(401, json!({"Identity": "0", "XErr": 2148916238u64, "Message": ""})),
        );

        let xbl = XboxToken::new("xbl", "uhs", None);
        let err = client(sender).xsts_authorize(&xbl).await.unwrap_err();
        assert!(matches!(
            err,
            RcAuthError::XstsDenied(XstsError::ChildAccountRequiresFamily)
        ));
    }

    #[tokio::test]
    async fn test_mc_login_identity_token() {
        let sender = Arc::new(ScriptedSender::new());
        sender.on(
            format!("{BASE}/authentication/login_with_xbox"),
            ScriptedReply::json(200, json!({"username": "u", "access_token": "mc-token", "token_type": "Bearer", "expires_in": 86400})),
        );

        let xsts = XboxToken::new("xsts-token", "uhs42", None);
        let mc = client(sender.clone()).mc_login(&xsts).await.unwrap();

        assert_eq!(mc.access_token.expose(), "mc-token");
        let body = sender.requests()[0].body_json().unwrap();
        assert_eq!(body["identityToken"], "XBL3.0 x=uhs42;xsts-token");
    }

    #[tokio::test]
    async fn test_profile_404_is_no_game_ownership() {
        let sender = Arc::new(ScriptedSender::new());
        sender.on(
            format!("{BASE}/minecraft/profile"),
            ScriptedReply::json(404, json!({"error": "NOT_FOUND"})),
        );

        let err = client(sender)
            .fetch_profile(&SecretString::new("mc"))
            .await
            .unwrap_err();
        assert!(matches!(err, RcAuthError::NoGameOwnership));
    }
}
