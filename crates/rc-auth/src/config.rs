use std::time::Duration;
use url::Url;

/// Microsoft authentication endpoints
pub mod endpoints {
    pub const MS_AUTHORIZE: &str = "https://login.live.com/oauth20_authorize.srf";
    pub const MS_TOKEN: &str = "https://login.live.com/oauth20_token.srf";
    pub const MS_DEVICE_CODE: &str =
        "https://login.microsoftonline.com/consumers/oauth2/v2.0/devicecode";
    pub const MS_DEVICE_TOKEN: &str =
        "https://login.microsoftonline.com/consumers/oauth2/v2.0/token";
    pub const XBL_AUTHENTICATE: &str = "https://user.auth.xboxlive.com/user/authenticate";
    pub const XSTS_AUTHORIZE: &str = "https://xsts.auth.xboxlive.com/xsts/authorize";
    pub const MC_LOGIN: &str = "https://api.minecraftservices.com/authentication/login_with_xbox";
    pub const MC_PROFILE: &str = "https://api.minecraftservices.com/minecraft/profile";
}

/// Official Minecraft launcher OAuth configuration
pub mod official {
    /// Official launcher client ID for development/testing
    pub const CLIENT_ID: &str = "00000000402B5328";
    pub const REDIRECT_URI: &str = "https://login.live.com/oauth20_desktop.srf";
    pub const SCOPE: &str = "service::user.auth.xboxlive.com::MBI_SSL";

    /// Additional query parameters for official flow
    pub const EXTRA_PARAMS: &[(&str, &str)] = &[
        ("lw", "1"),
        ("fl", "dob,easi2"),
        ("xsup", "1"),
        ("nopa", "2"),
    ];
}

/// Standard OAuth scope for custom apps
pub const STANDARD_SCOPE: &str = "XboxLive.signin offline_access";

/// Relying parties
pub const RP_MINECRAFT: &str = "rp://api.minecraftservices.com/";
pub const RP_XBOX_AUTH: &str = "http://auth.xboxlive.com";

/// Time skew for token expiration (refresh 5 minutes early)
pub const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(300);

/// Authentication flow flavor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthorizeFlavor {
    /// Official Minecraft launcher flow (recommended for development)
    /// Uses official client ID and doesn't require app approval
    #[default]
    OfficialDesktop,

    /// Standard OAuth2 code flow for custom approved apps
    /// Requires Mojang approval and custom client_id
    StandardCode,
}

impl AuthorizeFlavor {
    pub fn scope(&self) -> &'static str {
        match self {
            Self::OfficialDesktop => official::SCOPE,
            Self::StandardCode => STANDARD_SCOPE,
        }
    }
}

/// Endpoint set used by the chain. Overridable so tests can point every
/// stage at a local server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub ms_authorize: String,
    pub ms_token: String,
    pub ms_device_code: String,
    pub ms_device_token: String,
    pub xbl_authenticate: String,
    pub xsts_authorize: String,
    pub mc_login: String,
    pub mc_profile: String,
}

impl Endpoints {
    /// Every endpoint rooted at `base`, keeping the production paths
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            ms_authorize: format!("{base}/oauth20_authorize.srf"),
            ms_token: format!("{base}/oauth20_token.srf"),
            ms_device_code: format!("{base}/consumers/oauth2/v2.0/devicecode"),
            ms_device_token: format!("{base}/consumers/oauth2/v2.0/token"),
            xbl_authenticate: format!("{base}/user/authenticate"),
            xsts_authorize: format!("{base}/xsts/authorize"),
            mc_login: format!("{base}/authentication/login_with_xbox"),
            mc_profile: format!("{base}/minecraft/profile"),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            ms_authorize: endpoints::MS_AUTHORIZE.to_string(),
            ms_token: endpoints::MS_TOKEN.to_string(),
            ms_device_code: endpoints::MS_DEVICE_CODE.to_string(),
            ms_device_token: endpoints::MS_DEVICE_TOKEN.to_string(),
            xbl_authenticate: endpoints::XBL_AUTHENTICATE.to_string(),
            xsts_authorize: endpoints::XSTS_AUTHORIZE.to_string(),
            mc_login: endpoints::MC_LOGIN.to_string(),
            mc_profile: endpoints::MC_PROFILE.to_string(),
        }
    }
}

/// Retry policy for a single chain stage
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first on a transient failure
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Device code polling configuration
#[derive(Debug, Clone)]
pub struct DeviceCodeConfig {
    /// Floor applied to the server-provided polling interval
    pub min_interval: Duration,
    /// Added to the interval each time the server answers `slow_down`
    pub slow_down_increment: Duration,
}

impl Default for DeviceCodeConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(5),
            slow_down_increment: Duration::from_secs(5),
        }
    }
}

/// Configuration for RcAuthClient and TokenChainManager
#[derive(Debug, Clone)]
pub struct RcAuthConfig {
    /// OAuth client ID (use official::CLIENT_ID for development)
    pub client_id: String,

    /// OAuth redirect URI
    pub redirect_uri: Url,

    /// Authorization flow flavor
    pub authorize_flavor: AuthorizeFlavor,

    /// Service endpoints
    pub endpoints: Endpoints,

    /// Timeout applied to each API call
    pub request_timeout: Duration,

    /// Tokens are treated as expired this long before their real expiry
    pub expiry_skew: Duration,

    /// Retry policy
    pub retry: RetryPolicy,

    /// Device code grant settings
    pub device_code: DeviceCodeConfig,
}

impl RcAuthConfig {
    /// Create config for official Minecraft launcher flow (for development)
    pub fn official_desktop() -> Self {
        Self {
            client_id: official::CLIENT_ID.to_string(),
            redirect_uri: Url::parse(official::REDIRECT_URI).expect("valid redirect URI"),
            authorize_flavor: AuthorizeFlavor::OfficialDesktop,
            endpoints: Endpoints::default(),
            request_timeout: Duration::from_secs(30),
            expiry_skew: TOKEN_EXPIRY_SKEW,
            retry: RetryPolicy::default(),
            device_code: DeviceCodeConfig::default(),
        }
    }

    /// Create config for custom approved app
    pub fn custom(client_id: String, redirect_uri: Url) -> Self {
        Self {
            client_id,
            redirect_uri,
            authorize_flavor: AuthorizeFlavor::StandardCode,
            ..Self::official_desktop()
        }
    }

    /// Scope requested from Microsoft for the configured flavor
    pub fn scope(&self) -> &'static str {
        self.authorize_flavor.scope()
    }
}

impl Default for RcAuthConfig {
    fn default() -> Self {
        Self::official_desktop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_official_defaults() {
        let config = RcAuthConfig::official_desktop();
        assert_eq!(config.client_id, official::CLIENT_ID);
        assert_eq!(config.redirect_uri.as_str(), official::REDIRECT_URI);
        assert_eq!(config.scope(), official::SCOPE);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.device_code.min_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_custom_uses_standard_scope() {
        let config = RcAuthConfig::custom(
            "my-app".to_string(),
            Url::parse("http://localhost:8000/").unwrap(),
        );
        assert_eq!(config.scope(), STANDARD_SCOPE);
        assert_eq!(config.endpoints, Endpoints::default());
    }

    #[test]
    fn test_endpoints_with_base() {
        let endpoints = Endpoints::with_base("http://127.0.0.1:9000/");
        assert_eq!(endpoints.xsts_authorize, "http://127.0.0.1:9000/xsts/authorize");
        assert_eq!(endpoints.mc_profile, "http://127.0.0.1:9000/minecraft/profile");
    }
}
