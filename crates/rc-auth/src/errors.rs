use rc_core::HttpError;
use thiserror::Error;

/// Microsoft Authentication Scheme error types
#[derive(Error, Debug)]
pub enum RcAuthError {
    #[error("User cancelled the authentication flow")]
    UserCancelled,

    #[error("Authentication was cancelled")]
    Cancelled,

    #[error("Network error: {0}")]
    Transport(#[source] HttpError),

    #[error("HTTP error {status}: {body_snippet}")]
    Http { status: u16, body_snippet: String },

    #[error("OAuth invalid_grant - refresh token may be expired")]
    OAuthInvalidGrant,

    #[error("Xbox Live rejected the Microsoft access token")]
    InvalidMicrosoftToken,

    #[error("XSTS authorization denied: {0}")]
    XstsDenied(#[from] XstsError),

    #[error("No Minecraft license on this account - user may not own Minecraft or hasn't created a profile")]
    NoGameOwnership,

    #[error("The user declined the device authorization request")]
    AuthorizationDeclined,

    #[error("The device code was rejected by the server")]
    BadVerificationCode,

    #[error("The device code expired before the user authorized it")]
    ExpiredToken,

    #[error("Invalid redirect URI or missing code")]
    InvalidRedirect,

    #[error("OAuth state mismatch - possible CSRF attack")]
    StateMismatch,

    #[error("JSON serialization/deserialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Missing refresh token - cannot refresh session")]
    MissingRefreshToken,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Token store error: {0}")]
    Store(String),
}

impl RcAuthError {
    /// Only transient transport failures are worth retrying in place.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_transient(),
            Self::Http { status, .. } => rc_core::error::is_transient_status(*status),
            _ => false,
        }
    }

    /// Errors that need the user to do something before another attempt
    /// can succeed.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Self::UserCancelled
                | Self::XstsDenied(_)
                | Self::NoGameOwnership
                | Self::AuthorizationDeclined
                | Self::BadVerificationCode
                | Self::ExpiredToken
        )
    }
}

impl From<HttpError> for RcAuthError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Status {
                status,
                body_snippet,
            } => Self::Http {
                status,
                body_snippet,
            },
            HttpError::Decode(e) => Self::Serde(e),
            other => Self::Transport(other),
        }
    }
}

/// XSTS-specific error codes from XErr field
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XstsError {
    #[error("Account doesn't have an Xbox account (XErr: 2148916233)")]
    NoXboxAccount,

    #[error("Xbox Live not available in this country (XErr: 2148916235)")]
    RegionNotSupported,

    #[error("Adult verification required on Xbox page (XErr: 2148916236/2148916237)")]
    AdultVerificationRequired,

    #[error("Child account requires Family (XErr: 2148916238)")]
    ChildAccountRequiresFamily,

    #[error("Unknown XSTS error code: {0}")]
    Unknown(u64),
}

impl XstsError {
    /// Parse XErr code from XSTS response
    pub fn from_xerr(code: u64) -> Self {
        match code {
            2148916233 => Self::NoXboxAccount,
            2148916235 => Self::RegionNotSupported,
            2148916236 | 2148916237 => Self::AdultVerificationRequired,
            2148916238 => Self::ChildAccountRequiresFamily,
            code => Self::Unknown(code),
        }
    }
}

pub type Result<T> = std::result::Result<T, RcAuthError>;
