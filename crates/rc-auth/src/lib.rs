//! Microsoft Authentication Scheme implementation for Minecraft launchers
//!
//! This crate turns a Microsoft account into a Minecraft session by walking
//! the token chain:
//!
//! 1. Microsoft OAuth (refresh token, device code or authorization code grant)
//! 2. Xbox Live user authentication
//! 3. XSTS authorization for the Minecraft relying party
//! 4. Minecraft Services login and profile retrieval
//!
//! [`TokenChainManager`] keeps every stage per account and only re-derives
//! the stages that went stale, reusing earlier ones that are still valid.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rc_auth::{
//!     DeviceCode, DeviceCodeGrant, DeviceCodePrompt, MemoryTokenStore, RcAuthClient,
//!     RcAuthConfig, TokenChainManager,
//! };
//! use rc_core::{HttpConfig, ReqwestSender};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Terminal;
//!
//! #[async_trait::async_trait]
//! impl DeviceCodePrompt for Terminal {
//!     async fn present(&self, code: &DeviceCode) {
//!         println!("Open {} and enter {}", code.verification_uri, code.user_code);
//!     }
//! }
//!
//! # async fn example() -> anyhow::Result<()> {
//! let http = Arc::new(ReqwestSender::new(&HttpConfig::default())?);
//! let config = RcAuthConfig::custom("my-client-id".into(), "http://localhost/".parse()?);
//! let client = RcAuthClient::new(config, http);
//!
//! let manager = TokenChainManager::new(client, Arc::new(MemoryTokenStore::new()))
//!     .with_interactive_grant(Arc::new(DeviceCodeGrant::new(Terminal)));
//!
//! let session = manager
//!     .get_authorized_session("main", &CancellationToken::new())
//!     .await?;
//! println!("Logged in as: {}", session.profile.name);
//! # Ok(())
//! # }
//! ```
//!
//! # Important Notes
//!
//! - For development, use `RcAuthConfig::official_desktop()` with the official launcher's client ID
//!   and the [`AuthorizationCodeGrant`]; the device code grant needs your own approved client ID
//! - Tokens are wrapped in [`SecretString`] and never logged
//! - The MC access token expires after 24 hours

pub mod client;
pub mod config;
pub mod device_code;
pub mod errors;
pub mod grant;
pub mod manager;
pub mod models;
pub mod secret;
pub mod session;
pub mod store;

// Re-export main types
pub use client::{MsGrant, RcAuthClient};
pub use config::{AuthorizeFlavor, DeviceCodeConfig, Endpoints, RcAuthConfig, RetryPolicy};
pub use device_code::{DeviceCode, DeviceCodeFlow, DeviceCodeState};
pub use errors::{RcAuthError, RcAuthError as AuthError, Result, XstsError};
pub use grant::{
    AuthorizationCodeGrant, DeviceCodeGrant, DeviceCodePrompt, InteractiveGrant, RedirectPrompt,
};
pub use manager::TokenChainManager;
pub use models::McProfile;
pub use secret::SecretString;
pub use session::{ChainStage, McToken, MsTokens, Session, StageToken, TokenChainState, XboxToken};
pub use store::{MemoryTokenStore, TokenStore};
