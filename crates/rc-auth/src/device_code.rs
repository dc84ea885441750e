use std::time::Duration;

use rc_core::HttpRequest;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::{MsGrant, RcAuthClient, cancellable};
use crate::errors::{RcAuthError, Result};
use crate::models::{DeviceCodeResponse, MsTokenResponse, OAuthErrorResponse};
use crate::secret::SecretString;

const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Where a [`DeviceCodeFlow`] currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCodeState {
    Idle,
    CodeRequested,
    Polling,
    Authorized,
    Declined,
    Expired,
    BadCode,
    Cancelled,
    /// The server rejected the poll with an error the flow cannot recover from
    Failed,
}

impl DeviceCodeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Authorized
                | Self::Declined
                | Self::Expired
                | Self::BadCode
                | Self::Cancelled
                | Self::Failed
        )
    }
}

/// Code the user has to enter at `verification_uri`
#[derive(Debug, Clone)]
pub struct DeviceCode {
    pub user_code: String,
    pub verification_uri: String,
    pub message: Option<String>,
    pub expires_in: Duration,
    device_code: SecretString,
}

/// Outcome of a single token request while polling
enum PollOutcome {
    Granted(MsGrant),
    Pending,
    SlowDown,
}

/// OAuth device authorization grant.
///
/// `request_code` moves the flow to `CodeRequested`; `poll` then waits out the
/// interval, asks for the token and repeats until the server settles the
/// request one way or the other. A `slow_down` answer grows the interval for
/// the rest of the flow.
#[derive(Debug)]
pub struct DeviceCodeFlow {
    client: RcAuthClient,
    state: DeviceCodeState,
    interval: Duration,
    code: Option<DeviceCode>,
    requested_at: Option<Instant>,
}

impl DeviceCodeFlow {
    pub fn new(client: RcAuthClient) -> Self {
        let interval = client.config().device_code.min_interval;
        Self {
            client,
            state: DeviceCodeState::Idle,
            interval,
            code: None,
            requested_at: None,
        }
    }

    pub fn state(&self) -> DeviceCodeState {
        self.state
    }

    /// Delay applied before the next token request
    pub fn current_interval(&self) -> Duration {
        self.interval
    }

    pub fn code(&self) -> Option<&DeviceCode> {
        self.code.as_ref()
    }

    #[instrument(skip_all)]
    pub async fn request_code(&mut self, cancel: &CancellationToken) -> Result<DeviceCode> {
        if self.state != DeviceCodeState::Idle {
            return Err(RcAuthError::InvalidResponse(format!(
                "device code already requested (state {:?})",
                self.state
            )));
        }

        let config = self.client.config();
        let request = HttpRequest::post(&config.endpoints.ms_device_code)
            .timeout(config.request_timeout)
            .form(&[
                ("client_id", config.client_id.as_str()),
                ("scope", config.scope()),
            ]);
        let response = cancellable(cancel, self.client.http().send(request)).await?;
        let response = response.error_for_status().await?;
        let body: DeviceCodeResponse = response.json().await?;

        let server_interval = Duration::from_secs(body.interval.unwrap_or(0));
        self.interval = server_interval.max(config.device_code.min_interval);

        let code = DeviceCode {
            user_code: body.user_code,
            verification_uri: body.verification_uri,
            message: body.message,
            expires_in: Duration::from_secs(body.expires_in),
            device_code: SecretString::new(body.device_code),
        };
        info!(
            verification_uri = %code.verification_uri,
            expires_in = code.expires_in.as_secs(),
            interval_ms = self.interval.as_millis() as u64,
            "Device code issued"
        );

        self.code = Some(code.clone());
        self.requested_at = Some(Instant::now());
        self.state = DeviceCodeState::CodeRequested;
        Ok(code)
    }

    /// Poll until the user authorizes, declines, or the code runs out
    #[instrument(skip_all)]
    pub async fn poll(&mut self, cancel: &CancellationToken) -> Result<MsGrant> {
        let (Some(code), Some(requested_at)) = (self.code.clone(), self.requested_at) else {
            return Err(RcAuthError::InvalidResponse(
                "poll called before request_code".to_string(),
            ));
        };
        if self.state.is_terminal() {
            return Err(RcAuthError::InvalidResponse(format!(
                "device code flow already finished (state {:?})",
                self.state
            )));
        }

        self.state = DeviceCodeState::Polling;
        loop {
            if let Err(e) = sleep_or_cancel(cancel, self.interval).await {
                self.state = DeviceCodeState::Cancelled;
                return Err(e);
            }
            if cancel.is_cancelled() {
                self.state = DeviceCodeState::Cancelled;
                return Err(RcAuthError::Cancelled);
            }
            if requested_at.elapsed() > code.expires_in {
                warn!("Device code expired before authorization");
                self.state = DeviceCodeState::Expired;
                return Err(RcAuthError::ExpiredToken);
            }

            match self.poll_once(&code, cancel).await {
                Ok(PollOutcome::Granted(grant)) => {
                    info!("Device code authorized");
                    self.state = DeviceCodeState::Authorized;
                    return Ok(grant);
                }
                Ok(PollOutcome::Pending) => {}
                Ok(PollOutcome::SlowDown) => {
                    self.interval += self.client.config().device_code.slow_down_increment;
                    debug!(
                        interval_ms = self.interval.as_millis() as u64,
                        "Server asked to slow down"
                    );
                }
                Err(e) if e.is_retryable() => {
                    warn!(error = %e, "Transient failure while polling, will retry");
                }
                Err(e) => {
                    self.state = match &e {
                        RcAuthError::AuthorizationDeclined => DeviceCodeState::Declined,
                        RcAuthError::ExpiredToken => DeviceCodeState::Expired,
                        RcAuthError::BadVerificationCode => DeviceCodeState::BadCode,
                        RcAuthError::Cancelled => DeviceCodeState::Cancelled,
                        _ => DeviceCodeState::Failed,
                    };
                    return Err(e);
                }
            }
        }
    }

    async fn poll_once(
        &self,
        code: &DeviceCode,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome> {
        let config = self.client.config();
        let request = HttpRequest::post(&config.endpoints.ms_device_token)
            .timeout(config.request_timeout)
            .form(&[
                ("grant_type", DEVICE_CODE_GRANT_TYPE),
                ("client_id", config.client_id.as_str()),
                ("device_code", code.device_code.expose()),
            ]);
        let response = cancellable(cancel, self.client.http().send(request)).await?;

        if response.is_success() {
            let token: MsTokenResponse = response.json().await?;
            return Ok(PollOutcome::Granted(token.into()));
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let Ok(oauth) = serde_json::from_str::<OAuthErrorResponse>(&body) else {
            return Err(RcAuthError::Http {
                status,
                body_snippet: body.chars().take(200).collect(),
            });
        };

        match oauth.error.as_str() {
            "authorization_pending" => Ok(PollOutcome::Pending),
            "slow_down" => Ok(PollOutcome::SlowDown),
            "authorization_declined" | "access_denied" => Err(RcAuthError::AuthorizationDeclined),
            "expired_token" => Err(RcAuthError::ExpiredToken),
            "bad_verification_code" | "invalid_grant" => Err(RcAuthError::BadVerificationCode),
            _ => Err(RcAuthError::Http {
                status,
                body_snippet: body.chars().take(200).collect(),
            }),
        }
    }
}

async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(RcAuthError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
