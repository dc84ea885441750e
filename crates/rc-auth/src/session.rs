use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::McProfile;
use crate::secret::SecretString;

/// Lifetime (seconds) assumed for an Xbox token whose response carries no `NotAfter`
const FALLBACK_XBOX_LIFETIME_SECS: u64 = 3600;

/// One hop of the Microsoft -> Xbox Live -> XSTS -> Minecraft exchange, in
/// chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChainStage {
    Microsoft,
    XboxLive,
    Xsts,
    Minecraft,
}

impl ChainStage {
    pub const ALL: [ChainStage; 4] = [
        ChainStage::Microsoft,
        ChainStage::XboxLive,
        ChainStage::Xsts,
        ChainStage::Minecraft,
    ];
}

impl fmt::Display for ChainStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainStage::Microsoft => "microsoft",
            ChainStage::XboxLive => "xbox_live",
            ChainStage::Xsts => "xsts",
            ChainStage::Minecraft => "minecraft",
        };
        f.write_str(name)
    }
}

/// Validity window shared by every stage token
pub trait StageToken {
    fn issued_at(&self) -> DateTime<Utc>;
    fn expires_at(&self) -> DateTime<Utc>;

    /// Still usable at `now`, treating the last `skew` of its lifetime as expired
    fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now + skew < self.expires_at()
    }
}

/// Microsoft OAuth access token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MsTokens {
    pub access_token: SecretString,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl MsTokens {
    pub fn new(access_token: impl Into<SecretString>, expires_in: u64) -> Self {
        let issued_at = Utc::now();
        Self {
            access_token: access_token.into(),
            issued_at,
            expires_at: issued_at + seconds(expires_in),
        }
    }
}

impl StageToken for MsTokens {
    fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Xbox Live user token or XSTS token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct XboxToken {
    pub token: SecretString,
    pub user_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl XboxToken {
    /// Build from a service response, reading the expiry from its `NotAfter`
    /// timestamp when present.
    pub fn new(
        token: impl Into<SecretString>,
        user_hash: impl Into<String>,
        not_after: Option<&str>,
    ) -> Self {
        let issued_at = Utc::now();
        let expires_at = not_after
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(issued_at + seconds(FALLBACK_XBOX_LIFETIME_SECS));
        Self {
            token: token.into(),
            user_hash: user_hash.into(),
            issued_at,
            expires_at,
        }
    }
}

impl StageToken for XboxToken {
    fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Minecraft access token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McToken {
    pub access_token: SecretString,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl McToken {
    pub fn new(access_token: impl Into<SecretString>, expires_in: u64) -> Self {
        let issued_at = Utc::now();
        Self {
            access_token: access_token.into(),
            issued_at,
            expires_at: issued_at + seconds(expires_in),
        }
    }
}

impl StageToken for McToken {
    fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// One account's progress through the token chain.
///
/// The refresh token lives beside the stages rather than inside the
/// Microsoft stage so it survives that stage's expiry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenChainState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<SecretString>,
    pub microsoft: Option<MsTokens>,
    pub xbox_live: Option<XboxToken>,
    pub xsts: Option<XboxToken>,
    pub minecraft: Option<McToken>,
    pub profile: Option<McProfile>,
}

impl TokenChainState {
    pub fn with_refresh_token(refresh_token: impl Into<SecretString>) -> Self {
        Self {
            refresh_token: Some(refresh_token.into()),
            ..Self::default()
        }
    }

    fn stage_token(&self, stage: ChainStage) -> Option<&dyn StageToken> {
        match stage {
            ChainStage::Microsoft => self.microsoft.as_ref().map(|t| t as &dyn StageToken),
            ChainStage::XboxLive => self.xbox_live.as_ref().map(|t| t as &dyn StageToken),
            ChainStage::Xsts => self.xsts.as_ref().map(|t| t as &dyn StageToken),
            ChainStage::Minecraft => self.minecraft.as_ref().map(|t| t as &dyn StageToken),
        }
    }

    /// Earliest stage that must be re-derived, or `None` when the whole chain
    /// is usable.
    ///
    /// A stage is stale when it is missing, inside the expiry skew, or was
    /// issued before its parent (the parent has been re-derived since). A
    /// missing profile forces the Minecraft stage, which is what fetches it.
    pub fn first_stale_stage(&self, now: DateTime<Utc>, skew: Duration) -> Option<ChainStage> {
        let mut parent_issued: Option<DateTime<Utc>> = None;
        for stage in ChainStage::ALL {
            let Some(token) = self.stage_token(stage) else {
                return Some(stage);
            };
            let orphaned = parent_issued.is_some_and(|p| token.issued_at() < p);
            if orphaned || !token.is_fresh(now, skew) {
                return Some(stage);
            }
            parent_issued = Some(token.issued_at());
        }
        if self.profile.is_none() {
            return Some(ChainStage::Minecraft);
        }
        None
    }

    /// Drop `stage` and every stage after it
    pub fn invalidate_from(&mut self, stage: ChainStage) {
        if stage <= ChainStage::Microsoft {
            self.microsoft = None;
        }
        if stage <= ChainStage::XboxLive {
            self.xbox_live = None;
        }
        if stage <= ChainStage::Xsts {
            self.xsts = None;
        }
        self.minecraft = None;
        self.profile = None;
    }

    /// Earliest expiry among the four stage tokens
    pub fn effective_expiry(&self) -> Option<DateTime<Utc>> {
        ChainStage::ALL
            .iter()
            .map(|s| self.stage_token(*s).map(|t| t.expires_at()))
            .collect::<Option<Vec<_>>>()?
            .into_iter()
            .min()
    }

    /// Authorized session, if the Minecraft stage and profile are present.
    /// Freshness is not checked here.
    pub fn session(&self) -> Option<Session> {
        let minecraft = self.minecraft.as_ref()?;
        let profile = self.profile.clone()?;
        Some(Session {
            access_token: minecraft.access_token.clone(),
            expires_at: self.effective_expiry().unwrap_or(minecraft.expires_at),
            profile,
        })
    }
}

/// Authorized Minecraft session handed to callers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: SecretString,
    /// Effective expiry of the whole chain
    pub expires_at: DateTime<Utc>,
    pub profile: McProfile,
}

impl Session {
    pub fn needs_refresh(&self, skew: Duration) -> bool {
        Utc::now() + skew >= self.expires_at
    }

    /// Get the account key (UUID) for storage
    pub fn account_key(&self) -> &str {
        &self.profile.id
    }
}

/// Server lifetimes are capped at ten years to keep date arithmetic in range
fn seconds(secs: u64) -> Duration {
    const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 3600;
    Duration::seconds(secs.min(MAX_LIFETIME_SECS) as i64)
}
