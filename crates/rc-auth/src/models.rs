use serde::{Deserialize, Serialize};

/// Microsoft OAuth token response (code, refresh_token and device_code grants)
#[derive(Debug, Clone, Deserialize)]
pub struct MsTokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// OAuth error body (`{"error": "...", "error_description": "..."}`)
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Device authorization response
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub expires_in: u64,
    #[serde(default)]
    pub interval: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Xbox Live user.authenticate request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XblAuthRequest {
    pub properties: XblAuthProperties,
    pub relying_party: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XblAuthProperties {
    pub auth_method: String,
    pub site_name: String,
    pub rps_ticket: String,
}

/// Response shape shared by user.authenticate and xsts/authorize
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XboxTokenResponse {
    pub token: String,
    pub display_claims: XblDisplayClaims,
    #[serde(default)]
    pub issue_instant: Option<String>,
    #[serde(default)]
    pub not_after: Option<String>,
}

impl XboxTokenResponse {
    /// User hash of the first identity claim
    pub fn user_hash(&self) -> Option<&str> {
        self.display_claims.xui.first().map(|x| x.uhs.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct XblDisplayClaims {
    pub xui: Vec<XblUserInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XblUserInfo {
    pub uhs: String,
}

/// XSTS authorize request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XstsAuthRequest {
    pub properties: XstsAuthProperties,
    pub relying_party: String,
    pub token_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct XstsAuthProperties {
    pub sandbox_id: String,
    pub user_tokens: Vec<String>,
}

/// XSTS error response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct XstsErrorResponse {
    #[serde(rename = "XErr")]
    pub xerr: u64,
    #[serde(default)]
    pub message: Option<String>,
}

/// Minecraft login_with_xbox request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct McLoginRequest {
    pub identity_token: String,
}

/// Minecraft login_with_xbox response
#[derive(Debug, Clone, Deserialize)]
pub struct McLoginResponse {
    #[serde(default)]
    pub username: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: u64,
}

/// Minecraft profile response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McProfile {
    /// UUID without dashes
    pub id: String,
    /// Player name
    pub name: String,
    #[serde(default)]
    pub skins: Vec<McSkin>,
    #[serde(default)]
    pub capes: Vec<McCape>,
}

impl McProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            skins: Vec::new(),
            capes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McSkin {
    pub id: String,
    pub state: String,
    pub url: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McCape {
    pub id: String,
    pub state: String,
    pub url: String,
    #[serde(default)]
    pub alias: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xbl_request_uses_pascal_case() {
        let request = XblAuthRequest {
            properties: XblAuthProperties {
                auth_method: "RPS".to_string(),
                site_name: "user.auth.xboxlive.com".to_string(),
                rps_ticket: "d=abc".to_string(),
            },
            relying_party: "http://auth.xboxlive.com".to_string(),
            token_type: "JWT".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["Properties"]["RpsTicket"], "d=abc");
        assert_eq!(value["RelyingParty"], "http://auth.xboxlive.com");
    }

    #[test]
    fn test_xbox_response_user_hash() {
        let response: XboxTokenResponse = serde_json::from_str(
            r#"{"Token":"t","DisplayClaims":{"xui":[{"uhs":"1234"}]},"NotAfter":"2030-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(response.user_hash(), Some("1234"));
        assert_eq!(response.not_after.as_deref(), Some("2030-01-01T00:00:00Z"));
    }

    #[test]
    fn test_xsts_error_parses_xerr() {
        let err: XstsErrorResponse =
            serde_json::from_str(r#"{"Identity":"0","XErr":2148916238,"Message":""}"#).unwrap();
        assert_eq!(err.xerr, 2148916238);
    }
}
