//! Authentication-related types and wire formats

use serde::{Deserialize, Serialize};

/// A complete credential pair issued by the Nbship API.
///
/// Access and refresh tokens travel together: a `TokenSet` is only ever
/// created, replaced, or dropped as a whole, so a store never ends up
/// holding one token without the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    /// Short-lived token sent with each authenticated request
    pub access_token: String,
    /// Longer-lived token used solely to mint a new access token
    pub refresh_token: String,
    /// Token type (usually "Bearer")
    pub token_type: String,
}

impl TokenSet {
    /// Create a token set with an explicit token type
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        token_type: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            token_type: token_type.into(),
        }
    }

    /// Create a bearer token set
    pub fn bearer(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self::new(access_token, refresh_token, "Bearer")
    }
}

/// Wire body for `POST /auth/login`
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Wire body for `POST /auth/refresh`
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Wire response from the token-minting endpoints (login, refresh)
///
/// The API speaks snake_case; deserialization here is the structural
/// validation step, so a malformed response surfaces as an error instead
/// of silently becoming a half-empty credential.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl From<TokenResponse> for TokenSet {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            token_type: response.token_type,
        }
    }
}
