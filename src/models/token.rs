// src/models/token.rs
//! Access token request/response bodies and the token payload.

use serde::{Deserialize, Serialize};

/// The only grant type the token endpoint accepts.
pub const GRANT_TYPE_CLIENT_CREDENTIALS: &str = "client_credentials";

/// Token type reported to the partner.
pub const TOKEN_TYPE: &str = "BearerToken";

/// Default token lifetime: 15 minutes minus one second of overhead.
pub const DEFAULT_EXPIRES_IN: u64 = 899;

/// Payload of a bearer token. Only the two UTC epoch timestamps; nothing
/// identifying the partner is embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Issued-at, UTC epoch seconds.
    pub iat: i64,
    /// Expires-at, UTC epoch seconds.
    pub exp: i64,
}

/// Successful body of `POST /snap/v1.0/access-token/b2b`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub response_code: String,
    pub response_message: String,
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds, serialized as a string as the standard shows.
    pub expires_in: String,
}

/// A minted token together with its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub claims: AccessTokenClaims,
}

impl AccessToken {
    pub fn expires_in(&self) -> i64 {
        self.claims.exp - self.claims.iat
    }
}
