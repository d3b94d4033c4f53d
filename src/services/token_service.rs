// src/services/token_service.rs
//! Bearer token issuance and validation.
//!
//! Tokens are HS512 JWTs keyed by the credential's `token_passphrase`, never
//! by the client secret. They self-expire; there is no revocation list.
//!
//! ```text
//! ISSUED --(now <= exp)--> valid
//!        --(now >  exp)--> expired (terminal)
//! ```

use crate::keys::credential::{Credential, CredentialError};
use crate::models::error::SnapError;
use crate::models::headers::TokenRequestHeaders;
use crate::models::token::{AccessToken, AccessTokenClaims};
use crate::services::signature::{verify_asymmetric, SignatureError};
use crate::utils::canonical::token_string_to_sign;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;

/// Issues and validates bearer tokens for one partner credential.
#[derive(Clone)]
pub struct TokenService {
    credential: Arc<Credential>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expires_in: u64,
}

impl TokenService {
    /// Creates the service. The credential must carry a token passphrase.
    pub fn new(credential: Arc<Credential>, expires_in: u64) -> Result<Self, CredentialError> {
        if credential.token_passphrase().is_empty() {
            return Err(CredentialError::MissingTokenPassphrase);
        }
        let encoding_key = EncodingKey::from_secret(credential.token_passphrase());
        let decoding_key = DecodingKey::from_secret(credential.token_passphrase());
        Ok(Self {
            credential,
            encoding_key,
            decoding_key,
            expires_in,
        })
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn expires_in(&self) -> u64 {
        self.expires_in
    }

    /// Authenticates a token request and mints a token.
    ///
    /// # Errors
    /// - `AccessDenied` when `X-CLIENT-KEY` is not this partner's client id
    /// - `InvalidSignature` when the RSA signature over `client_id|timestamp`
    ///   does not verify against the partner's public key
    pub fn issue(&self, headers: &TokenRequestHeaders) -> Result<AccessToken, SnapError> {
        if headers.client_key != self.credential.client_id() {
            return Err(SnapError::AccessDenied);
        }

        let message = token_string_to_sign(self.credential.client_id(), &headers.timestamp);
        verify_asymmetric(&message, &headers.signature, self.credential.key()).map_err(
            |e| match e {
                SignatureError::MissingKey => {
                    SnapError::InternalServerError("no partner public key configured".to_string())
                }
                _ => SnapError::InvalidSignature,
            },
        )?;

        self.mint_at(Utc::now())
    }

    /// Mints a token as if issued at `issued_at`.
    pub fn mint_at(&self, issued_at: DateTime<Utc>) -> Result<AccessToken, SnapError> {
        let expires_at = i64::try_from(self.expires_in)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .ok_or_else(|| SnapError::InternalServerError("token lifetime out of range".to_string()))?;
        let claims = AccessTokenClaims {
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS512), &claims, &self.encoding_key)
            .map_err(|e| SnapError::InternalServerError(format!("token encoding failed: {}", e)))?;
        Ok(AccessToken { token, claims })
    }

    /// Validates a presented token.
    ///
    /// # Errors
    /// - `AccessTokenNotFound` for an absent or empty token
    /// - `AccessTokenInvalid` for anything else: bad signature, malformed
    ///   encoding, expiry. Expiry is not distinguished from forgery.
    pub fn validate(&self, token: Option<&str>) -> Result<AccessTokenClaims, SnapError> {
        let token = match token.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => return Err(SnapError::AccessTokenNotFound),
        };

        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat"]);

        decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| SnapError::AccessTokenInvalid)
    }
}
