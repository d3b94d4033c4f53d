// src/services/signature.rs
//! Signing and verification of SNAP request signatures.
//!
//! - Asymmetric (`SHA256withRSA`, PKCS#1 v1.5): token issuance only.
//! - Symmetric (`HMAC-SHA512` keyed by the client secret): every
//!   transactional request.
//!
//! Signatures travel base64 encoded. Every verification failure collapses
//! into [`SignatureError::InvalidSignature`]; the caller never learns whether
//! the padding, the key or the message was wrong.

use crate::keys::credential::{Credential, KeyMaterial};
use crate::models::headers;
use crate::utils::canonical::{token_string_to_sign, transactional_string_to_sign, BodyOrdering};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use ring::hmac;
use ring::rand::SystemRandom;
use ring::signature::{UnparsedPublicKey, RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_SHA256};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("no private key configured")]
    MissingKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("signing failed")]
    SigningFailed,
}

/// Signs `message` with RSA PKCS#1 v1.5 over SHA-256, base64 encoded.
pub fn sign_asymmetric(message: &[u8], key: Option<&KeyMaterial>) -> Result<String, SignatureError> {
    let pair = key
        .and_then(KeyMaterial::key_pair)
        .ok_or(SignatureError::MissingKey)?;
    let rng = SystemRandom::new();
    let mut signature = vec![0u8; pair.public_modulus_len()];
    pair.sign(&RSA_PKCS1_SHA256, &rng, message, &mut signature)
        .map_err(|_| SignatureError::SigningFailed)?;
    Ok(base64::encode(signature))
}

/// Verifies a base64 RSA PKCS#1 v1.5 SHA-256 signature.
pub fn verify_asymmetric(
    message: &[u8],
    signature: &str,
    key: Option<&KeyMaterial>,
) -> Result<(), SignatureError> {
    let key = key.ok_or(SignatureError::MissingKey)?;
    let raw = base64::decode(signature.trim()).map_err(|_| SignatureError::InvalidSignature)?;
    UnparsedPublicKey::new(&RSA_PKCS1_2048_8192_SHA256, key.public_key_der())
        .verify(message, &raw)
        .map_err(|_| SignatureError::InvalidSignature)
}

/// HMAC-SHA512 of `message` keyed by `shared_secret`, base64 encoded.
pub fn sign_symmetric(message: &[u8], shared_secret: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA512, shared_secret);
    base64::encode(hmac::sign(&key, message).as_ref())
}

/// Verifies a base64 HMAC-SHA512 signature. The decoded tag is compared in
/// constant time against the recomputed one.
pub fn verify_symmetric(
    message: &[u8],
    signature: &str,
    shared_secret: &[u8],
) -> Result<(), SignatureError> {
    let tag = base64::decode(signature.trim()).map_err(|_| SignatureError::InvalidSignature)?;
    let key = hmac::Key::new(hmac::HMAC_SHA512, shared_secret);
    hmac::verify(&key, message, &tag).map_err(|_| SignatureError::InvalidSignature)
}

/// Verifies against the canonical message, then once against a
/// caller-claimed alternate payload. When both fail the error of the
/// canonical attempt is returned.
pub fn verify_symmetric_with_fallback(
    message: &[u8],
    alternate: Option<&[u8]>,
    signature: &str,
    shared_secret: &[u8],
) -> Result<(), SignatureError> {
    let original = match verify_symmetric(message, signature, shared_secret) {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    match alternate {
        Some(payload) if verify_symmetric(payload, signature, shared_secret).is_ok() => {
            log::warn!("transactional signature accepted through alternate payload");
            Ok(())
        }
        _ => Err(original),
    }
}

/// Builds signed header sets for the partner side of the flow.
pub struct Signer;

impl Signer {
    /// Headers for `POST /snap/v1.0/access-token/b2b`.
    pub fn token_request_headers(
        credential: &Credential,
        timestamp: &str,
    ) -> Result<HeaderMap, SignatureError> {
        let message = token_string_to_sign(credential.client_id(), timestamp);
        let signature = sign_asymmetric(&message, credential.key())?;

        let mut map = HeaderMap::new();
        insert(&mut map, headers::CONTENT_TYPE, "application/json")?;
        insert(&mut map, headers::X_TIMESTAMP, timestamp)?;
        insert(&mut map, headers::X_CLIENT_KEY, credential.client_id())?;
        insert(&mut map, headers::X_SIGNATURE, &signature)?;
        Ok(map)
    }

    /// Headers for a transactional request signed with the client secret.
    #[allow(clippy::too_many_arguments)]
    pub fn transactional_headers(
        credential: &Credential,
        method: &str,
        path: &str,
        access_token: &str,
        body: &Value,
        timestamp: &str,
        external_id: &str,
        partner_id: &str,
        channel_id: &str,
    ) -> Result<HeaderMap, SignatureError> {
        let message = transactional_string_to_sign(
            method,
            path,
            Some(access_token),
            body,
            timestamp,
            BodyOrdering::AsReceived,
        )
        .map_err(|_| SignatureError::SigningFailed)?;
        let signature = sign_symmetric(&message, credential.client_secret());

        let mut map = HeaderMap::new();
        insert(&mut map, headers::CONTENT_TYPE, "application/json")?;
        insert(&mut map, headers::AUTHORIZATION, &format!("Bearer {}", access_token))?;
        insert(&mut map, headers::X_TIMESTAMP, timestamp)?;
        insert(&mut map, headers::X_SIGNATURE, &signature)?;
        insert(&mut map, headers::X_EXTERNAL_ID, external_id)?;
        insert(&mut map, headers::X_PARTNER_ID, partner_id)?;
        insert(&mut map, headers::CHANNEL_ID, channel_id)?;
        Ok(map)
    }
}

fn insert(map: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), SignatureError> {
    let value = HeaderValue::from_str(value).map_err(|_| SignatureError::SigningFailed)?;
    map.insert(HeaderName::from_static(name), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARTNER_PKCS8: &[u8] = include_bytes!("../../tests/fixtures/partner.pk8.der");
    const PARTNER_PUBLIC: &[u8] = include_bytes!("../../tests/fixtures/partner.pub.der");
    const STRANGER_PKCS8: &[u8] = include_bytes!("../../tests/fixtures/stranger.pk8.der");

    fn private() -> KeyMaterial {
        KeyMaterial::private_from_der(PARTNER_PKCS8).unwrap()
    }

    fn public() -> KeyMaterial {
        KeyMaterial::public_from_der(PARTNER_PUBLIC).unwrap()
    }

    #[test]
    fn test_asymmetric_round_trip() {
        let message = token_string_to_sign("XJAPE8888", "2025-02-01T15:30:32.843+07:00");
        let signature = sign_asymmetric(&message, Some(&private())).unwrap();
        assert_eq!(verify_asymmetric(&message, &signature, Some(&public())), Ok(()));
    }

    #[test]
    fn test_asymmetric_flipped_byte_is_rejected() {
        let message = b"XJAPE8888|2025-02-01T15:30:32.843+07:00";
        let signature = sign_asymmetric(message, Some(&private())).unwrap();
        let mut raw = base64::decode(&signature).unwrap();
        for index in [0, raw.len() / 2, raw.len() - 1] {
            raw[index] ^= 0x01;
            let tampered = base64::encode(&raw);
            assert_eq!(
                verify_asymmetric(message, &tampered, Some(&public())),
                Err(SignatureError::InvalidSignature)
            );
            raw[index] ^= 0x01;
        }
    }

    #[test]
    fn test_asymmetric_wrong_key_and_tampered_message() {
        let stranger = KeyMaterial::private_from_der(STRANGER_PKCS8).unwrap();
        let message = b"XJAPE8888|2025-02-01T15:30:32.843+07:00";
        let signature = sign_asymmetric(message, Some(&stranger)).unwrap();
        assert_eq!(
            verify_asymmetric(message, &signature, Some(&public())),
            Err(SignatureError::InvalidSignature)
        );

        let signature = sign_asymmetric(message, Some(&private())).unwrap();
        assert_eq!(
            verify_asymmetric(b"XJAPE8888|2025-02-01T15:30:33.843+07:00", &signature, Some(&public())),
            Err(SignatureError::InvalidSignature)
        );
        assert_eq!(
            verify_asymmetric(message, "%%% not base64 %%%", Some(&public())),
            Err(SignatureError::InvalidSignature)
        );
    }

    #[test]
    fn test_asymmetric_sign_requires_private_key() {
        assert_eq!(sign_asymmetric(b"msg", None), Err(SignatureError::MissingKey));
        assert_eq!(sign_asymmetric(b"msg", Some(&public())), Err(SignatureError::MissingKey));
    }

    #[test]
    fn test_symmetric_known_vector() {
        let message = b"POST:/snap/v1.0/transfer-va/inquiry:tok123:a10286e32a678da90ddd2e8d74b86d95164c68499989fe56801bd06d2852bb37:2025-02-01T15:30:32.843+07:00";
        let signature = sign_symmetric(message, b"client-secret");
        assert_eq!(
            signature,
            "NDy8fLFm8x+UArbc3a60iPmSQ+1q+Zq+zy6fPW0cYPAKYXiP2u0iVJ0RhfdquX8mHmLwNbhHhcgygM2+hBn0NA=="
        );
        assert_eq!(verify_symmetric(message, &signature, b"client-secret"), Ok(()));
        assert_eq!(
            verify_symmetric(message, &signature, b"other-secret"),
            Err(SignatureError::InvalidSignature)
        );
        assert_eq!(
            verify_symmetric(message, "not-base64!", b"client-secret"),
            Err(SignatureError::InvalidSignature)
        );
    }

    #[test]
    fn test_fallback_accepts_alternate_payload_only_when_supplied() {
        let claimed = b"POST:/v1/pay:tok:deadbeef:2025-02-01T15:30:32.843+07:00\0";
        let signature = sign_symmetric(claimed, b"secret");
        let canonical = b"POST:/v1/pay:tok:deadbeef:2025-02-01T15:30:32.843+07:00";

        assert_eq!(
            verify_symmetric_with_fallback(canonical, None, &signature, b"secret"),
            Err(SignatureError::InvalidSignature)
        );
        assert_eq!(
            verify_symmetric_with_fallback(canonical, Some(claimed), &signature, b"secret"),
            Ok(())
        );
        assert_eq!(
            verify_symmetric_with_fallback(canonical, Some(b"other"), &signature, b"secret"),
            Err(SignatureError::InvalidSignature)
        );
    }

    #[test]
    fn test_token_request_headers_verify() {
        let credential =
            Credential::new("XJAPE8888", "client-secret", "token-pass", Some(private())).unwrap();
        let timestamp = "2025-02-01T15:30:32.843+07:00";
        let map = Signer::token_request_headers(&credential, timestamp).unwrap();
        let signature = map[headers::X_SIGNATURE].to_str().unwrap();
        let message = token_string_to_sign("XJAPE8888", timestamp);
        assert_eq!(verify_asymmetric(&message, signature, Some(&public())), Ok(()));
        assert_eq!(map[headers::X_CLIENT_KEY], "XJAPE8888");
    }
}
