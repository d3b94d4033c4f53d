// src/models/headers.rs
//! Request and response header names and typed header extraction.
//!
//! Names are lowercase so they can be used with `HeaderName::from_static`;
//! lookups in `HeaderMap` are case-insensitive.

use crate::services::validation::{FieldViolation, Location};
use axum::http::HeaderMap;
use chrono::DateTime;

pub const AUTHORIZATION: &str = "authorization";
pub const CONTENT_TYPE: &str = "content-type";
pub const X_TIMESTAMP: &str = "x-timestamp";
pub const X_CLIENT_KEY: &str = "x-client-key";
pub const X_SIGNATURE: &str = "x-signature";
pub const X_EXTERNAL_ID: &str = "x-external-id";
pub const X_PARTNER_ID: &str = "x-partner-id";
pub const CHANNEL_ID: &str = "channel-id";
pub const CACHE_CONTROL: &str = "cache-control";

/// Headers of the token issuance request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequestHeaders {
    pub timestamp: String,
    pub client_key: String,
    pub signature: String,
}

impl TokenRequestHeaders {
    pub fn extract(map: &HeaderMap) -> Result<Self, Vec<FieldViolation>> {
        let mut violations = Vec::new();
        check_content_type(map, &mut violations);
        let timestamp = timestamp_field(map, &mut violations);
        let client_key = text_field(map, X_CLIENT_KEY, 1, usize::MAX, &mut violations);
        let signature = text_field(map, X_SIGNATURE, 1, usize::MAX, &mut violations);

        match (timestamp, client_key, signature) {
            (Some(timestamp), Some(client_key), Some(signature)) if violations.is_empty() => {
                Ok(Self { timestamp, client_key, signature })
            }
            _ => Err(violations),
        }
    }
}

/// Headers of a transactional request, bearer token excluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionHeaders {
    pub timestamp: String,
    pub signature: String,
    pub external_id: String,
    pub partner_id: String,
    pub channel_id: String,
}

impl TransactionHeaders {
    pub fn extract(map: &HeaderMap) -> Result<Self, Vec<FieldViolation>> {
        let mut violations = Vec::new();
        check_content_type(map, &mut violations);
        let timestamp = timestamp_field(map, &mut violations);
        let signature = text_field(map, X_SIGNATURE, 1, usize::MAX, &mut violations);
        let external_id = text_field(map, X_EXTERNAL_ID, 5, 36, &mut violations);
        let partner_id = text_field(map, X_PARTNER_ID, 5, 36, &mut violations);
        let channel_id = text_field(map, CHANNEL_ID, 1, 5, &mut violations);

        match (timestamp, signature, external_id, partner_id, channel_id) {
            (Some(timestamp), Some(signature), Some(external_id), Some(partner_id), Some(channel_id))
                if violations.is_empty() =>
            {
                Ok(Self { timestamp, signature, external_id, partner_id, channel_id })
            }
            _ => Err(violations),
        }
    }
}

/// The credentials of `Authorization: Bearer <token>`, if any.
pub fn bearer_token(map: &HeaderMap) -> Option<&str> {
    let value = map.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Raw header value as text, when present and valid visible ASCII.
pub fn header_text<'a>(map: &'a HeaderMap, name: &str) -> Option<&'a str> {
    map.get(name).and_then(|value| value.to_str().ok())
}

fn check_content_type(map: &HeaderMap, violations: &mut Vec<FieldViolation>) {
    let is_json = header_text(map, CONTENT_TYPE)
        .and_then(|value| value.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false);
    if !is_json {
        violations.push(FieldViolation::content_type());
    }
}

fn timestamp_field(map: &HeaderMap, violations: &mut Vec<FieldViolation>) -> Option<String> {
    let value = text_field(map, X_TIMESTAMP, 1, usize::MAX, violations)?;
    if DateTime::parse_from_rfc3339(&value).is_err() {
        violations.push(FieldViolation::invalid(Location::Header, X_TIMESTAMP));
        return None;
    }
    Some(value)
}

fn text_field(
    map: &HeaderMap,
    name: &str,
    min_len: usize,
    max_len: usize,
    violations: &mut Vec<FieldViolation>,
) -> Option<String> {
    let Some(raw) = map.get(name) else {
        violations.push(FieldViolation::missing(Location::Header, name));
        return None;
    };
    let Ok(text) = raw.to_str() else {
        violations.push(FieldViolation::invalid(Location::Header, name));
        return None;
    };
    let length = text.chars().count();
    if length == 0 {
        violations.push(FieldViolation::missing(Location::Header, name));
        return None;
    }
    if length < min_len || length > max_len {
        violations.push(FieldViolation::invalid(Location::Header, name));
        return None;
    }
    Some(text.to_string())
}
