// src/utils/canonical.rs
//! Canonical strings-to-sign.
//!
//! Two forms exist:
//! - token issuance: `client_id|timestamp`
//! - transactional: `METHOD:PATH:[ACCESS_TOKEN:]DIGEST:TIMESTAMP`
//!
//! `DIGEST` is the lowercase hex SHA-256 of the minified JSON body. When no
//! access token applies its segment is dropped but the delimiter stays,
//! producing `METHOD:PATH::DIGEST:TIMESTAMP`.
//!
//! The minified body is pure ASCII: every non-ASCII character in a string or
//! key is written as a lowercase `\uXXXX` escape, astral characters as a
//! surrogate pair.

use crate::utils::crypto::sha256_hex;
use serde::ser::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::ser::{Formatter, Serializer};
use serde_json::{Map, Value};
use std::io;

/// Key order used when minifying a request body.
///
/// Partners sign whatever order they sent, so `AsReceived` is the default.
/// `SortedKeys` exists for partners whose signer sorts before hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyOrdering {
    #[default]
    AsReceived,
    SortedKeys,
}

/// String-to-sign for the token issuance request.
pub fn token_string_to_sign(client_id: &str, timestamp: &str) -> Vec<u8> {
    format!("{}|{}", client_id, timestamp).into_bytes()
}

/// Compact JSON output with non-ASCII characters escaped.
struct AsciiFormatter;

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut start = 0;
        for (index, ch) in fragment.char_indices() {
            if ch.is_ascii() {
                continue;
            }
            writer.write_all(fragment[start..index].as_bytes())?;
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                write!(writer, "\\u{:04x}", unit)?;
            }
            start = index + ch.len_utf8();
        }
        writer.write_all(fragment[start..].as_bytes())
    }
}

fn to_ascii_json(value: &Value) -> Result<String, serde_json::Error> {
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, AsciiFormatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(serde_json::Error::custom)
}

/// Minifies a JSON body: no inserted whitespace, keys in `ordering`,
/// non-ASCII escaped.
///
/// An empty object (or `null`) minifies to the empty string, not `{}`.
pub fn minify_body(body: &Value, ordering: BodyOrdering) -> Result<String, serde_json::Error> {
    match body {
        Value::Null => Ok(String::new()),
        Value::Object(map) if map.is_empty() => Ok(String::new()),
        _ => match ordering {
            BodyOrdering::AsReceived => to_ascii_json(body),
            BodyOrdering::SortedKeys => to_ascii_json(&sort_keys(body)),
        },
    }
}

/// Lowercase hex SHA-256 of the minified body.
pub fn body_digest(body: &Value, ordering: BodyOrdering) -> Result<String, serde_json::Error> {
    Ok(sha256_hex(minify_body(body, ordering)?.as_bytes()))
}

/// String-to-sign for a transactional request.
pub fn transactional_string_to_sign(
    method: &str,
    path: &str,
    access_token: Option<&str>,
    body: &Value,
    timestamp: &str,
    ordering: BodyOrdering,
) -> Result<Vec<u8>, serde_json::Error> {
    let digest = body_digest(body, ordering)?;
    let method = method.to_ascii_uppercase();
    let message = match access_token.filter(|token| !token.is_empty()) {
        Some(token) => format!("{}:{}:{}:{}:{}", method, path, token, digest, timestamp),
        None => format!("{}:{}::{}:{}", method, path, digest, timestamp),
    };
    Ok(message.into_bytes())
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_keys(v)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}
