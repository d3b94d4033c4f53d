// src/services/response.rs
//! Response formatting: the error envelope, success bodies and the headers
//! stamped on every response.

use crate::models::error::{ServiceCode, SnapError, CASE_CODE_SUCCESS, SUCCESS_MESSAGE};
use crate::models::headers;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{Local, SecondsFormat};
use serde_json::{Map, Value};

/// The wire form of a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub status: StatusCode,
    pub service: ServiceCode,
    pub case: &'static str,
    pub message: &'static str,
    pub additional: Option<String>,
}

impl ErrorEnvelope {
    pub fn from_error(error: &SnapError, service: ServiceCode) -> Self {
        Self {
            status: error.status(),
            service,
            case: error.case_code(),
            message: error.message(),
            additional: error.additional_message(),
        }
    }

    /// `status + service + case`, always seven digits.
    pub fn response_code(&self) -> String {
        format!("{}{}{}", self.status.as_u16(), self.service, self.case)
    }

    pub fn response_message(&self) -> String {
        match &self.additional {
            Some(extra) => format!("{} {}", self.message, extra),
            None => self.message.to_string(),
        }
    }
}

/// A formatted response, ready to be stamped and sent.
#[derive(Debug, Clone)]
pub struct SnapResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl SnapResponse {
    /// Success envelope: `responseCode`/`responseMessage` followed by the
    /// fields of `data` (which must be a JSON object to be merged).
    pub fn success(service: ServiceCode, data: Value) -> Self {
        let mut body = Map::new();
        body.insert(
            "responseCode".to_string(),
            Value::String(format!("{}{}{}", StatusCode::OK.as_u16(), service, CASE_CODE_SUCCESS)),
        );
        body.insert("responseMessage".to_string(), Value::String(SUCCESS_MESSAGE.to_string()));
        if let Value::Object(fields) = data {
            for (name, value) in fields {
                if name != "responseCode" && name != "responseMessage" {
                    body.insert(name, value);
                }
            }
        }
        Self {
            status: StatusCode::OK,
            body: Value::Object(body),
        }
    }

    pub fn from_error(error: &SnapError, service: ServiceCode) -> Self {
        let envelope = ErrorEnvelope::from_error(error, service);
        let mut body = Map::new();
        body.insert("responseCode".to_string(), Value::String(envelope.response_code()));
        body.insert("responseMessage".to_string(), Value::String(envelope.response_message()));
        Self {
            status: envelope.status,
            body: Value::Object(body),
        }
    }

    pub fn response_code(&self) -> Option<&str> {
        self.body.get("responseCode").and_then(Value::as_str)
    }

    pub fn is_server_error(&self) -> bool {
        self.status.is_server_error()
    }
}

/// Adds `X-Timestamp` (local time, millisecond precision, with offset) and
/// `Cache-Control: no-store`.
pub fn stamp_headers(map: &mut HeaderMap) {
    let now = Local::now().to_rfc3339_opts(SecondsFormat::Millis, false);
    if let Ok(value) = HeaderValue::from_str(&now) {
        map.insert(HeaderName::from_static(headers::X_TIMESTAMP), value);
    }
    map.insert(
        HeaderName::from_static(headers::CACHE_CONTROL),
        HeaderValue::from_static("no-store"),
    );
}

impl IntoResponse for SnapResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        stamp_headers(response.headers_mut());
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use serde_json::json;

    #[test]
    fn test_bill_not_found_code() {
        let envelope = ErrorEnvelope::from_error(&SnapError::BillNotFound, ServiceCode::VA_INQUIRY);
        assert_eq!(envelope.response_code(), "4042412");
        assert_eq!(envelope.response_message(), "Bill Not Found");
    }

    #[test]
    fn test_additional_message_is_space_joined() {
        let response = SnapResponse::from_error(&SnapError::InvalidSignature, ServiceCode::ACCESS_TOKEN);
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.body,
            json!({"responseCode": "4017300", "responseMessage": "Unauthorized Signature"})
        );
    }

    #[test]
    fn test_codes_are_always_seven_digits() {
        let errors = [
            SnapError::BadRequest { reason: None },
            SnapError::AccessTokenNotFound,
            SnapError::TransactionConflict,
            SnapError::TimeOut,
            SnapError::ExternalServerError("upstream".into()),
        ];
        for service in [ServiceCode::GENERAL, ServiceCode::VA_PAYMENT] {
            for error in &errors {
                let code = ErrorEnvelope::from_error(error, service).response_code();
                assert_eq!(code.len(), 7, "{}", code);
                assert!(code.chars().all(|c| c.is_ascii_digit()));
            }
        }
    }

    #[test]
    fn test_server_error_detail_stays_out_of_body() {
        let error = SnapError::InternalServerError("redis at 10.0.0.3 refused".into());
        let response = SnapResponse::from_error(&error, ServiceCode::VA_PAYMENT);
        assert_eq!(response.response_code(), Some("5002501"));
        assert!(!response.body.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn test_success_envelope_leads_with_codes() {
        let response = SnapResponse::success(
            ServiceCode::ACCESS_TOKEN,
            json!({"accessToken": "t", "tokenType": "BearerToken", "expiresIn": "899"}),
        );
        let keys: Vec<_> = response.body.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys[..2], ["responseCode", "responseMessage"]);
        assert_eq!(response.response_code(), Some("2007300"));
    }

    #[test]
    fn test_stamped_headers() {
        let response = SnapResponse::success(ServiceCode::GENERAL, json!({})).into_response();
        let map = response.headers();
        assert_eq!(map[headers::CACHE_CONTROL], "no-store");
        let stamp = map[headers::X_TIMESTAMP].to_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(stamp).is_ok());
        // millisecond precision: "...:SS.mmm+HH:MM"
        let fraction = stamp.split('.').nth(1).unwrap();
        assert_eq!(fraction.len(), "123+07:00".len());
    }
}
