// src/models/error.rs
//! Error taxonomy for the SNAP security envelope.
//!
//! Every wire-visible failure is one variant of [`SnapError`]. A variant
//! carries its HTTP status, two-digit case code and default message; the
//! caller supplies the two-digit [`ServiceCode`] when the error is turned
//! into a response. The 7-digit `responseCode` is always
//! `status + service + case`.

use axum::http::StatusCode;
use std::fmt;
use thiserror::Error;

/// Case code for a successful response.
pub const CASE_CODE_SUCCESS: &str = "00";

/// Message for a successful response.
pub const SUCCESS_MESSAGE: &str = "Successful";

/// Two-digit service identifier, the middle part of every response code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceCode([u8; 2]);

impl ServiceCode {
    /// Service code used when no specific service applies.
    pub const GENERAL: ServiceCode = ServiceCode(*b"00");
    /// Access token (B2B) issuance.
    pub const ACCESS_TOKEN: ServiceCode = ServiceCode(*b"73");
    /// Virtual account inquiry.
    pub const VA_INQUIRY: ServiceCode = ServiceCode(*b"24");
    /// Virtual account payment.
    pub const VA_PAYMENT: ServiceCode = ServiceCode(*b"25");

    /// Parses a service code. Exactly two ASCII digits are accepted.
    pub fn new(code: &str) -> Result<Self, InvalidServiceCode> {
        match code.as_bytes() {
            [a, b] if a.is_ascii_digit() && b.is_ascii_digit() => Ok(ServiceCode([*a, *b])),
            _ => Err(InvalidServiceCode(code.to_string())),
        }
    }

    /// The code as a two character string slice.
    pub fn as_str(&self) -> &str {
        // Both bytes are ASCII digits, checked at construction.
        std::str::from_utf8(&self.0).unwrap_or("00")
    }
}

impl fmt::Display for ServiceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by [`ServiceCode::new`] for anything but two ASCII digits.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("service code must be exactly two digits, got {0:?}")]
pub struct InvalidServiceCode(pub String);

/// Every failure condition the envelope can report on the wire.
#[derive(Debug, Error)]
pub enum SnapError {
    #[error("bad request")]
    BadRequest { reason: Option<String> },

    #[error("invalid field format: {}", .0.join(", "))]
    InvalidFieldFormat(Vec<String>),

    #[error("missing mandatory field: {}", .0.join(", "))]
    MissingMandatoryField(Vec<String>),

    #[error("access denied")]
    AccessDenied,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("access token invalid")]
    AccessTokenInvalid,

    #[error("access token not found")]
    AccessTokenNotFound,

    #[error("invalid transaction status")]
    TransactionInvalid,

    #[error("account not found")]
    AccountNotFound,

    #[error("virtual account not found")]
    VirtualAccountNotFound,

    #[error("bill not found")]
    BillNotFound,

    #[error("invalid amount")]
    InvalidAmount,

    #[error("bill is paid")]
    BillPaid,

    #[error("inconsistent request")]
    InconsistentRequest,

    #[error("bill is expired")]
    BillExpired,

    #[error("duplicate external id")]
    TransactionConflict,

    #[error("general error")]
    GeneralError,

    #[error("internal server error: {0}")]
    InternalServerError(String),

    #[error("external server error: {0}")]
    ExternalServerError(String),

    #[error("time out")]
    TimeOut,

    /// Anything raised outside the taxonomy. Formatted as an internal
    /// server error; the inner error is only ever logged.
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl SnapError {
    /// Content-type violation, reported ahead of every field error.
    pub fn content_type() -> Self {
        SnapError::BadRequest {
            reason: Some("Content Type Should Be JSON".to_string()),
        }
    }

    /// HTTP status of the response carrying this error.
    pub fn status(&self) -> StatusCode {
        use SnapError::*;
        match self {
            BadRequest { .. } | InvalidFieldFormat(_) | MissingMandatoryField(_) => {
                StatusCode::BAD_REQUEST
            }
            AccessDenied | InvalidSignature | AccessTokenInvalid | AccessTokenNotFound => {
                StatusCode::UNAUTHORIZED
            }
            TransactionInvalid | AccountNotFound | VirtualAccountNotFound | BillNotFound
            | InvalidAmount | BillPaid | InconsistentRequest | BillExpired => StatusCode::NOT_FOUND,
            TransactionConflict => StatusCode::CONFLICT,
            GeneralError | InternalServerError(_) | ExternalServerError(_) | Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            TimeOut => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Two-digit case code, the last part of the response code.
    pub fn case_code(&self) -> &'static str {
        use SnapError::*;
        match self {
            BadRequest { .. } => "00",
            InvalidFieldFormat(_) => "01",
            MissingMandatoryField(_) => "02",
            AccessDenied | InvalidSignature => "00",
            AccessTokenInvalid => "01",
            AccessTokenNotFound => "03",
            TransactionInvalid => "00",
            AccountNotFound | VirtualAccountNotFound => "11",
            BillNotFound => "12",
            InvalidAmount => "13",
            BillPaid => "14",
            InconsistentRequest => "18",
            BillExpired => "19",
            TransactionConflict => "00",
            GeneralError => "00",
            InternalServerError(_) | Unexpected(_) => "01",
            ExternalServerError(_) => "02",
            TimeOut => "00",
        }
    }

    /// Default message template of the variant.
    pub fn message(&self) -> &'static str {
        use SnapError::*;
        match self {
            BadRequest { .. } => "Bad Request",
            InvalidFieldFormat(_) => "Invalid Field Format",
            MissingMandatoryField(_) => "Missing Mandatory Field",
            AccessDenied | InvalidSignature => "Unauthorized",
            AccessTokenInvalid => "Invalid Token (B2B)",
            AccessTokenNotFound => "Token Not Found (B2B)",
            TransactionInvalid => "Invalid Transaction Status",
            AccountNotFound => "Account Not Found",
            VirtualAccountNotFound => "Virtual Account Not Found",
            BillNotFound => "Bill Not Found",
            InvalidAmount => "Invalid Amount",
            BillPaid => "Bill is Paid",
            InconsistentRequest => "Inconsistent Request",
            BillExpired => "Bill is Expired",
            TransactionConflict => "Conflict",
            GeneralError => "General Error",
            InternalServerError(_) | Unexpected(_) => "Internal Server Error",
            ExternalServerError(_) => "External Server Error",
            TimeOut => "Time Out",
        }
    }

    /// Detail appended to the message, if any. Server-side detail
    /// (`InternalServerError` text, `Unexpected` errors) is never exposed.
    pub fn additional_message(&self) -> Option<String> {
        use SnapError::*;
        match self {
            BadRequest { reason } => reason.clone(),
            InvalidFieldFormat(fields) | MissingMandatoryField(fields) => {
                Some(format!("[{}]", fields.join(", ")))
            }
            AccessDenied => Some("Access Denied".to_string()),
            InvalidSignature => Some("Signature".to_string()),
            _ => None,
        }
    }

    /// Whether the error is a server-side failure (status >= 500).
    pub fn is_server_error(&self) -> bool {
        self.status().is_server_error()
    }
}
