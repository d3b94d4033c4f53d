// src/services/pipeline.rs
//! Per-request orchestration of the security envelope.
//!
//! ```text
//! RECEIVED -> TOKEN_VERIFIED -> SIGNATURE_VERIFIED -> DEDUPED
//!          -> BUSINESS_PROCESSED -> FORMATTED
//! ```
//!
//! Token issuance stops after SIGNATURE_VERIFIED. A failure at any stage
//! jumps straight to FORMATTED. Failures with status >= 500 are logged and
//! release the idempotency key this request reserved, if any.

use crate::keys::credential::{Credential, CredentialError};
use crate::models::error::{ServiceCode, SnapError};
use crate::models::headers::{bearer_token, header_text, TokenRequestHeaders, TransactionHeaders};
use crate::models::token::{AccessTokenClaims, GRANT_TYPE_CLIENT_CREDENTIALS, TOKEN_TYPE};
use crate::services::response::SnapResponse;
use crate::services::signature::verify_symmetric_with_fallback;
use crate::services::token_service::TokenService;
use crate::services::validation::{classify, FieldViolation, Location, ViolationKind};
use crate::storage::idempotency::IdempotencyCache;
use crate::utils::canonical::{transactional_string_to_sign, BodyOrdering};
use async_trait::async_trait;
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// Pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    TokenVerified,
    SignatureVerified,
    Deduped,
    BusinessProcessed,
    Formatted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "RECEIVED",
            Stage::TokenVerified => "TOKEN_VERIFIED",
            Stage::SignatureVerified => "SIGNATURE_VERIFIED",
            Stage::Deduped => "DEDUPED",
            Stage::BusinessProcessed => "BUSINESS_PROCESSED",
            Stage::Formatted => "FORMATTED",
        };
        f.write_str(name)
    }
}

/// The transport-neutral view of an inbound request.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What business logic sees once a request has passed the envelope.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    pub service: ServiceCode,
    pub headers: TransactionHeaders,
    pub claims: AccessTokenClaims,
    pub body: Value,
}

/// Business logic behind a transactional endpoint.
#[async_trait]
pub trait TransactionHandler: Send + Sync {
    /// Shape check of the request body, run before the external id is
    /// reserved so a malformed request does not use it up.
    fn check_body(&self, _body: &Value) -> Result<(), SnapError> {
        Ok(())
    }

    /// Returns the response fields to place after `responseCode` and
    /// `responseMessage`, or a typed error.
    async fn handle(&self, context: &TransactionContext) -> Result<Value, SnapError>;
}

/// Per-partner leniency settings.
#[derive(Debug, Clone, Default)]
pub struct PartnerPolicy {
    /// Header that may carry a caller-claimed string-to-sign for a single
    /// fallback verification. `None` disables the fallback.
    pub signature_fallback_header: Option<String>,
    pub body_ordering: BodyOrdering,
}

struct Failure {
    stage: Stage,
    error: SnapError,
}

impl Failure {
    fn at(stage: Stage) -> impl FnOnce(SnapError) -> Failure {
        move |error| Failure { stage, error }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    credential: Arc<Credential>,
    tokens: TokenService,
    cache: IdempotencyCache,
    policy: PartnerPolicy,
}

impl Pipeline {
    pub fn new(
        credential: Arc<Credential>,
        token_expires_in: u64,
        cache: IdempotencyCache,
        policy: PartnerPolicy,
    ) -> Result<Self, CredentialError> {
        let tokens = TokenService::new(Arc::clone(&credential), token_expires_in)?;
        Ok(Self {
            credential,
            tokens,
            cache,
            policy,
        })
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// `POST /snap/v1.0/access-token/b2b`.
    pub async fn issue_token(&self, request: &InboundRequest) -> SnapResponse {
        let service = ServiceCode::ACCESS_TOKEN;
        match self.run_issue(request).await {
            Ok(data) => SnapResponse::success(service, data),
            Err(failure) => {
                log_failure(service, &request.path, &failure);
                SnapResponse::from_error(&failure.error, service)
            }
        }
    }

    async fn run_issue(&self, request: &InboundRequest) -> Result<Value, Failure> {
        let extracted = TokenRequestHeaders::extract(&request.headers);
        let mut violations = match &extracted {
            Ok(_) => Vec::new(),
            Err(violations) => violations.clone(),
        };
        if !violations.iter().any(|v| v.kind == ViolationKind::ContentType) {
            let body = parse_body(&request.body).map_err(Failure::at(Stage::Received))?;
            match body.get("grantType") {
                None | Some(Value::Null) => {
                    violations.push(FieldViolation::missing(Location::Body, "grantType"))
                }
                Some(Value::String(grant)) if grant == GRANT_TYPE_CLIENT_CREDENTIALS => {}
                Some(_) => violations.push(FieldViolation::invalid(Location::Body, "grantType")),
            }
        }
        let headers = match extracted {
            Ok(headers) if violations.is_empty() => headers,
            _ => return Err(Failure::at(Stage::Received)(classify(&violations))),
        };

        let tokens = self.tokens.clone();
        let token = offload(move || tokens.issue(&headers))
            .await
            .map_err(Failure::at(Stage::Received))?;

        Ok(json!({
            "accessToken": token.token,
            "tokenType": TOKEN_TYPE,
            "expiresIn": token.expires_in().to_string(),
        }))
    }

    /// A transactional request under `service`, with `handler` as the
    /// business logic.
    pub async fn transact(
        &self,
        service: ServiceCode,
        request: &InboundRequest,
        handler: &dyn TransactionHandler,
    ) -> SnapResponse {
        let mut reserved = None;
        let outcome = self.run_transaction(service, request, handler, &mut reserved).await;

        match outcome {
            Ok(data) => SnapResponse::success(service, data),
            Err(failure) => {
                log_failure(service, &request.path, &failure);
                if failure.error.is_server_error() {
                    if let Some(key) = reserved {
                        self.cache.release(&key).await;
                    }
                }
                SnapResponse::from_error(&failure.error, service)
            }
        }
    }

    async fn run_transaction(
        &self,
        service: ServiceCode,
        request: &InboundRequest,
        handler: &dyn TransactionHandler,
        reserved: &mut Option<String>,
    ) -> Result<Value, Failure> {
        // TOKEN_VERIFIED
        let token = bearer_token(&request.headers).map(str::to_string);
        let tokens = self.tokens.clone();
        let validated = token.clone();
        let claims = offload(move || tokens.validate(validated.as_deref()))
            .await
            .map_err(Failure::at(Stage::Received))?;
        let token = token.unwrap_or_default();

        let headers = TransactionHeaders::extract(&request.headers)
            .map_err(|violations| Failure::at(Stage::TokenVerified)(classify(&violations)))?;
        let body = parse_body(&request.body).map_err(Failure::at(Stage::TokenVerified))?;

        // SIGNATURE_VERIFIED
        let alternate = self
            .policy
            .signature_fallback_header
            .as_deref()
            .and_then(|name| header_text(&request.headers, name))
            .map(|claimed| claimed.as_bytes().to_vec());
        let method = request.method.as_str().to_string();
        let path = request.path.clone();
        let timestamp = headers.timestamp.clone();
        let signature = headers.signature.clone();
        let ordering = self.policy.body_ordering;
        let credential = Arc::clone(&self.credential);
        let body = offload(move || {
            let message =
                transactional_string_to_sign(&method, &path, Some(token.as_str()), &body, &timestamp, ordering)
                    .map_err(|e| SnapError::Unexpected(e.into()))?;
            verify_symmetric_with_fallback(
                &message,
                alternate.as_deref(),
                &signature,
                credential.client_secret(),
            )
            .map_err(|_| SnapError::InvalidSignature)?;
            Ok(body)
        })
        .await
        .map_err(Failure::at(Stage::TokenVerified))?;
        handler
            .check_body(&body)
            .map_err(Failure::at(Stage::SignatureVerified))?;

        // DEDUPED
        let key = self.cache.key(&headers.partner_id, &headers.external_id);
        self.cache
            .reserve(&key)
            .await
            .map_err(Failure::at(Stage::SignatureVerified))?;
        *reserved = Some(key);

        // BUSINESS_PROCESSED
        let context = TransactionContext {
            service,
            headers,
            claims,
            body,
        };
        handler
            .handle(&context)
            .await
            .map_err(Failure::at(Stage::Deduped))
    }
}

/// Runs CPU-bound crypto work on the blocking pool.
async fn offload<T, F>(work: F) -> Result<T, SnapError>
where
    F: FnOnce() -> Result<T, SnapError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SnapError::Unexpected(anyhow::Error::new(e)))?
}

fn parse_body(raw: &Bytes) -> Result<Value, SnapError> {
    serde_json::from_slice(raw).map_err(|_| SnapError::BadRequest { reason: None })
}

fn log_failure(service: ServiceCode, path: &str, failure: &Failure) {
    let code = crate::services::response::ErrorEnvelope::from_error(&failure.error, service)
        .response_code();
    if failure.error.is_server_error() {
        log::error!(
            "{} service={} stage={} responseCode={}: {}",
            path,
            service,
            failure.stage,
            code,
            failure.error
        );
    } else {
        log::debug!("{} rejected after {} with {}", path, failure.stage, code);
    }
}
