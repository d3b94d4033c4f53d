// tests/common/mod.rs
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use snap_envelope::demo::billing::{BillingDemo, InquiryHandler, PaymentHandler};
use snap_envelope::keys::credential::{Credential, KeyMaterial};
use snap_envelope::services::api_server::ApiServer;
use snap_envelope::services::pipeline::{PartnerPolicy, Pipeline, TransactionHandler};
use snap_envelope::storage::idempotency::IdempotencyCache;
use snap_envelope::storage::memory::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub const CLIENT_ID: &str = "XJAPE8888";
pub const CLIENT_SECRET: &str = "client-secret";
pub const TOKEN_PASSPHRASE: &str = "token-pass";
pub const TIMESTAMP: &str = "2025-02-01T15:30:32.843+07:00";

const PARTNER_PKCS8: &[u8] = include_bytes!("../fixtures/partner.pk8.der");
const PARTNER_PUBLIC: &[u8] = include_bytes!("../fixtures/partner.pub.der");

/// The resource server's view of the partner: public key only.
pub fn server_credential() -> Arc<Credential> {
    let key = KeyMaterial::public_from_der(PARTNER_PUBLIC).unwrap();
    Arc::new(Credential::new(CLIENT_ID, CLIENT_SECRET, TOKEN_PASSPHRASE, Some(key)).unwrap())
}

/// The partner's own credential: private key, no token passphrase.
pub fn partner_credential() -> Credential {
    let key = KeyMaterial::private_from_der(PARTNER_PKCS8).unwrap();
    Credential::new(CLIENT_ID, CLIENT_SECRET, "", Some(key)).unwrap()
}

pub fn pipeline() -> Pipeline {
    let cache = IdempotencyCache::new(Arc::new(MemoryStore::new()), "snapapi", Duration::from_secs(2));
    Pipeline::new(server_credential(), 899, cache, PartnerPolicy::default()).unwrap()
}

pub fn demo_app() -> Router {
    let billing = BillingDemo::new();
    app_with(
        Arc::new(InquiryHandler::new(billing.clone())),
        Arc::new(PaymentHandler::new(billing)),
    )
}

pub fn app_with(inquiry: Arc<dyn TransactionHandler>, payment: Arc<dyn TransactionHandler>) -> Router {
    ApiServer::new(pipeline(), inquiry, payment, Vec::new()).router()
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

pub async fn send(app: &Router, method: &str, path: &str, headers: HeaderMap, body: String) -> Reply {
    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::from(body))
        .unwrap();
    *request.headers_mut() = headers;

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    Reply { status, headers, body }
}
