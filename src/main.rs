// src/main.rs

//! # SNAP API demo server - Main Entry Point
//!
//! Loads settings, builds the partner credential and the idempotency
//! backend once, then serves the SNAP routes backed by the demo billing
//! ledger.
//!
//! ## Settings (see `snap_envelope::config`)
//! - `SNAP_PARTNER__CLIENT_ID`, `SNAP_PARTNER__CLIENT_SECRET`,
//!   `SNAP_PARTNER__TOKEN_PASSPHRASE`: partner credential
//! - `SNAP_PARTNER__PUBLIC_KEY_PATH`: partner RSA public key (DER)
//! - `SNAP_CACHE__BACKEND`: `memory` (default) or `redis`
//! - `SNAP_SERVER__BIND`: listen address (default 127.0.0.1:3000)

use snap_envelope::config::{load_credential, Settings};
use snap_envelope::demo::billing::{BillingDemo, InquiryHandler, PaymentHandler};
use snap_envelope::services::api_server::{ApiServer, TOKEN_PATH, VA_INQUIRY_PATH, VA_PAYMENT_PATH};
use snap_envelope::services::pipeline::Pipeline;
use snap_envelope::storage::build_store;
use snap_envelope::storage::idempotency::IdempotencyCache;
use std::sync::Arc;

/// # Initialization Sequence
/// 1. Load settings (`.env`, config file, environment)
/// 2. Build the partner credential
/// 3. Build the idempotency backend
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let settings = Settings::load()?;
    let credential = Arc::new(load_credential(&settings.partner)?);
    log::info!("loaded credential for partner {}", credential.client_id());

    let store = build_store(settings.cache.backend, settings.cache.redis_url.as_deref()).await?;
    let cache = IdempotencyCache::new(store, settings.namespace.clone(), settings.timeout());
    let pipeline = Pipeline::new(
        credential,
        settings.token_expire,
        cache,
        settings.partner.policy(),
    )?;

    let billing = BillingDemo::new();
    let api_server = ApiServer::new(
        pipeline,
        Arc::new(InquiryHandler::new(billing.clone())),
        Arc::new(PaymentHandler::new(billing)),
        settings.server.cors_origins.clone(),
    );

    log::info!("available endpoints:");
    log::info!("- POST {}", TOKEN_PATH);
    log::info!("- POST {}", VA_INQUIRY_PATH);
    log::info!("- POST {}", VA_PAYMENT_PATH);

    api_server.run(settings.server.bind).await
}
