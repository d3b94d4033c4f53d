// src/lib.rs
//! # SNAP security envelope
//!
//! Mutual authentication, per-request integrity, replay protection and the
//! standardized error envelope of the SNAP open-payment API.
//!
//! ## Layout
//! 1. **Utils**: canonical strings-to-sign and hashing
//! 2. **Keys**: partner credential and RSA key material
//! 3. **Models**: error taxonomy, headers, token bodies
//! 4. **Services**: signatures, tokens, response formatting, the request
//!    pipeline and its axum binding
//! 5. **Storage**: idempotency backends
//! 6. **Demo**: a fixed virtual-account ledger behind the pipeline

pub mod config;
pub mod demo;
pub mod keys;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;
