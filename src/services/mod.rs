// src/services/mod.rs
pub mod api_server;
pub mod pipeline;
pub mod response;
pub mod signature;
pub mod token_service;
pub mod validation;
