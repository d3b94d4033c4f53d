// src/models/mod.rs
pub mod error;
pub mod headers;
pub mod token;
