// src/keys/mod.rs
pub mod credential;
