// src/demo/mod.rs
pub mod billing;
