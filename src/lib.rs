//! Library crate for word-party-back, exposing modules for binaries and integration tests.

mod config;
mod dto;
mod error;
pub mod routes;
pub mod services;
pub mod state;

pub use config::AppConfig;
