//! Wire-facing data transfer objects, validated at the gateway boundary.

pub mod game;
pub mod health;
pub mod validation;
pub mod ws;
