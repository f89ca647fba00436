//! Shared application state: configuration plus the room registry.

pub mod registry;
pub mod room;
pub mod scoring;
pub mod timer;

use std::sync::Arc;

use crate::config::AppConfig;

pub use self::registry::RoomRegistry;

/// Cheaply cloneable handle to the application state.
pub type SharedState = Arc<AppState>;

/// Central application state owned by the process root and injected into the
/// gateway, so tests can spin up several independent instances in-process.
pub struct AppState {
    config: AppConfig,
    registry: RoomRegistry,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply.
    pub fn new(config: AppConfig) -> SharedState {
        Arc::new(Self {
            config,
            registry: RoomRegistry::new(),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Registry of live rooms keyed by PIN.
    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }
}
