//! Application state management
//!
//! Contains shared state accessible across all handlers. Export state is
//! never stored here: every export builds and drops its own context.

use crate::connection::ConnectionManager;
use crate::export::ExportOptions;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Registered source databases
    pub connections: ConnectionManager,

    /// Export options applied when a request does not override them
    pub export_defaults: ExportOptions,
}

impl AppState {
    pub fn new(export_defaults: ExportOptions) -> Self {
        Self {
            connections: ConnectionManager::new(),
            export_defaults,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
