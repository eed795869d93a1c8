//! Application state for the API server

use crate::server::ContentServer;
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned per request (cheap Arc clone); gives handlers access to the
/// content server and everything hanging off it.
#[derive(Clone)]
pub struct AppState {
    /// The content server instance
    pub server: Arc<ContentServer>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(server: Arc<ContentServer>) -> Self {
        Self { server }
    }
}
