//! Application state for the API server

use crate::{BiblioTranslator, Config};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request (cheap Arc clone).
#[derive(Clone)]
pub struct AppState {
    /// The translator instance handling every task operation
    pub translator: Arc<BiblioTranslator>,

    /// Configuration (for read access, limit updates go through the translator)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(translator: Arc<BiblioTranslator>, config: Arc<Config>) -> Self {
        Self { translator, config }
    }
}
