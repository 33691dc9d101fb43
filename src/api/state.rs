use std::sync::Arc;

use crate::services::Bot;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<Bot>,
}

impl AppState {
    pub fn new(bot: Arc<Bot>) -> Self {
        Self { bot }
    }
}
