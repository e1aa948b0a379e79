use std::time::Duration;

use crate::store::TodoStore;

/// Shared state handed to every request handler.
#[derive(Clone, Debug)]
pub struct AppState {
    pub store: TodoStore,
    /// Artificial latency applied to every `/api` request.
    pub api_delay: Option<Duration>,
}

impl AppState {
    pub fn new(store: TodoStore) -> Self {
        Self {
            store,
            api_delay: None,
        }
    }

    pub fn with_api_delay(mut self, delay: Option<Duration>) -> Self {
        self.api_delay = delay.filter(|d| !d.is_zero());
        self
    }
}
