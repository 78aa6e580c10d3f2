use std::sync::Arc;
use std::time::Duration;

use labelbridge_printing::{Orientation, PrintDispatcher};
use labelbridge_settings::{MappingResolver, DEFAULT_PRINT_TIMEOUT_SECS};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<PrintDispatcher>,
    pub resolver: Arc<dyn MappingResolver>,
    /// Used when a request carries no `orientation` query parameter.
    pub default_orientation: Orientation,
    /// Upper bound on how long a handler waits for one dispatch.
    pub print_timeout: Duration,
}

impl AppState {
    pub fn new(dispatcher: PrintDispatcher, resolver: Arc<dyn MappingResolver>) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            resolver,
            default_orientation: Orientation::default(),
            print_timeout: Duration::from_secs(DEFAULT_PRINT_TIMEOUT_SECS),
        }
    }

    pub fn with_default_orientation(mut self, orientation: Orientation) -> Self {
        self.default_orientation = orientation;
        self
    }

    pub fn with_print_timeout(mut self, timeout: Duration) -> Self {
        self.print_timeout = timeout;
        self
    }
}
