use std::sync::Arc;
use wayfare_store::MemoryBookingService;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<MemoryBookingService>,
}

impl AppState {
    pub fn new(backend: Arc<MemoryBookingService>) -> Self {
        Self { backend }
    }
}
