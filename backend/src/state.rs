use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::TxnPolicy;
use crate::db::Store;
use crate::notify::NotificationDispatcher;
use crate::services::{CatalogService, EnrollmentService, SeatEvents};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub catalog: CatalogService,
    pub enrollment: Arc<EnrollmentService>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        dispatcher: Arc<dyn NotificationDispatcher>,
        event_capacity: usize,
        policy: TxnPolicy,
    ) -> Self {
        let store = Arc::new(Store::new(db));
        let events = SeatEvents::new(event_capacity);
        let enrollment = Arc::new(EnrollmentService::new(store.clone(), dispatcher, events, policy));

        Self {
            catalog: CatalogService::new(store.clone()),
            store,
            enrollment,
        }
    }
}
