pub mod auth;
pub mod config;
pub mod dependencies;
pub mod error;
pub mod events;
pub mod graph;
pub mod rest;
pub mod store;

use std::sync::Arc;

use config::ServiceConfig;
use dependencies::DependencyService;
use events::EventBroadcaster;
use store::Store;

/// Shared application state passed to every request handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServiceConfig>,
    pub store: Arc<Store>,
    /// Event fan-out — the bridge to the external pub/sub fabric subscribes here.
    pub broadcaster: Arc<EventBroadcaster>,
    /// Edge lifecycle + graph read operations.
    pub deps: Arc<DependencyService>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    pub fn new(config: Arc<ServiceConfig>, store: Arc<Store>) -> Self {
        let broadcaster = Arc::new(EventBroadcaster::new());
        let deps = Arc::new(DependencyService::new(store.clone(), broadcaster.clone()));
        Self {
            config,
            store,
            broadcaster,
            deps,
            started_at: std::time::Instant::now(),
        }
    }
}
