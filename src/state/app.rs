use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::errors::StoreError;
use crate::persistence::Store;
use crate::services::pubsub_service::Broadcaster;
use crate::state::site::SharedState;
use crate::state::subscribers::SubscriberRegistry;

/// Settings each event stream runs with.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub keep_alive: Duration,
    pub timeout: Option<Duration>,
}

impl From<&AppConfig> for StreamSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            keep_alive: Duration::from_secs(cfg.keep_alive_secs.max(1)),
            timeout: cfg.stream_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Everything a handler needs, built once at startup and cloned into the
/// router.
#[derive(Clone)]
pub struct AppState {
    pub site: Arc<SharedState>,
    pub broadcaster: Broadcaster,
    pub streams: StreamSettings,
    pub server_version: String,

    /// Cancelled on shutdown; every event stream watches a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(cfg: &AppConfig, store: Arc<dyn Store>) -> Result<Self, StoreError> {
        let site = Arc::new(SharedState::load(store)?);
        let registry = Arc::new(SubscriberRegistry::new(cfg.subscriber_buffer));

        Ok(Self {
            site,
            broadcaster: Broadcaster::new(registry),
            streams: StreamSettings::from(cfg),
            server_version: cfg.server_version.clone(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        self.broadcaster.registry()
    }
}
