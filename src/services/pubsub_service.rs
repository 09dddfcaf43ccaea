use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::events::Event;
use crate::state::subscribers::SubscriberRegistry;

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

/// Offers events to every registered subscriber.
///
/// Delivery is best effort, at most once per subscriber per event: a full or
/// closing channel loses that event and nothing else.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<SubscriberRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SubscriberRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.registry
    }

    /// Never blocks and never fails as a whole.
    pub fn publish(&self, event: Event) -> Delivery {
        // Take a snapshot so we don't hold the registry lock while sending.
        let subscribers = self.registry.snapshot();

        let mut delivery = Delivery::default();
        if subscribers.is_empty() {
            return delivery;
        }

        for (id, tx) in subscribers {
            match tx.try_send(event.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(subscriber = id, event = event.name(), "Subscriber lagging, event dropped");
                    delivery.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => delivery.dropped += 1,
            }
        }

        debug!(
            event = event.name(),
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            "Event published"
        );
        delivery
    }
}
