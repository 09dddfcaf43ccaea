//! Lifecycle of one live-update connection.
//!
//! `Connecting -> Streaming -> Closed`. Opening registers a fresh subscriber;
//! the stream then waits on its channel and on a cancellation token (server
//! shutdown, connection timeout, or an explicit cancel). Whatever ends the
//! `Streaming` phase, including the transport dropping the stream after a
//! disconnect or a write error, the subscriber is unregistered.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse;
use futures::Stream;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::events::Event;
use crate::state::subscribers::{SubscriberHandle, SubscriberRegistry};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Connecting,
    Streaming,
    Closed,
}

pub struct EventStream {
    registry: Arc<SubscriberRegistry>,
    subscriber: Option<SubscriberHandle>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    phase: StreamPhase,
}

impl EventStream {
    /// A stream in `Connecting`, not yet registered.
    pub fn new(state: &AppState) -> Self {
        Self {
            registry: Arc::clone(state.registry()),
            subscriber: None,
            cancel: state.shutdown.child_token(),
            timeout: state.streams.timeout,
            deadline: None,
            phase: StreamPhase::Connecting,
        }
    }

    /// Register a fresh subscriber and enter `Streaming`.
    ///
    /// Does nothing outside `Connecting`; a closed stream stays closed.
    pub fn connect(&mut self) {
        if self.phase != StreamPhase::Connecting {
            return;
        }

        let subscriber = self.registry.register();
        debug!(subscriber = subscriber.id(), "Event stream open");

        self.deadline = self.timeout.map(|t| Instant::now() + t);
        self.subscriber = Some(subscriber);
        self.phase = StreamPhase::Streaming;
    }

    pub fn open(state: &AppState) -> Self {
        let mut stream = Self::new(state);
        stream.connect();
        stream
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Token that ends this stream when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event to write, or `None` once the stream is closed.
    pub async fn next_event(&mut self) -> Option<Event> {
        if self.phase != StreamPhase::Streaming {
            return None;
        }
        let subscriber = self.subscriber.as_mut()?;
        let id = subscriber.id();

        let deadline = self.deadline;
        let next = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            _ = wait_until(deadline) => {
                debug!(subscriber = id, "Event stream timed out");
                None
            }
            event = subscriber.recv() => event,
        };

        if next.is_none() {
            self.close();
        }
        next
    }

    /// Unregister and enter `Closed`. Idempotent.
    pub fn close(&mut self) {
        if self.phase == StreamPhase::Closed {
            return;
        }
        if let Some(subscriber) = self.subscriber.as_mut() {
            subscriber.unregister();
            debug!(subscriber = subscriber.id(), "Event stream closed");
        }
        self.phase = StreamPhase::Closed;
    }

    /// Adapt into the body of an SSE response.
    pub fn into_sse(self) -> impl Stream<Item = Result<sse::Event, Infallible>> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            let event = stream.next_event().await?;
            Some((Ok(event.to_sse()), stream))
        })
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.close();
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
