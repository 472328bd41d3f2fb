//! Upper-layer event delivery.
//!
//! Observers receive [`TransportEvent`]s in the order the dispatch task
//! produces them. Two flavors exist:
//!
//! | Kind | Runs on | Use |
//! |------|---------|-----|
//! | [`TransportObserver`] | dispatch task, synchronously | cheap reactions, counters, logging |
//! | [`EventStream`] | subscriber's own task | async processing |
//!
//! A slow [`TransportObserver`] delays every adapter, so long-running work
//! belongs behind an [`EventStream`].

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use ferry_core::TransportEvent;
use futures::Stream;
use tokio::sync::mpsc;
use tracing::trace;

/// Synchronous observer called on the dispatch task.
pub trait TransportObserver: Send + Sync {
    fn on_event(&self, event: &TransportEvent);
}

impl<F> TransportObserver for F
where
    F: Fn(&TransportEvent) + Send + Sync,
{
    fn on_event(&self, event: &TransportEvent) {
        self(event)
    }
}

/// A shared observer trait object.
pub type BoxedObserver = Arc<dyn TransportObserver>;

/// An in-order stream of every event emitted after subscription.
///
/// The stream is unbounded so the dispatch task never waits on a
/// subscriber. It ends when the manager shuts down.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl EventStream {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<TransportEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Waits for the next event. Returns `None` once the manager is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    /// Returns the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = TransportEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Fan-out to observers and subscribers, owned by the dispatch task.
#[derive(Default)]
pub(crate) struct ObserverSet {
    observers: Vec<BoxedObserver>,
    subscribers: Vec<mpsc::UnboundedSender<TransportEvent>>,
}

impl ObserverSet {
    pub fn add_observer(&mut self, observer: BoxedObserver) {
        self.observers.push(observer);
    }

    pub fn add_subscriber(&mut self, tx: mpsc::UnboundedSender<TransportEvent>) {
        self.subscribers.push(tx);
    }

    pub fn emit(&mut self, event: TransportEvent) {
        trace!(event = event.name(), "Emitting event");
        for observer in &self.observers {
            observer.on_event(&event);
        }
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.observers.len() + self.subscribers.len()
    }
}
