//! Per-station event queues feeding the frontend's server-sent event stream.
//!
//! [`EventStream`] keeps at most one live queue per station. Pushes wait until
//! the first subscriber ever connects, so nothing emitted at boot is lost;
//! after that, an event for a station without a queue is dropped. Events for
//! one station come out in the order they were pushed.
//!
//! Re-subscribing a station retires the previous queue: its sender is dropped
//! and the old [`EventSource`] ends. A push that finds the receiver gone
//! removes the queue instead of filling it.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::{mpsc, oneshot, watch};

use super::{PosEvent, StationId};

/// One queued message plus an optional delivery acknowledgement.
#[derive(Debug)]
struct Envelope {
    payload: serde_json::Value,
    delivered: Option<oneshot::Sender<()>>,
}

type Queue = mpsc::UnboundedSender<Envelope>;

/// Broadcaster of [`PosEvent`]s to station subscribers.
#[derive(Debug)]
pub struct EventStream {
    queues: Mutex<HashMap<StationId, Queue>>,
    has_subscriber: watch::Sender<bool>,
}

impl EventStream {
    /// Creates a broadcaster with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (has_subscriber, _) = watch::channel(false);
        Self {
            queues: Mutex::new(HashMap::new()),
            has_subscriber,
        }
    }

    /// Opens a fresh queue for `station`, replacing any previous one.
    ///
    /// The returned source first yields an empty `{}` handshake object, which
    /// browsers need before they consider the stream established.
    pub fn subscribe(&self, station: &StationId) -> EventSource {
        self.subscribe_with(station, &[])
    }

    /// Like [`Self::subscribe`], with `preamble` queued right after the
    /// handshake and ahead of anything pushed by other tasks.
    pub fn subscribe_with(&self, station: &StationId, preamble: &[PosEvent]) -> EventSource {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handshake = serde_json::Value::Object(serde_json::Map::new());
        for payload in std::iter::once(handshake).chain(preamble.iter().map(PosEvent::to_json)) {
            let _ = sender.send(Envelope {
                payload,
                delivered: None,
            });
        }

        if self.queues().insert(station.clone(), sender).is_some() {
            tracing::debug!(%station, "retired previous event queue");
        }
        self.has_subscriber.send_replace(true);
        tracing::info!(%station, "event stream subscribed");

        EventSource {
            station: station.clone(),
            receiver,
        }
    }

    /// Queues `event` for `station`.
    ///
    /// Waits until some station has subscribed at least once. Returns whether
    /// the event was queued; a station with no queue silently drops it.
    pub async fn push_to_station(&self, station: &StationId, event: &PosEvent) -> bool {
        self.wait_for_subscriber().await;
        self.enqueue(station, event.to_json(), None)
    }

    /// Queues `event` for `station` and waits until its subscriber has taken
    /// it off the queue.
    ///
    /// Returns immediately after queueing fails, and as soon as the queue is
    /// retired or its stream is dropped, so a vanished frontend never blocks
    /// the caller.
    pub async fn push_to_station_flushed(&self, station: &StationId, event: &PosEvent) -> bool {
        self.wait_for_subscriber().await;
        let (delivered, ack) = oneshot::channel();
        if !self.enqueue(station, event.to_json(), Some(delivered)) {
            return false;
        }
        ack.await.is_ok()
    }

    /// Queues `event` for every subscribed station.
    ///
    /// Waits until some station has subscribed at least once. Returns the
    /// number of stations the event was queued for.
    pub async fn push_to_all(&self, event: &PosEvent) -> usize {
        self.wait_for_subscriber().await;
        let payload = event.to_json();
        let mut queues = self.queues();
        queues.retain(|station, queue| {
            let alive = queue
                .send(Envelope {
                    payload: payload.clone(),
                    delivered: None,
                })
                .is_ok();
            if !alive {
                tracing::debug!(%station, "retired closed event queue");
            }
            alive
        });
        queues.len()
    }

    /// Returns `true` once any station has ever subscribed.
    #[must_use]
    pub fn has_subscriber(&self) -> bool {
        *self.has_subscriber.borrow()
    }

    /// Returns the number of stations with a live queue.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.queues().len()
    }

    /// Returns `true` if `station` currently has a queue.
    #[must_use]
    pub fn is_subscribed(&self, station: &StationId) -> bool {
        self.queues().contains_key(station)
    }

    async fn wait_for_subscriber(&self) {
        let mut ready = self.has_subscriber.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = ready.wait_for(|subscribed| *subscribed).await;
    }

    fn enqueue(
        &self,
        station: &StationId,
        payload: serde_json::Value,
        delivered: Option<oneshot::Sender<()>>,
    ) -> bool {
        let mut queues = self.queues();
        let Some(queue) = queues.get(station) else {
            tracing::debug!(%station, "no event queue for station, dropping event");
            return false;
        };
        if queue.send(Envelope { payload, delivered }).is_ok() {
            return true;
        }
        queues.remove(station);
        tracing::debug!(%station, "retired closed event queue");
        false
    }

    fn queues(&self) -> MutexGuard<'_, HashMap<StationId, Queue>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}

/// Live, push-based sequence of JSON events for one station.
///
/// Ends when the station re-subscribes. Dropping it (the frontend went away)
/// closes the queue so later pushes retire it.
#[derive(Debug)]
pub struct EventSource {
    station: StationId,
    receiver: mpsc::UnboundedReceiver<Envelope>,
}

impl EventSource {
    /// Returns the station this source belongs to.
    #[must_use]
    pub const fn station(&self) -> &StationId {
        &self.station
    }

    /// Waits for the next event. Returns `None` once the queue is retired.
    pub async fn next_event(&mut self) -> Option<serde_json::Value> {
        let envelope = self.receiver.recv().await?;
        Some(Self::open(envelope))
    }

    fn open(envelope: Envelope) -> serde_json::Value {
        if let Some(delivered) = envelope.delivered {
            let _ = delivered.send(());
        }
        envelope.payload
    }
}

impl Stream for EventSource {
    type Item = serde_json::Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx).map(|next| next.map(Self::open))
    }
}
