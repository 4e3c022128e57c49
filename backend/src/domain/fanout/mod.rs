//! Real-time fan-out of telemetry, deviations and in-app notifications.
//!
//! The bus keeps one bounded queue per subscriber behind a single registry
//! mutex. Publishing never blocks: a subscriber whose queue is full is evicted
//! and its stream ends once the buffered events have been read.

mod event;

pub use event::BusEvent;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::domain::AuthUser;

/// Default per-subscriber queue depth.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 16;

/// Handle identifying one registered subscriber.
pub type SubscriberId = u64;

struct Slot {
    viewer: AuthUser,
    sender: mpsc::Sender<BusEvent>,
    registered_at: DateTime<Utc>,
}

#[derive(Default)]
struct Registry {
    next_id: SubscriberId,
    slots: HashMap<SubscriberId, Slot>,
    closed: bool,
}

/// Many-reader hub for stream subscribers.
pub struct FanoutBus {
    registry: Arc<Mutex<Registry>>,
    buffer: usize,
}

impl FanoutBus {
    /// Create a bus whose subscribers buffer at most `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            buffer: buffer.max(1),
        }
    }

    /// Register `viewer` and return its subscription.
    ///
    /// The first event read from the subscription is always
    /// [`BusEvent::Connected`]; it does not count against the buffer.
    pub fn subscribe(&self, viewer: AuthUser, now: DateTime<Utc>) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let mut registry = lock(&self.registry);
        registry.next_id += 1;
        let id = registry.next_id;
        if registry.closed {
            // Nothing more will be published; hand back a stream that ends
            // right after the terminal message.
            if let Err(error) = sender.try_send(BusEvent::Shutdown) {
                debug!(subscriber = id, %error, "late subscriber missed shutdown");
            }
        } else {
            debug!(subscriber = id, user_id = %viewer.user_id, "subscriber registered");
            registry.slots.insert(
                id,
                Slot {
                    viewer,
                    sender,
                    registered_at: now,
                },
            );
        }
        Subscription {
            id,
            connected: Some(BusEvent::Connected {
                client_id: format!("client-{id}"),
            }),
            receiver,
            registry: Arc::clone(&self.registry),
        }
    }

    /// Drop a subscriber. Unknown or already removed ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        remove(&self.registry, id);
    }

    /// Deliver `event` to every subscriber allowed to see it.
    pub fn publish(&self, event: &BusEvent) {
        let mut registry = lock(&self.registry);
        let mut dropped = Vec::new();
        for (id, slot) in &registry.slots {
            if !event.is_visible_to(&slot.viewer) {
                continue;
            }
            match slot.sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        subscriber = id,
                        user_id = %slot.viewer.user_id,
                        event = event.name(),
                        "evicting slow subscriber"
                    );
                    dropped.push(*id);
                }
                Err(TrySendError::Closed(_)) => dropped.push(*id),
            }
        }
        for id in dropped {
            registry.slots.remove(&id);
        }
    }

    /// Send the terminal `shutdown` message and drop every subscriber.
    pub fn close(&self) {
        let mut registry = lock(&self.registry);
        registry.closed = true;
        for (id, slot) in registry.slots.drain() {
            if let Err(error) = slot.sender.try_send(BusEvent::Shutdown) {
                debug!(subscriber = id, %error, "shutdown not queued for subscriber");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).slots.len()
    }

    /// Registration time of a live subscriber.
    pub fn registered_at(&self, id: SubscriberId) -> Option<DateTime<Utc>> {
        lock(&self.registry).slots.get(&id).map(|slot| slot.registered_at)
    }
}

impl Default for FanoutBus {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

/// Receive side of one subscriber. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    connected: Option<BusEvent>,
    receiver: mpsc::Receiver<BusEvent>,
    registry: Arc<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event in FIFO order; `None` once the subscriber was evicted or the
    /// bus closed and the buffer is drained.
    pub async fn recv(&mut self) -> Option<BusEvent> {
        if let Some(connected) = self.connected.take() {
            return Some(connected);
        }
        self.receiver.recv().await
    }

    /// Next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<BusEvent> {
        self.connected.take().or_else(|| self.receiver.try_recv().ok())
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        remove(&self.registry, self.id);
    }
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // A panic while holding the lock leaves the map itself consistent.
    registry
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn remove(registry: &Mutex<Registry>, id: SubscriberId) {
    if lock(registry).slots.remove(&id).is_some() {
        debug!(subscriber = id, "subscriber removed");
    }
}

#[cfg(test)]
mod tests;
