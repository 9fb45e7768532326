//! One-shot event rendezvous between listeners and waiters.
//!
//! Each `(participant, event)` key moves through:
//!
//! ```text
//! unsubscribed ──subscribe──▶ subscribed ──signal──▶ fired ──wait──▶ consumed
//!                                 │                                   ▲
//!                                 └──────────── wait (timeout) ───────┘
//! ```
//!
//! A consumed key is removed; waiting on it again is an error until the
//! next `subscribe`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::{debug, info, trace};

use crate::error::{Error, Result};
use crate::identifiers::ParticipantId;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EventKey {
    participant: ParticipantId,
    event: String,
}

impl EventKey {
    fn new(participant: &ParticipantId, event: &str) -> Self {
        Self {
            participant: participant.clone(),
            event: event.to_string(),
        }
    }
}

struct Subscription {
    id: u64,
    /// Taken by the first `signal`.
    signal: Option<oneshot::Sender<()>>,
    /// Taken by the first `wait`.
    fired: Option<oneshot::Receiver<()>>,
}

// ============================================================================
// EventWaitRegistry
// ============================================================================

/// Subscriptions keyed by participant and event name.
///
/// Thread-safe; share it behind an `Arc`.
#[derive(Default)]
pub struct EventWaitRegistry {
    entries: Mutex<FxHashMap<EventKey, Subscription>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventWaitRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWaitRegistry")
            .field("subscriptions", &self.len())
            .finish()
    }
}

impl EventWaitRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh subscription, replacing any stale one for the key.
    ///
    /// A waiter still parked on the replaced subscription wakes with `false`.
    pub fn subscribe(&self, participant: &ParticipantId, event: &str) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let replaced = self.entries.lock().insert(
            EventKey::new(participant, event),
            Subscription {
                id,
                signal: Some(tx),
                fired: Some(rx),
            },
        );

        info!(%participant, event, replaced = replaced.is_some(), "Subscribed to event");
    }

    /// Fires the subscription for the key.
    ///
    /// Returns `true` only for the call that fired it. Repeated signals and
    /// signals without a subscription are no-ops.
    pub fn signal(&self, participant: &ParticipantId, event: &str) -> bool {
        let sender = self
            .entries
            .lock()
            .get_mut(&EventKey::new(participant, event))
            .and_then(|sub| sub.signal.take());

        match sender {
            Some(tx) => {
                debug!(%participant, event, "Event signalled");
                // The receiver may already be gone after a timed-out wait.
                let _ = tx.send(());
                true
            }
            None => {
                trace!(%participant, event, "Signal ignored");
                false
            }
        }
    }

    /// Waits up to `timeout` for the key to fire, then removes it.
    ///
    /// Returns `Ok(true)` if fired, `Ok(false)` on timeout or if the
    /// subscription was replaced meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSubscription`] without waiting if the key has no
    /// subscription or is already being waited on.
    pub async fn wait(
        &self,
        participant: &ParticipantId,
        event: &str,
        timeout: Duration,
    ) -> Result<bool> {
        let key = EventKey::new(participant, event);

        let (id, fired) = {
            let mut entries = self.entries.lock();
            let pending = entries
                .get_mut(&key)
                .and_then(|sub| sub.fired.take().map(|rx| (sub.id, rx)));

            pending.ok_or_else(|| Error::no_subscription(participant.clone(), event))?
        };

        // Removes the key even if this future is dropped mid-wait.
        let _consume = ConsumeOnDrop {
            entries: &self.entries,
            key,
            id,
        };

        info!(%participant, event, timeout_ms = timeout.as_millis() as u64, "Waiting for event");

        let received = matches!(tokio::time::timeout(timeout, fired).await, Ok(Ok(())));

        if !received {
            debug!(%participant, event, "Event wait ended without signal");
        }

        Ok(received)
    }

    /// Returns `true` if the key has a subscription.
    #[must_use]
    pub fn is_subscribed(&self, participant: &ParticipantId, event: &str) -> bool {
        self.entries
            .lock()
            .contains_key(&EventKey::new(participant, event))
    }

    /// Drops every subscription of `participant`.
    pub fn clear_participant(&self, participant: &ParticipantId) {
        self.entries
            .lock()
            .retain(|key, _| &key.participant != participant);
    }

    /// Drops every subscription.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Returns the number of live subscriptions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if there are no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes a waited-on subscription unless `subscribe` replaced it.
struct ConsumeOnDrop<'a> {
    entries: &'a Mutex<FxHashMap<EventKey, Subscription>>,
    key: EventKey,
    id: u64,
}

impl Drop for ConsumeOnDrop<'_> {
    fn drop(&mut self) {
        let mut entries = self.entries.lock();
        if entries.get(&self.key).is_some_and(|sub| sub.id == self.id) {
            entries.remove(&self.key);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
