//! Page media event listeners.
//!
//! A listener installs the page's `videoEvent` handler on one video tag and
//! polls the `status` element until it shows the awaited event.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::identifiers::ParticipantId;
use crate::negotiation::task::{Worker, deadline_after};
use crate::page::{ConsoleLogLevel, WebRtcPage};

use super::registry::EventWaitRegistry;

// ============================================================================
// EventListener
// ============================================================================

/// Background watcher for one media event on one video tag.
pub struct EventListener {
    video_tag: String,
    event: String,
    worker: Worker<bool>,
}

impl fmt::Debug for EventListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListener")
            .field("video_tag", &self.video_tag)
            .field("event", &self.event)
            .field("finished", &self.worker.is_finished())
            .finish()
    }
}

impl EventListener {
    /// Starts watching `event` on `video_tag`, giving up after `timeout`.
    ///
    /// On a match the registry key `(page participant, event)` is signalled.
    /// The caller subscribes the key.
    pub fn spawn(
        page: WebRtcPage,
        registry: Arc<EventWaitRegistry>,
        video_tag: &str,
        event: &str,
        timeout: Duration,
    ) -> Self {
        let watch = Watch {
            page,
            registry,
            video_tag: video_tag.to_string(),
            event: event.to_string(),
            deadline: deadline_after(Instant::now(), timeout),
        };

        let worker = Worker::spawn("event-listener", CancellationToken::new(), |cancel| {
            watch.run(cancel)
        });

        Self {
            video_tag: video_tag.to_string(),
            event: event.to_string(),
            worker,
        }
    }

    /// Returns the video tag being watched.
    #[inline]
    #[must_use]
    pub fn video_tag(&self) -> &str {
        &self.video_tag
    }

    /// Returns the awaited event name.
    #[inline]
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Returns `true` once the listener has matched, failed or timed out.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Stops the listener. Returns `true` if the event had been observed.
    pub async fn stop(self, grace: Duration) -> bool {
        self.worker.shutdown(grace).await.unwrap_or(false)
    }
}

// ============================================================================
// Watch Loop
// ============================================================================

struct Watch {
    page: WebRtcPage,
    registry: Arc<EventWaitRegistry>,
    video_tag: String,
    event: String,
    deadline: Instant,
}

impl Watch {
    async fn run(self, cancel: CancellationToken) -> bool {
        let participant = self.page.participant().clone();

        let installed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            installed = self.page.add_video_event_listener(&self.video_tag, &self.event) => installed,
        };
        if let Err(e) = installed {
            error!(
                %participant,
                tag = %self.video_tag,
                event = %self.event,
                error = %e,
                "Installing event listener failed"
            );
            return false;
        }

        loop {
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep_until(self.deadline) => break,
                status = self.page.read_status() => status,
            };

            match status {
                Ok(Some(status)) if status.eq_ignore_ascii_case(&self.event) => {
                    self.on_event(&participant).await;
                    return true;
                }
                Ok(_) => {}
                Err(Error::PageClosed) => {
                    debug!(%participant, event = %self.event, "Page closed, listener exiting");
                    return false;
                }
                Err(e) => {
                    error!(%participant, event = %self.event, error = %e, "Reading page status failed");
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep_until(self.deadline) => break,
                _ = tokio::time::sleep(self.page.poll_interval()) => {}
            }
        }

        error!(
            %participant,
            tag = %self.video_tag,
            event = %self.event,
            "Event not observed before timeout"
        );
        false
    }

    async fn on_event(&self, participant: &ParticipantId) {
        let message = format!("Event in {} tag: {}", self.video_tag, self.event);
        if let Err(e) = self.page.console_log(ConsoleLogLevel::Info, &message).await {
            debug!(%participant, error = %e, "Console log failed");
        }

        self.registry.signal(participant, &self.event);
        info!(%participant, tag = %self.video_tag, event = %self.event, "Event observed");
    }
}

// ============================================================================
// Tests
// ============================================================================
