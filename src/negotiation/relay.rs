//! Endpoint-to-page candidate relay.
//!
//! The endpoint reports its own candidates through a synchronous callback.
//! The relay turns each callback into a queued message and a background
//! worker hands them to the page in arrival order.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::endpoint::{Endpoint, IceCandidateEvent};
use crate::error::Error;
use crate::page::WebRtcPage;

use super::task::Worker;

// ============================================================================
// EndpointCandidateRelay
// ============================================================================

/// Forwards endpoint-gathered candidates to the page's `addIceCandidate`.
pub struct EndpointCandidateRelay {
    endpoint: Arc<dyn Endpoint>,
    worker: Worker<u64>,
}

impl fmt::Debug for EndpointCandidateRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointCandidateRelay")
            .field("finished", &self.worker.is_finished())
            .finish_non_exhaustive()
    }
}

impl EndpointCandidateRelay {
    /// Installs the endpoint handler and starts forwarding.
    ///
    /// Replaces any handler previously installed on `endpoint`.
    pub fn start(endpoint: Arc<dyn Endpoint>, page: WebRtcPage) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<IceCandidateEvent>();

        endpoint.set_ice_candidate_handler(Box::new(move |event: IceCandidateEvent| {
            // Receiver gone means the relay stopped; late candidates are dropped.
            let _ = tx.send(event);
        }));

        let worker = Worker::spawn("endpoint-candidate-relay", CancellationToken::new(), |cancel| {
            forward(page, rx, cancel)
        });

        Self { endpoint, worker }
    }

    /// Removes the endpoint handler and stops the worker.
    ///
    /// Returns the number of candidates handed to the page.
    pub async fn stop(self, grace: Duration) -> u64 {
        self.endpoint.clear_ice_candidate_handler();
        self.worker.shutdown(grace).await.unwrap_or_default()
    }
}

async fn forward(
    page: WebRtcPage,
    mut rx: mpsc::UnboundedReceiver<IceCandidateEvent>,
    cancel: CancellationToken,
) -> u64 {
    let mut relayed = 0;

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        trace!(participant = %page.participant(), candidate = %event.candidate, "Relaying endpoint candidate");

        let added = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            added = page.add_ice_candidate(&event) => added,
        };

        match added {
            Ok(()) => relayed += 1,
            Err(Error::PageClosed) => {
                debug!(participant = %page.participant(), "Page closed, relay exiting");
                break;
            }
            Err(e) => {
                warn!(participant = %page.participant(), error = %e, "addIceCandidate failed");
            }
        }
    }

    relayed
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::ParticipantId;
    use crate::testing::{MockEndpoint, MockPage};

    const GRACE: Duration = Duration::from_millis(500);

    fn event(n: u32) -> IceCandidateEvent {
        IceCandidateEvent {
            candidate: format!("candidate:{n} 1 UDP 1 192.168.1.{n} 9 typ host"),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        }
    }

    #[tokio::test]
    async fn test_relays_in_order() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("v=0"));
        let page = WebRtcPage::new(mock.clone(), ParticipantId::new("browser0"));

        let relay = EndpointCandidateRelay::start(endpoint.clone(), page);
        assert!(endpoint.has_handler());

        endpoint.emit(event(1));
        endpoint.emit(event(2));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(relay.stop(GRACE).await, 2);
        assert!(!endpoint.has_handler());

        let relayed: Vec<String> = mock
            .scripts()
            .into_iter()
            .filter(|s| s.starts_with("addIceCandidate("))
            .collect();
        assert_eq!(relayed.len(), 2);
        assert!(relayed[0].contains("192.168.1.1"));
        assert!(relayed[1].contains("192.168.1.2"));
    }

    #[tokio::test]
    async fn test_page_failure_is_logged_and_skipped() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("v=0"));
        let page = WebRtcPage::new(mock.clone(), ParticipantId::new("browser0"));
        mock.fail_scripts_containing("192.168.1.1");

        let relay = EndpointCandidateRelay::start(endpoint.clone(), page);
        endpoint.emit(event(1));
        endpoint.emit(event(2));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(relay.stop(GRACE).await, 1);
    }

    #[tokio::test]
    async fn test_emit_after_stop_is_dropped() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("v=0"));
        let page = WebRtcPage::new(mock.clone(), ParticipantId::new("browser0"));

        let relay = EndpointCandidateRelay::start(endpoint.clone(), page);
        relay.stop(GRACE).await;

        endpoint.emit(event(3));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(mock.scripts().is_empty());
    }
}
