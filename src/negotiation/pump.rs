//! Page-to-endpoint candidate forwarding.
//!
//! The pump polls a [`CandidateSource`] on a fixed interval, classifies and
//! filters every entry it has not seen yet, and hands survivors to a
//! [`CandidateSink`]. A monotonic cursor guarantees each source index is
//! processed at most once per session.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::candidate::{CandidateFilter, Decision, classify};
use crate::endpoint::CandidateSink;
use crate::error::Error;
use crate::page::CandidateSource;

use super::task::Worker;

// ============================================================================
// Constants
// ============================================================================

/// Default interval between source polls.
pub const DEFAULT_CANDIDATE_POLL: Duration = Duration::from_millis(300);

// ============================================================================
// PumpStats
// ============================================================================

/// Counters reported when a pump stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PumpStats {
    /// Source entries processed.
    pub consumed: u64,
    /// Candidates accepted by the sink.
    pub delivered: u64,
    /// Candidates dropped by the filter.
    pub filtered: u64,
    /// Entries that failed classification.
    pub malformed: u64,
    /// Candidates the sink rejected.
    pub sink_failures: u64,
}

impl fmt::Display for PumpStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "consumed={} delivered={} filtered={} malformed={} sink_failures={}",
            self.consumed, self.delivered, self.filtered, self.malformed, self.sink_failures
        )
    }
}

#[derive(Default)]
struct Counters {
    consumed: AtomicU64,
    delivered: AtomicU64,
    filtered: AtomicU64,
    malformed: AtomicU64,
    sink_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PumpStats {
        PumpStats {
            consumed: self.consumed.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// CandidatePump
// ============================================================================

/// Forwards page candidates to the endpoint until stopped.
pub struct CandidatePump {
    source: Arc<dyn CandidateSource>,
    sink: Arc<dyn CandidateSink>,
    filter: CandidateFilter,
    poll_interval: Duration,
    cursor: usize,
    shrunk: bool,
    counters: Arc<Counters>,
}

impl CandidatePump {
    /// Spawns a pump task and returns its handle.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(
        source: Arc<dyn CandidateSource>,
        sink: Arc<dyn CandidateSink>,
        filter: CandidateFilter,
        poll_interval: Duration,
    ) -> PumpHandle {
        let counters = Arc::new(Counters::default());

        let pump = Self {
            source,
            sink,
            filter,
            poll_interval,
            cursor: 0,
            shrunk: false,
            counters: Arc::clone(&counters),
        };

        debug!(
            family = %filter.family,
            typ = %filter.typ,
            poll_ms = poll_interval.as_millis() as u64,
            "Candidate pump starting"
        );

        let worker = Worker::spawn("candidate-pump", CancellationToken::new(), |cancel| {
            pump.run(cancel)
        });

        PumpHandle { worker, counters }
    }

    async fn run(mut self, cancel: CancellationToken) {
        loop {
            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                read = self.source.read_all() => read,
            };

            match read {
                Ok(entries) => {
                    if self.drain(entries, &cancel).await.is_break() {
                        break;
                    }
                }
                Err(Error::PageClosed) => {
                    debug!("Candidate source closed, pump exiting");
                    break;
                }
                Err(e) => warn!(error = %e, "Reading page candidates failed"),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        debug!(stats = %self.counters.snapshot(), "Candidate pump stopped");
    }

    /// Processes entries past the cursor.
    async fn drain(&mut self, entries: Vec<String>, cancel: &CancellationToken) -> ControlFlow<()> {
        if entries.len() < self.cursor {
            if !self.shrunk {
                warn!(
                    len = entries.len(),
                    cursor = self.cursor,
                    "Candidate source shrank below cursor, ignoring"
                );
                self.shrunk = true;
            }
            return ControlFlow::Continue(());
        }
        self.shrunk = false;

        for raw in entries.into_iter().skip(self.cursor) {
            if cancel.is_cancelled() {
                return ControlFlow::Break(());
            }

            self.cursor += 1;
            Counters::bump(&self.counters.consumed);

            let candidate = match classify(&raw) {
                Ok(candidate) => candidate,
                Err(e) => {
                    Counters::bump(&self.counters.malformed);
                    warn!(error = %e, "Dropping malformed candidate");
                    continue;
                }
            };

            let Decision::Keep(candidate) = self.filter.apply(&candidate) else {
                Counters::bump(&self.counters.filtered);
                trace!(candidate = %raw, "Candidate filtered out");
                continue;
            };

            trace!(candidate = %candidate, "Forwarding candidate");

            let added = tokio::select! {
                biased;
                _ = cancel.cancelled() => return ControlFlow::Break(()),
                added = self.sink.add_candidate(candidate) => added,
            };

            match added {
                Ok(()) => Counters::bump(&self.counters.delivered),
                Err(e) => {
                    Counters::bump(&self.counters.sink_failures);
                    warn!(candidate = %raw, error = %e, "Endpoint rejected candidate");
                }
            }
        }

        ControlFlow::Continue(())
    }
}

// ============================================================================
// PumpHandle
// ============================================================================

/// Handle to a running [`CandidatePump`].
///
/// Dropping the handle cancels the pump without waiting for it.
pub struct PumpHandle {
    worker: Worker<()>,
    counters: Arc<Counters>,
}

impl fmt::Debug for PumpHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PumpHandle")
            .field("stats", &self.counters.snapshot())
            .field("finished", &self.worker.is_finished())
            .finish()
    }
}

impl PumpHandle {
    /// Returns the counters so far.
    #[must_use]
    pub fn stats(&self) -> PumpStats {
        self.counters.snapshot()
    }

    /// Returns `true` if the pump task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Cancels the pump, waits up to `grace`, then aborts it.
    ///
    /// No sink call starts after this returns.
    pub async fn stop(self, grace: Duration) -> PumpStats {
        self.worker.shutdown(grace).await;
        self.counters.snapshot()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::candidate::{AddressFamilyFilter, CandidateTypeFilter};
    use crate::error::Result;
    use crate::identifiers::ParticipantId;
    use crate::page::WebRtcPage;
    use crate::testing::{MockEndpoint, MockPage, init_tracing};

    const HOST_A: &str = "candidate:1 1 UDP 2122260223 10.0.0.5 54321 typ host";
    const HOST_B: &str = "candidate:2 1 UDP 2122260223 10.0.0.6 54322 typ host";
    const HOST_C: &str = "candidate:3 1 UDP 2122260223 10.0.0.7 54323 typ host";
    const HOST_V6: &str = "candidate:4 1 UDP 2122260223 fe80::1 54324 typ host";
    const GRACE: Duration = Duration::from_millis(500);

    fn start(mock: &Arc<MockPage>, endpoint: &Arc<MockEndpoint>, filter: CandidateFilter) -> PumpHandle {
        init_tracing();
        let page = WebRtcPage::new(mock.clone(), ParticipantId::new("browser0"));
        CandidatePump::start(
            Arc::new(page),
            endpoint.clone(),
            filter,
            DEFAULT_CANDIDATE_POLL,
        )
    }

    fn tick() -> tokio::time::Sleep {
        tokio::time::sleep(DEFAULT_CANDIDATE_POLL + Duration::from_millis(50))
    }

    #[tokio::test(start_paused = true)]
    async fn test_forwards_each_entry_once() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("answer"));
        mock.push_candidate(HOST_A);
        mock.push_candidate(HOST_B);

        let handle = start(&mock, &endpoint, CandidateFilter::default());
        tick().await;
        mock.push_candidate(HOST_C);
        tick().await;
        tick().await;

        let stats = handle.stop(GRACE).await;
        let received: Vec<String> = endpoint.received().into_iter().map(|c| c.into_raw()).collect();
        assert_eq!(received, vec![HOST_A, HOST_B, HOST_C]);
        assert_eq!(endpoint.add_calls(), 3);
        assert_eq!(stats.consumed, 3);
        assert_eq!(stats.delivered, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_entries_are_counted_and_skipped() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("answer"));
        mock.push_candidate("candidate:garbage");
        mock.push_candidate(HOST_A);

        let handle = start(&mock, &endpoint, CandidateFilter::default());
        tick().await;

        let stats = handle.stop(GRACE).await;
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(endpoint.received().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_drops_excluded_family() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("answer"));
        mock.push_candidate(HOST_A);
        mock.push_candidate(HOST_V6);

        let filter = CandidateFilter::new(AddressFamilyFilter::Ipv6, CandidateTypeFilter::All);
        let handle = start(&mock, &endpoint, filter);
        tick().await;

        let stats = handle.stop(GRACE).await;
        assert_eq!(stats.filtered, 1);
        assert_eq!(endpoint.received()[0].raw(), HOST_V6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failures_do_not_stop_pump() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("answer"));
        endpoint.fail_adds();
        mock.push_candidate(HOST_A);

        let handle = start(&mock, &endpoint, CandidateFilter::default());
        tick().await;
        mock.push_candidate(HOST_B);
        tick().await;

        assert!(!handle.is_finished());
        let stats = handle.stop(GRACE).await;
        assert_eq!(stats.sink_failures, 2);
        assert_eq!(endpoint.add_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_sink_calls_after_stop() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("answer"));
        mock.push_candidate(HOST_A);

        let handle = start(&mock, &endpoint, CandidateFilter::default());
        tick().await;
        handle.stop(GRACE).await;

        mock.push_candidate(HOST_B);
        tick().await;
        tick().await;
        assert_eq!(endpoint.add_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_closed_ends_pump() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("answer"));

        let handle = start(&mock, &endpoint, CandidateFilter::default());
        tick().await;
        mock.close();
        tick().await;

        assert!(handle.is_finished());
        assert_eq!(handle.stop(GRACE).await, PumpStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_errors_keep_polling() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("answer"));
        mock.push_candidate_value(serde_json::json!(42));

        let handle = start(&mock, &endpoint, CandidateFilter::default());
        tick().await;
        tick().await;

        assert!(!handle.is_finished());
        assert_eq!(handle.stop(GRACE).await.consumed, 0);
    }

    /// Source whose contents can be replaced wholesale.
    struct ReplaceableSource(Mutex<Vec<String>>);

    #[async_trait]
    impl CandidateSource for ReplaceableSource {
        async fn read_all(&self) -> Result<Vec<String>> {
            Ok(self.0.lock().clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shrinking_source_is_ignored() {
        let source = Arc::new(ReplaceableSource(Mutex::new(vec![HOST_A.into(), HOST_B.into()])));
        let endpoint = Arc::new(MockEndpoint::answering("answer"));

        let handle = CandidatePump::start(
            source.clone(),
            endpoint.clone(),
            CandidateFilter::default(),
            DEFAULT_CANDIDATE_POLL,
        );
        tick().await;

        *source.0.lock() = vec![HOST_C.into()];
        tick().await;
        assert_eq!(endpoint.add_calls(), 2);

        // Grows past the cursor again: only index 2 is new.
        *source.0.lock() = vec![HOST_A.into(), HOST_B.into(), HOST_C.into()];
        tick().await;

        let stats = handle.stop(GRACE).await;
        assert_eq!(stats.consumed, 3);
        assert_eq!(endpoint.received()[2].raw(), HOST_C);
    }
}
