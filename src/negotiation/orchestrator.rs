//! Deadline-bounded offer/answer negotiation.
//!
//! One call to [`NegotiationOrchestrator::negotiate`] runs two workers
//! under a single deadline:
//!
//! | Worker | Work |
//! |--------|------|
//! | candidate pump | page candidates → filter → endpoint |
//! | exchange | page setup → offer → endpoint answer → page |
//!
//! Both are stopped before the call returns, whatever the outcome.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::HarnessConfig;
use crate::endpoint::{CandidateSink, Endpoint};
use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::page::{IceServer, WebRtcChannel, WebRtcMode, WebRtcPage};

use super::pump::{CandidatePump, PumpStats};
use super::session::NegotiationSession;
use super::task::{Worker, deadline_after};

// ============================================================================
// NegotiationReport
// ============================================================================

/// Outcome of a successful negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiationReport {
    /// Session that negotiated.
    pub session_id: SessionId,
    /// Time from call entry to completion.
    pub elapsed: Duration,
    /// Candidate pump counters at shutdown.
    pub pump: PumpStats,
}

// ============================================================================
// NegotiationOrchestrator
// ============================================================================

/// Drives negotiation sessions against one signaling page.
#[derive(Clone)]
pub struct NegotiationOrchestrator {
    page: WebRtcPage,
    config: HarnessConfig,
}

impl fmt::Debug for NegotiationOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationOrchestrator")
            .field("participant", self.page.participant())
            .field("timeout_secs", &self.config.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl NegotiationOrchestrator {
    /// Creates an orchestrator for `page`.
    ///
    /// The page's poll interval is replaced by the configured one.
    #[must_use]
    pub fn new(page: WebRtcPage, config: HarnessConfig) -> Self {
        let page = page.with_poll_interval(config.script_poll_interval());
        Self { page, config }
    }

    /// Returns the page this orchestrator drives.
    #[inline]
    #[must_use]
    pub fn page(&self) -> &WebRtcPage {
        &self.page
    }

    /// Returns the harness configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Negotiates `session` before its deadline.
    ///
    /// Page candidates are forwarded to the endpoint for as long as the
    /// exchange runs. No worker outlives this call.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the deadline passes first
    /// - [`Error::Negotiation`] if any exchange step fails
    pub async fn negotiate(&self, session: &NegotiationSession) -> Result<NegotiationReport> {
        let timeout = session.timeout().unwrap_or_else(|| self.config.timeout());
        let started = Instant::now();
        let deadline = deadline_after(started, timeout);
        let grace = self.config.worker_grace();
        let session_id = session.id();

        info!(
            %session_id,
            participant = %self.page.participant(),
            channel = %session.channel(),
            mode = %session.mode(),
            timeout_ms = timeout.as_millis() as u64,
            "Negotiation starting"
        );

        let sink: Arc<dyn CandidateSink> = session.endpoint().clone();
        let pump = CandidatePump::start(
            Arc::new(self.page.clone()),
            sink,
            session.filter(),
            self.config.candidate_poll_interval(),
        );

        let exchange = Exchange {
            page: self.page.clone(),
            endpoint: Arc::clone(session.endpoint()),
            plan: self.plan(session),
        };
        let mut worker = Worker::spawn("offer-answer-exchange", CancellationToken::new(), |cancel| {
            exchange.run(cancel)
        });

        let outcome = worker.join_until(deadline).await;

        let (_, stats) = tokio::join!(worker.shutdown(grace), pump.stop(grace));

        match outcome {
            Some(Ok(Ok(()))) => {
                let elapsed = started.elapsed();
                info!(
                    %session_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    %stats,
                    "Negotiation complete"
                );
                Ok(NegotiationReport {
                    session_id,
                    elapsed,
                    pump: stats,
                })
            }
            Some(Ok(Err(e))) => {
                warn!(%session_id, error = %e, %stats, "Negotiation failed");
                Err(e)
            }
            Some(Err(e)) => {
                warn!(%session_id, error = %e, "Exchange worker failed");
                Err(Error::negotiation("exchange worker", e))
            }
            None => {
                warn!(%session_id, %stats, "Negotiation timed out");
                Err(Error::timeout(
                    format!("SDP negotiation of session {session_id}"),
                    timeout.as_millis() as u64,
                ))
            }
        }
    }

    fn plan(&self, session: &NegotiationSession) -> ExchangePlan {
        let ice_servers = if session.ice_servers().is_empty() {
            self.config.ice_servers.clone()
        } else {
            session.ice_servers().to_vec()
        };

        ExchangePlan {
            session_id: session.id(),
            channel: session.channel(),
            mode: session.mode(),
            test_name: session.test_name().map(str::to_string),
            custom_audio: session
                .custom_audio()
                .map(str::to_string)
                .or_else(|| self.config.custom_audio.clone()),
            use_data_channel: session.use_data_channel(),
            ice_servers,
        }
    }
}

// ============================================================================
// Exchange Worker
// ============================================================================

/// Page directives resolved from session and config.
struct ExchangePlan {
    session_id: SessionId,
    channel: WebRtcChannel,
    mode: WebRtcMode,
    test_name: Option<String>,
    custom_audio: Option<String>,
    use_data_channel: bool,
    ice_servers: Vec<IceServer>,
}

struct Exchange {
    page: WebRtcPage,
    endpoint: Arc<dyn Endpoint>,
    plan: ExchangePlan,
}

impl Exchange {
    async fn run(self, cancel: CancellationToken) -> Result<()> {
        let Self { page, endpoint, plan } = self;
        let session_id = plan.session_id;

        // Page setup
        if let Some(name) = &plan.test_name {
            guarded(&cancel, "addTestName", async {
                page.add_test_name(name).await;
                Ok(())
            })
            .await?;
        }
        guarded(&cancel, "appendStringToTitle", async {
            page.append_to_title(&plan.mode.to_string()).await;
            page.append_to_title(&plan.channel.to_string()).await;
            Ok(())
        })
        .await?;

        if let Some(url) = &plan.custom_audio {
            guarded(&cancel, "setCustomAudio", page.set_custom_audio(url)).await?;
        }
        if plan.use_data_channel {
            guarded(&cancel, "useDataChannels", page.use_data_channels()).await?;
        }
        if !plan.ice_servers.is_empty() {
            guarded(&cancel, "setIceServers", page.set_ice_servers(&plan.ice_servers)).await?;
        }
        guarded(&cancel, "media constraints", page.apply_channel(plan.channel)).await?;
        guarded(&cancel, plan.mode.js_function(), page.start_mode(plan.mode)).await?;
        debug!(%session_id, mode = %plan.mode, "Page peer started");

        // Offer
        let offer = guarded(&cancel, "sdpOffer", page.wait_for_sdp_offer(&cancel)).await?;
        trace!(%session_id, sdp_offer = %offer, "SDP offer");

        // Answer
        let answer = guarded(&cancel, "processOffer", endpoint.process_offer(&offer)).await?;
        if answer.trim().is_empty() {
            return Err(Error::negotiation(
                "processOffer",
                Error::protocol("endpoint returned an empty SDP answer"),
            ));
        }
        trace!(%session_id, sdp_answer = %answer, "SDP answer");

        guarded(&cancel, "gatherCandidates", endpoint.gather_candidates()).await?;
        guarded(&cancel, "processSdpAnswer", page.process_sdp_answer(&answer)).await?;

        debug!(%session_id, "Offer/answer exchange complete");
        Ok(())
    }
}

/// Races `step` against cancellation and labels its failure.
async fn guarded<T>(
    cancel: &CancellationToken,
    step: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result.map_err(|e| match e {
            Error::Cancelled => e,
            other => Error::negotiation(step, other),
        }),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{AddressFamilyFilter, CandidateTypeFilter};
    use crate::identifiers::ParticipantId;
    use crate::negotiation::task::ABORT_WAIT;
    use crate::testing::{MockEndpoint, MockPage, init_tracing};

    const HOST: &str = "candidate:1 1 UDP 2122260223 10.0.0.5 54321 typ host";
    const LATE: &str = "candidate:2 1 UDP 2122260223 10.0.0.6 54322 typ host";

    fn orchestrator(mock: &Arc<MockPage>) -> NegotiationOrchestrator {
        init_tracing();
        let page = WebRtcPage::new(mock.clone(), ParticipantId::new("browser0"));
        NegotiationOrchestrator::new(page, HarnessConfig::new())
    }

    fn session(endpoint: &Arc<MockEndpoint>) -> NegotiationSession {
        NegotiationSession::builder()
            .endpoint(endpoint.clone())
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap()
    }

    /// Pushes a candidate and gives any leftover pump time to pick it up.
    async fn assert_no_late_delivery(mock: &MockPage, endpoint: &MockEndpoint) {
        let before = endpoint.add_calls();
        mock.push_candidate(LATE);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(endpoint.add_calls(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_without_offer() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("v=0 answer"));
        mock.push_candidate(HOST);

        let started = Instant::now();
        let err = orchestrator(&mock).negotiate(&session(&endpoint)).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(matches!(err, Error::Timeout { timeout_ms: 5000, .. }));
        assert!(started.elapsed() < Duration::from_secs(6));
        assert_eq!(endpoint.received().len(), 1);
        assert!(mock.sdp_answer().is_none());

        assert_no_late_delivery(&mock, &endpoint).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_negotiation() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("v=0 answer"));
        mock.set_offer("v=0 offer");

        let report = orchestrator(&mock).negotiate(&session(&endpoint)).await.unwrap();

        assert!(report.elapsed < Duration::from_secs(1));
        assert_eq!(mock.sdp_answer().as_deref(), Some("v=0 answer"));
        assert!(endpoint.gathered());

        assert_no_late_delivery(&mock, &endpoint).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_setup_order() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("v=0 answer"));
        mock.set_offer("v=0 offer");

        let session = NegotiationSession::builder()
            .endpoint(endpoint.clone())
            .channel(WebRtcChannel::AudioOnly)
            .mode(WebRtcMode::SendOnly)
            .test_name("LoopbackTest.testAudio")
            .custom_audio("http://files/fiware.wav")
            .data_channel(true)
            .ice_server(IceServer::stun("stun:stun.example.org"))
            .build()
            .unwrap();

        orchestrator(&mock).negotiate(&session).await.unwrap();

        let scripts: Vec<String> = mock
            .scripts()
            .into_iter()
            .filter(|s| s != crate::page::LOCAL_CANDIDATES_SCRIPT)
            .collect();

        let position = |prefix: &str| {
            scripts
                .iter()
                .position(|s| s.starts_with(prefix))
                .unwrap_or_else(|| panic!("{prefix} not issued: {scripts:?}"))
        };

        let order = [
            position("addTestName(\"LoopbackTest.testAudio\")"),
            position("appendStringToTitle(\"Send only\")"),
            position("appendStringToTitle(\"(audio-only)\")"),
            position("setCustomAudio(\"http://files/fiware.wav\")"),
            position("useDataChannels()"),
            position("setIceServers("),
            position("setAudioUserMediaConstraints()"),
            position("startSendOnly()"),
            position("return sdpOffer;"),
            position("processSdpAnswer("),
        ];
        assert!(order.windows(2).all(|w| w[0] < w[1]), "{scripts:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_rejection() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::rejecting("unsupported codec"));
        mock.set_offer("v=0 offer");

        let err = orchestrator(&mock).negotiate(&session(&endpoint)).await.unwrap_err();

        match err {
            Error::Negotiation { message, cause } => {
                assert_eq!(message, "processOffer");
                assert!(cause.is_transport_error());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(mock.sdp_answer().is_none());
        assert!(!endpoint.gathered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_answer_is_unusable() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("  "));
        mock.set_offer("v=0 offer");

        let err = orchestrator(&mock).negotiate(&session(&endpoint)).await.unwrap_err();

        assert!(matches!(
            err,
            Error::Negotiation { ref cause, .. } if matches!(**cause, Error::Protocol { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_endpoint_times_out() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("v=0 answer"));
        endpoint.hang_on_offer();
        mock.set_offer("v=0 offer");

        let started = Instant::now();
        let err = orchestrator(&mock).negotiate(&session(&endpoint)).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(6));
        assert!(!endpoint.gathered());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_overshoot_bounded_by_one_grace() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("v=0 answer"));
        endpoint.hang_on_offer();
        mock.hang_scripts_containing(crate::page::LOCAL_CANDIDATES_SCRIPT);
        mock.set_offer("v=0 offer");

        let orchestrator = orchestrator(&mock);
        let bound = Duration::from_secs(5) + orchestrator.config().worker_grace() + ABORT_WAIT;

        let started = Instant::now();
        let err = orchestrator.negotiate(&session(&endpoint)).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() <= bound, "{:?}", started.elapsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_session_timeout() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("v=0 answer"));
        mock.set_offer("v=0 offer");

        let session = NegotiationSession::builder()
            .endpoint(endpoint.clone())
            .timeout(Duration::MAX)
            .build()
            .unwrap();

        orchestrator(&mock).negotiate(&session).await.unwrap();
        assert_eq!(mock.sdp_answer().as_deref(), Some("v=0 answer"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_page_script_times_out() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("v=0 answer"));
        mock.hang_scripts_containing("startSendRecv");
        mock.set_offer("v=0 offer");

        let started = Instant::now();
        let err = orchestrator(&mock).negotiate(&session(&endpoint)).await.unwrap_err();

        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(6));
        assert!(!mock.scripts().iter().any(|s| s == "return sdpOffer;"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_script_failure() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("v=0 answer"));
        mock.fail_scripts_containing("startSendRecv");

        let err = orchestrator(&mock).negotiate(&session(&endpoint)).await.unwrap_err();

        assert!(matches!(err, Error::Negotiation { ref message, .. } if message == "startSendRecv();"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_filters_apply_during_negotiation() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("v=0 answer"));
        mock.push_candidate(HOST);

        let session = NegotiationSession::builder()
            .endpoint(endpoint.clone())
            .family_filter(AddressFamilyFilter::Ipv4)
            .type_filter(CandidateTypeFilter::Relay)
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        let orchestrator = orchestrator(&mock);
        let negotiation = tokio::spawn(async move { orchestrator.negotiate(&session).await });

        tokio::time::sleep(Duration::from_millis(400)).await;
        mock.set_offer("v=0 offer");

        let report = negotiation.await.unwrap().unwrap();
        assert_eq!(report.pump.delivered, 1);
        assert_eq!(
            endpoint.received()[0].raw(),
            "candidate:1 1 UDP 2122260223 10.0.0.254 54321 typ host"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_custom_audio_applies_when_session_has_none() {
        let mock = Arc::new(MockPage::new());
        let endpoint = Arc::new(MockEndpoint::answering("v=0 answer"));
        mock.set_offer("v=0 offer");

        let page = WebRtcPage::new(mock.clone(), ParticipantId::new("browser0"));
        let config = HarnessConfig::new().with_custom_audio("http://files/config.wav");
        NegotiationOrchestrator::new(page, config)
            .negotiate(&session(&endpoint))
            .await
            .unwrap();

        assert!(
            mock.scripts()
                .iter()
                .any(|s| s == "setCustomAudio(\"http://files/config.wav\");")
        );
    }
}
