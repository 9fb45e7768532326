//! High-level handle for one participant's WebRTC test page.
//!
//! [`WebRtcTestPage`] ties together the negotiation orchestrator, the
//! endpoint candidate relay and media event subscriptions for a single
//! browser page.
//!
//! # Example
//!
//! ```ignore
//! use webrtc_harness::{HarnessConfig, WebRtcChannel, WebRtcMode, WebRtcTestPage};
//!
//! let page = WebRtcTestPage::new(executor, "browser0".into(), HarnessConfig::from_env()?)?;
//!
//! page.subscribe_events("playing");
//! page.init_webrtc(endpoint, WebRtcChannel::AudioAndVideo, WebRtcMode::SendRecv).await?;
//! assert!(page.wait_for_event("playing").await?);
//!
//! page.stop_webrtc().await?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::HarnessConfig;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::events::{EventListener, EventWaitRegistry};
use crate::identifiers::ParticipantId;
use crate::negotiation::{
    EndpointCandidateRelay, NegotiationOrchestrator, NegotiationReport, NegotiationSession,
};
use crate::page::{ConsoleLogLevel, ScriptExecutor, WebRtcChannel, WebRtcMode, WebRtcPage};

// ============================================================================
// Constants
// ============================================================================

/// Id of the remote video element.
pub const REMOTE_VIDEO_TAG: &str = "video";

/// Id of the local video element.
pub const LOCAL_VIDEO_TAG: &str = "local";

// ============================================================================
// WebRtcTestPage
// ============================================================================

/// One participant's test page with its negotiation and event machinery.
pub struct WebRtcTestPage {
    orchestrator: NegotiationOrchestrator,
    registry: Arc<EventWaitRegistry>,
    listeners: Mutex<Vec<EventListener>>,
    relay: Mutex<Option<EndpointCandidateRelay>>,
}

impl fmt::Debug for WebRtcTestPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRtcTestPage")
            .field("participant", self.participant())
            .field("listeners", &self.listeners.lock().len())
            .field("relaying", &self.relay.lock().is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// WebRtcTestPage - Construction
// ============================================================================

impl WebRtcTestPage {
    /// Creates a test page with its own event registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `config` is invalid.
    pub fn new(
        executor: Arc<dyn ScriptExecutor>,
        participant: ParticipantId,
        config: HarnessConfig,
    ) -> Result<Self> {
        Self::with_registry(executor, participant, config, Arc::new(EventWaitRegistry::new()))
    }

    /// Creates a test page sharing `registry` with other pages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if `config` is invalid.
    pub fn with_registry(
        executor: Arc<dyn ScriptExecutor>,
        participant: ParticipantId,
        config: HarnessConfig,
        registry: Arc<EventWaitRegistry>,
    ) -> Result<Self> {
        config.validate()?;

        let page = WebRtcPage::new(executor, participant);

        Ok(Self {
            orchestrator: NegotiationOrchestrator::new(page, config),
            registry,
            listeners: Mutex::new(Vec::new()),
            relay: Mutex::new(None),
        })
    }

    /// Returns the participant id.
    #[inline]
    #[must_use]
    pub fn participant(&self) -> &ParticipantId {
        self.page().participant()
    }

    /// Returns the underlying page handle.
    #[inline]
    #[must_use]
    pub fn page(&self) -> &WebRtcPage {
        self.orchestrator.page()
    }

    /// Returns the event registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<EventWaitRegistry> {
        &self.registry
    }

    fn config(&self) -> &HarnessConfig {
        self.orchestrator.config()
    }
}

// ============================================================================
// WebRtcTestPage - Events
// ============================================================================

impl WebRtcTestPage {
    /// Subscribes to `event` on the remote video element.
    pub fn subscribe_events(&self, event: &str) {
        self.subscribe_events_to_video_tag(REMOTE_VIDEO_TAG, event);
    }

    /// Subscribes to `event` on the local video element.
    pub fn subscribe_local_events(&self, event: &str) {
        self.subscribe_events_to_video_tag(LOCAL_VIDEO_TAG, event);
    }

    /// Subscribes to `event` on `video_tag` and starts its listener.
    ///
    /// Must be called within a tokio runtime.
    pub fn subscribe_events_to_video_tag(&self, video_tag: &str, event: &str) {
        info!(participant = %self.participant(), event, tag = video_tag, "Subscribing to media event");

        self.registry.subscribe(self.participant(), event);

        let listener = EventListener::spawn(
            self.page().clone(),
            Arc::clone(&self.registry),
            video_tag,
            event,
            self.config().timeout(),
        );

        let mut listeners = self.listeners.lock();
        listeners.retain(|l| !l.is_finished());
        listeners.push(listener);
    }

    /// Waits for a subscribed event for up to the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSubscription`](crate::Error::NoSubscription) if
    /// `event` was never subscribed or was already waited on.
    pub async fn wait_for_event(&self, event: &str) -> Result<bool> {
        self.registry
            .wait(self.participant(), event, self.config().timeout())
            .await
    }
}

// ============================================================================
// WebRtcTestPage - WebRTC Lifecycle
// ============================================================================

impl WebRtcTestPage {
    /// Negotiates with `endpoint` using default filters.
    ///
    /// # Errors
    ///
    /// See [`init_webrtc_with`](Self::init_webrtc_with).
    pub async fn init_webrtc(
        &self,
        endpoint: Arc<dyn Endpoint>,
        channel: WebRtcChannel,
        mode: WebRtcMode,
    ) -> Result<NegotiationReport> {
        let session = NegotiationSession::builder()
            .endpoint(endpoint)
            .channel(channel)
            .mode(mode)
            .build()?;

        self.init_webrtc_with(&session).await
    }

    /// Starts relaying endpoint candidates to the page, then negotiates
    /// `session`.
    ///
    /// After a successful negotiation the relay keeps running until
    /// [`stop_webrtc`](Self::stop_webrtc) or [`close`](Self::close). A failed
    /// negotiation stops it before the error is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`](crate::Error::Timeout) if the deadline passes
    /// - [`Error::Negotiation`](crate::Error::Negotiation) if a step fails
    pub async fn init_webrtc_with(&self, session: &NegotiationSession) -> Result<NegotiationReport> {
        self.stop_relay().await;

        let relay = EndpointCandidateRelay::start(Arc::clone(session.endpoint()), self.page().clone());
        *self.relay.lock() = Some(relay);

        let negotiated = self.orchestrator.negotiate(session).await;
        if negotiated.is_err() {
            self.stop_relay().await;
        }
        negotiated
    }

    /// Stops the page peer and tears down listeners, relay and
    /// subscriptions.
    ///
    /// Teardown happens even if the page directives fail.
    ///
    /// # Errors
    ///
    /// Returns the page error from `stop()` or the state reset.
    pub async fn stop_webrtc(&self) -> Result<()> {
        let stopped = self.page().stop().await;
        self.teardown().await;
        stopped
    }

    /// Tears down every background worker of this page.
    pub async fn close(self) {
        self.teardown().await;
        debug!(participant = %self.participant(), "Test page closed");
    }

    async fn teardown(&self) {
        let grace = self.config().worker_grace();

        let listeners = std::mem::take(&mut *self.listeners.lock());
        join_all(listeners.into_iter().map(|l| l.stop(grace))).await;

        self.stop_relay().await;
        self.registry.clear_participant(self.participant());
    }

    async fn stop_relay(&self) {
        let relay = self.relay.lock().take();
        if let Some(relay) = relay {
            let relayed = relay.stop(self.config().worker_grace()).await;
            debug!(participant = %self.participant(), relayed, "Endpoint candidate relay stopped");
        }
    }
}

// ============================================================================
// WebRtcTestPage - Playback & Console
// ============================================================================

impl WebRtcTestPage {
    /// Starts playback of `video_url`.
    pub async fn start(&self, video_url: &str) -> Result<()> {
        self.page().play(video_url).await
    }

    /// Stops playback.
    pub async fn stop_play(&self) -> Result<()> {
        self.page().terminate().await
    }

    /// Logs locally and to the page console.
    pub async fn console_log(&self, level: ConsoleLogLevel, message: &str) -> Result<()> {
        self.page().console_log(level, message).await
    }

    /// Reads the playback position in seconds.
    pub async fn current_time(&self) -> Result<f64> {
        self.page().current_time().await
    }

    /// Reads the page console text.
    pub async fn read_console(&self) -> Result<String> {
        self.page().read_console().await
    }

    /// Runs an arbitrary script in the page.
    pub async fn execute_script(&self, script: &str) -> Result<Value> {
        self.page().execute_script(script).await
    }
}

// ============================================================================
// Tests
// ============================================================================
