//! Typed directives for the WebRTC test page.
//!
//! [`WebRtcPage`] turns harness operations into the page's JavaScript API.
//! String arguments are always embedded as JSON string literals; the SDP
//! answer additionally travels base64-encoded.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::endpoint::IceCandidateEvent;
use crate::error::{Error, Result};
use crate::identifiers::ParticipantId;

use super::channel::{ConsoleLogLevel, IceServer, WebRtcChannel, WebRtcMode};
use super::executor::{CandidateSource, ScriptExecutor};

// ============================================================================
// Constants
// ============================================================================

/// Default interval between polls of a page value.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Reads the pending local offer.
pub(crate) const SDP_OFFER_SCRIPT: &str = "return sdpOffer;";

/// Reads the local candidates gathered so far.
pub(crate) const LOCAL_CANDIDATES_SCRIPT: &str = "return iceCandidates;";

/// Reads the last media event written by the page's `videoEvent` handler.
pub(crate) const STATUS_SCRIPT: &str = "return document.getElementById('status').value;";

/// Reads the playback position element.
const CURRENT_TIME_SCRIPT: &str = "return document.getElementById('currentTime').value;";

/// Reads the page's console element.
const CONSOLE_SCRIPT: &str = "return document.getElementById('console').textContent;";

/// Enables data channels on the next peer.
const DATA_CHANNEL_SCRIPT: &str = "useDataChannels();";

/// Tears down the page peer.
const STOP_SCRIPT: &str = "stop();";

/// Resets page-side test state after a stop.
const RESET_SCRIPT: &str = "var kurentoTest = new KurentoTest();";

/// Stops media playback.
const TERMINATE_SCRIPT: &str = "terminate();";

// ============================================================================
// WebRtcPage
// ============================================================================

/// Handle to one participant's signaling page.
///
/// Cheap to clone; clones share the underlying executor.
#[derive(Clone)]
pub struct WebRtcPage {
    executor: Arc<dyn ScriptExecutor>,
    participant: ParticipantId,
    poll_interval: Duration,
}

impl fmt::Debug for WebRtcPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRtcPage")
            .field("participant", &self.participant)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl WebRtcPage {
    /// Creates a page handle.
    #[must_use]
    pub fn new(executor: Arc<dyn ScriptExecutor>, participant: ParticipantId) -> Self {
        Self {
            executor,
            participant,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Sets the interval used when polling page values.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns the participant this page belongs to.
    #[inline]
    #[must_use]
    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    /// Returns the polling interval.
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

// ============================================================================
// WebRtcPage - Script Execution
// ============================================================================

impl WebRtcPage {
    /// Executes a script and returns its value.
    pub async fn execute_script(&self, script: &str) -> Result<Value> {
        trace!(participant = %self.participant, script, "Executing script");
        self.executor.execute_script(script).await
    }

    /// Polls `script` until it returns a non-null value.
    ///
    /// # Errors
    ///
    /// - [`Error::Cancelled`] if `cancel` fires first
    /// - any error from the executor
    pub async fn execute_script_and_wait(
        &self,
        script: &str,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        loop {
            let value = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                value = self.execute_script(script) => value?,
            };

            if !value.is_null() {
                return Ok(value);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}

// ============================================================================
// WebRtcPage - Negotiation Directives
// ============================================================================

impl WebRtcPage {
    /// Tags the page with the running test's name. Failures are only logged.
    pub async fn add_test_name(&self, test_name: &str) {
        let script = format!("addTestName({});", json_string(test_name));
        if let Err(e) = self.execute_script(&script).await {
            warn!(participant = %self.participant, error = %e, "addTestName failed");
        }
    }

    /// Appends a label to the page title. Failures are only logged.
    pub async fn append_to_title(&self, text: &str) {
        let script = format!("appendStringToTitle({});", json_string(text));
        if let Err(e) = self.execute_script(&script).await {
            warn!(participant = %self.participant, error = %e, "appendStringToTitle failed");
        }
    }

    /// Replaces the microphone with an audio file served at `url`.
    pub async fn set_custom_audio(&self, url: &str) -> Result<()> {
        debug!(participant = %self.participant, url, "Setting custom audio");
        self.execute_script(&format!("setCustomAudio({});", json_string(url)))
            .await
            .map(drop)
    }

    /// Enables data channels on the next peer.
    pub async fn use_data_channels(&self) -> Result<()> {
        self.execute_script(DATA_CHANNEL_SCRIPT).await.map(drop)
    }

    /// Passes STUN/TURN servers to the next peer.
    pub async fn set_ice_servers(&self, servers: &[IceServer]) -> Result<()> {
        let json = serde_json::to_string(servers)?;
        self.execute_script(&format!("setIceServers({json});"))
            .await
            .map(drop)
    }

    /// Issues the media-constraint directive for `channel`, if any.
    pub async fn apply_channel(&self, channel: WebRtcChannel) -> Result<()> {
        match channel.js_function() {
            Some(script) => self.execute_script(script).await.map(drop),
            None => Ok(()),
        }
    }

    /// Creates the page peer in `mode`, which starts offer generation.
    pub async fn start_mode(&self, mode: WebRtcMode) -> Result<()> {
        self.execute_script(mode.js_function()).await.map(drop)
    }

    /// Waits until the page has produced its SDP offer.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if `sdpOffer` is not a string
    /// - [`Error::Cancelled`] if `cancel` fires first
    pub async fn wait_for_sdp_offer(&self, cancel: &CancellationToken) -> Result<String> {
        let value = self
            .execute_script_and_wait(SDP_OFFER_SCRIPT, cancel)
            .await?;

        match value {
            Value::String(offer) => Ok(offer),
            other => Err(Error::protocol(format!(
                "sdpOffer is not a string: {other}"
            ))),
        }
    }

    /// Hands the endpoint's SDP answer to the page, base64-encoded.
    pub async fn process_sdp_answer(&self, sdp_answer: &str) -> Result<()> {
        let encoded = Base64Standard.encode(sdp_answer.as_bytes());
        self.execute_script(&format!("processSdpAnswer('{encoded}');"))
            .await
            .map(drop)
    }

    /// Adds an endpoint-gathered candidate to the page peer.
    pub async fn add_ice_candidate(&self, event: &IceCandidateEvent) -> Result<()> {
        let json = serde_json::to_string(event)?;
        self.execute_script(&format!("addIceCandidate({});", json_string(&json)))
            .await
            .map(drop)
    }

    /// Tears down the page peer and resets page-side test state.
    pub async fn stop(&self) -> Result<()> {
        self.execute_script(STOP_SCRIPT).await?;
        self.execute_script(RESET_SCRIPT).await.map(drop)
    }
}

// ============================================================================
// WebRtcPage - Events & Playback
// ============================================================================

impl WebRtcPage {
    /// Registers the page's `videoEvent` handler for `event` on a video tag.
    pub async fn add_video_event_listener(&self, video_tag: &str, event: &str) -> Result<()> {
        let script = format!(
            "{video_tag}.addEventListener({}, videoEvent, false);",
            json_string(event)
        );
        self.execute_script(&script).await.map(drop)
    }

    /// Reads the `status` element holding the last media event.
    pub async fn read_status(&self) -> Result<Option<String>> {
        let value = self.execute_script(STATUS_SCRIPT).await?;
        Ok(value.as_str().map(str::to_string))
    }

    /// Logs to the harness and to the page console.
    pub async fn console_log(&self, level: ConsoleLogLevel, message: &str) -> Result<()> {
        info!(participant = %self.participant, "{message}");
        let script = format!("console.{}({});", level.as_str(), json_string(message));
        self.execute_script(&script).await.map(drop)
    }

    /// Starts playback of `video_url` in the page.
    pub async fn play(&self, video_url: &str) -> Result<()> {
        self.execute_script(&format!("play({}, false);", json_string(video_url)))
            .await
            .map(drop)
    }

    /// Stops playback.
    pub async fn terminate(&self) -> Result<()> {
        self.execute_script(TERMINATE_SCRIPT).await.map(drop)
    }

    /// Reads the playback position in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the element does not hold a number.
    pub async fn current_time(&self) -> Result<f64> {
        let value = self.execute_script(CURRENT_TIME_SCRIPT).await?;

        let current = match &value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };

        current.ok_or_else(|| Error::protocol(format!("currentTime is not a number: {value}")))
    }

    /// Reads the text of the page's console element.
    pub async fn read_console(&self) -> Result<String> {
        let value = self.execute_script(CONSOLE_SCRIPT).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}

// ============================================================================
// CandidateSource
// ============================================================================

#[async_trait]
impl CandidateSource for WebRtcPage {
    /// Accepts an array of candidate strings or of objects with a
    /// `candidate` field. `null` means nothing gathered yet.
    async fn read_all(&self) -> Result<Vec<String>> {
        let value = self.execute_script(LOCAL_CANDIDATES_SCRIPT).await?;

        let entries = match value {
            Value::Null => return Ok(Vec::new()),
            Value::Array(entries) => entries,
            other => {
                return Err(Error::protocol(format!(
                    "iceCandidates is not an array: {other}"
                )));
            }
        };

        entries
            .into_iter()
            .map(|entry| match entry {
                Value::String(raw) => Ok(raw),
                Value::Object(ref fields) => fields
                    .get("candidate")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| Error::protocol(format!("candidate entry without text: {entry}"))),
                other => Err(Error::protocol(format!("unexpected candidate entry: {other}"))),
            })
            .collect()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Escapes a string for safe use as a JavaScript literal.
pub(crate) fn json_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

// ============================================================================
// Tests
// ============================================================================
