//! Per-negotiation parameters.
//!
//! # Example
//!
//! ```ignore
//! use webrtc_harness::{NegotiationSession, WebRtcChannel, WebRtcMode};
//!
//! let session = NegotiationSession::builder()
//!     .endpoint(endpoint)
//!     .channel(WebRtcChannel::AudioOnly)
//!     .mode(WebRtcMode::SendRecv)
//!     .build()?;
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::candidate::{AddressFamilyFilter, CandidateFilter, CandidateTypeFilter};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::page::{IceServer, WebRtcChannel, WebRtcMode};

// ============================================================================
// NegotiationSession
// ============================================================================

/// One offer/answer exchange between a page and an endpoint.
///
/// Unset options fall back to the orchestrator's
/// [`HarnessConfig`](crate::HarnessConfig).
#[derive(Clone)]
pub struct NegotiationSession {
    id: SessionId,
    endpoint: Arc<dyn Endpoint>,
    channel: WebRtcChannel,
    mode: WebRtcMode,
    filter: CandidateFilter,
    use_data_channel: bool,
    test_name: Option<String>,
    custom_audio: Option<String>,
    ice_servers: Vec<IceServer>,
    timeout: Option<Duration>,
}

impl fmt::Debug for NegotiationSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationSession")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("mode", &self.mode)
            .field("filter", &self.filter)
            .field("use_data_channel", &self.use_data_channel)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl NegotiationSession {
    /// Creates a session builder.
    #[inline]
    #[must_use]
    pub fn builder() -> NegotiationSessionBuilder {
        NegotiationSessionBuilder::new()
    }

    /// Returns the session identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the endpoint under test.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Arc<dyn Endpoint> {
        &self.endpoint
    }

    /// Returns the media channel.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> WebRtcChannel {
        self.channel
    }

    /// Returns the direction mode.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> WebRtcMode {
        self.mode
    }

    /// Returns the candidate filter pair.
    #[inline]
    #[must_use]
    pub fn filter(&self) -> CandidateFilter {
        self.filter
    }

    /// Returns `true` if data channels are requested.
    #[inline]
    #[must_use]
    pub fn use_data_channel(&self) -> bool {
        self.use_data_channel
    }

    /// Returns the test name to tag the page with.
    #[inline]
    #[must_use]
    pub fn test_name(&self) -> Option<&str> {
        self.test_name.as_deref()
    }

    /// Returns the session-level custom audio override.
    #[inline]
    #[must_use]
    pub fn custom_audio(&self) -> Option<&str> {
        self.custom_audio.as_deref()
    }

    /// Returns the session-level ICE servers.
    #[inline]
    #[must_use]
    pub fn ice_servers(&self) -> &[IceServer] {
        &self.ice_servers
    }

    /// Returns the session-level timeout override.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

// ============================================================================
// NegotiationSessionBuilder
// ============================================================================

/// Builder for [`NegotiationSession`].
#[derive(Default)]
pub struct NegotiationSessionBuilder {
    endpoint: Option<Arc<dyn Endpoint>>,
    channel: WebRtcChannel,
    mode: WebRtcMode,
    filter: CandidateFilter,
    use_data_channel: bool,
    test_name: Option<String>,
    custom_audio: Option<String>,
    ice_servers: Vec<IceServer>,
    timeout: Option<Duration>,
}

impl NegotiationSessionBuilder {
    /// Creates a builder with default channel, mode and filters.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint under test. Required.
    #[inline]
    #[must_use]
    pub fn endpoint(mut self, endpoint: Arc<dyn Endpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Sets the media channel.
    #[inline]
    #[must_use]
    pub fn channel(mut self, channel: WebRtcChannel) -> Self {
        self.channel = channel;
        self
    }

    /// Sets the direction mode.
    #[inline]
    #[must_use]
    pub fn mode(mut self, mode: WebRtcMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the address family filter.
    #[inline]
    #[must_use]
    pub fn family_filter(mut self, family: AddressFamilyFilter) -> Self {
        self.filter.family = family;
        self
    }

    /// Sets the candidate type filter.
    #[inline]
    #[must_use]
    pub fn type_filter(mut self, typ: CandidateTypeFilter) -> Self {
        self.filter.typ = typ;
        self
    }

    /// Enables data channels on the page peer.
    #[inline]
    #[must_use]
    pub fn data_channel(mut self, enabled: bool) -> Self {
        self.use_data_channel = enabled;
        self
    }

    /// Sets the test name shown in the page.
    #[inline]
    #[must_use]
    pub fn test_name(mut self, name: impl Into<String>) -> Self {
        self.test_name = Some(name.into());
        self
    }

    /// Overrides the configured custom audio URL.
    #[inline]
    #[must_use]
    pub fn custom_audio(mut self, url: impl Into<String>) -> Self {
        self.custom_audio = Some(url.into());
        self
    }

    /// Adds an ICE server for this session.
    #[inline]
    #[must_use]
    pub fn ice_server(mut self, server: IceServer) -> Self {
        self.ice_servers.push(server);
        self
    }

    /// Overrides the configured negotiation timeout.
    #[inline]
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the session with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no endpoint is set
    /// - [`Error::Config`] if the timeout is zero
    /// - [`Error::Config`] if the custom audio URL is blank
    pub fn build(self) -> Result<NegotiationSession> {
        let endpoint = self.endpoint.ok_or_else(|| {
            Error::config(
                "Endpoint is required. Use .endpoint() to set it.\n\
                 Example: NegotiationSession::builder().endpoint(endpoint)",
            )
        })?;

        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config("Session timeout must be greater than zero"));
        }

        if self
            .custom_audio
            .as_deref()
            .is_some_and(|url| url.trim().is_empty())
        {
            return Err(Error::config("Custom audio URL must not be blank"));
        }

        Ok(NegotiationSession {
            id: SessionId::generate(),
            endpoint,
            channel: self.channel,
            mode: self.mode,
            filter: self.filter,
            use_data_channel: self.use_data_channel,
            test_name: self.test_name,
            custom_audio: self.custom_audio,
            ice_servers: self.ice_servers,
            timeout: self.timeout,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
