//! WebRTC Harness - SDP negotiation and ICE candidate filtering for
//! endpoint interoperability tests.
//!
//! This library drives a browser-hosted WebRTC test page against a media
//! endpoint: it exchanges the SDP offer and answer, forwards filtered ICE
//! candidates in both directions, and lets tests wait for media events.
//!
//! # Architecture
//!
//! The harness sits between two collaborators it does not own:
//!
//! - **Page (browser)**: Reached only through [`ScriptExecutor`], which runs
//!   a script and optionally returns a JSON value
//! - **Endpoint (media server)**: Implements [`Endpoint`], answering offers
//!   and accepting remote candidates
//!
//! Key design principles:
//!
//! - Every background activity is a tokio task with a cancellation token
//! - Negotiation runs under one deadline; no worker outlives the call
//! - Candidate classification failures are local and never abort a session
//! - No global state: each page owns its pump, relay and listeners
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use webrtc_harness::{HarnessConfig, Result, WebRtcChannel, WebRtcMode, WebRtcTestPage};
//!
//! async fn loopback(executor: Arc<dyn webrtc_harness::ScriptExecutor>,
//!                   endpoint: Arc<dyn webrtc_harness::Endpoint>) -> Result<()> {
//!     let page = WebRtcTestPage::new(executor, "browser0".into(), HarnessConfig::new())?;
//!
//!     page.subscribe_events("playing");
//!     page.init_webrtc(endpoint, WebRtcChannel::AudioAndVideo, WebRtcMode::SendRecv).await?;
//!     assert!(page.wait_for_event("playing").await?);
//!
//!     page.stop_webrtc().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`candidate`] | Candidate classification, filtering and masking |
//! | [`config`] | [`HarnessConfig`] timing and page defaults |
//! | [`endpoint`] | [`Endpoint`] and [`CandidateSink`] seams |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`events`] | Media event subscriptions |
//! | [`identifiers`] | Participant and session ids |
//! | [`negotiation`] | Offer/answer orchestration and candidate pump |
//! | [`page`] | Test page script directives |
//! | [`test_page`] | [`WebRtcTestPage`] facade |

// ============================================================================
// Modules
// ============================================================================

/// ICE candidate classification and rewriting.
///
/// - [`classify`] parses a candidate line
/// - [`decide`] applies family and type filters
pub mod candidate;

/// Harness configuration.
pub mod config;

/// Media endpoint interface.
pub mod endpoint;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Media event subscriptions and listeners.
pub mod events;

/// Type-safe identifiers.
pub mod identifiers;

/// Offer/answer negotiation.
///
/// Use [`NegotiationOrchestrator::negotiate`] with a
/// [`NegotiationSession`].
pub mod negotiation;

/// Signaling page access.
pub mod page;

/// High-level test page handle.
pub mod test_page;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Candidate types
pub use candidate::{
    AddressFamily, AddressFamilyFilter, Candidate, CandidateFilter, CandidateType,
    CandidateTypeFilter, Decision, classify, decide,
};

// Configuration
pub use config::HarnessConfig;

// Endpoint types
pub use endpoint::{CandidateSink, Endpoint, IceCandidateEvent, IceCandidateHandler};

// Error types
pub use error::{Error, Result};

// Event types
pub use events::{EventListener, EventWaitRegistry};

// Identifier types
pub use identifiers::{ParticipantId, SessionId};

// Negotiation types
pub use negotiation::{
    CandidatePump, EndpointCandidateRelay, NegotiationOrchestrator, NegotiationReport,
    NegotiationSession, NegotiationSessionBuilder, PumpHandle, PumpStats,
};

// Page types
pub use page::{
    CandidateSource, ConsoleLogLevel, IceServer, ScriptExecutor, WebRtcChannel, WebRtcMode,
    WebRtcPage,
};

// Facade
pub use test_page::WebRtcTestPage;
