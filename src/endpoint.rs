//! Media endpoint interface.
//!
//! The endpoint is an external collaborator. The harness only needs it to
//! answer offers, gather candidates, accept filtered page candidates, and
//! report the candidates it gathers itself.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// Candidate gathered by the endpoint, in browser `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidateEvent {
    /// Candidate attribute line.
    pub candidate: String,
    /// Media stream identification tag.
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    /// Index of the m-line the candidate belongs to.
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_m_line_index: Option<u32>,
}

/// Callback invoked for each endpoint-gathered candidate.
pub type IceCandidateHandler = Box<dyn Fn(IceCandidateEvent) + Send + Sync>;

// ============================================================================
// CandidateSink
// ============================================================================

/// Receives filtered and rewritten page candidates.
///
/// Candidates may arrive before, during and after answer submission and
/// must be consumed in delivery order.
#[async_trait]
pub trait CandidateSink: Send + Sync {
    /// Adds one remote candidate.
    ///
    /// # Errors
    ///
    /// Failures are logged by the caller and never abort a session.
    async fn add_candidate(&self, candidate: Candidate) -> Result<()>;
}

// ============================================================================
// Endpoint
// ============================================================================

/// WebRTC media endpoint under test.
#[async_trait]
pub trait Endpoint: CandidateSink {
    /// Processes an SDP offer and returns the SDP answer.
    async fn process_offer(&self, sdp_offer: &str) -> Result<String>;

    /// Starts ICE candidate gathering on the endpoint.
    async fn gather_candidates(&self) -> Result<()>;

    /// Installs the listener for endpoint-gathered candidates.
    ///
    /// Replaces any previous handler.
    fn set_ice_candidate_handler(&self, _handler: IceCandidateHandler) {}

    /// Removes the endpoint candidate listener.
    fn clear_ice_candidate_handler(&self) {}
}

// ============================================================================
// Tests
// ============================================================================
