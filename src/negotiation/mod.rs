//! Offer/answer negotiation and candidate forwarding.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `orchestrator` | [`NegotiationOrchestrator`] and its exchange worker |
//! | `session` | [`NegotiationSession`] parameters and builder |
//! | `pump` | [`CandidatePump`] page → endpoint forwarding |
//! | `relay` | [`EndpointCandidateRelay`] endpoint → page forwarding |
//! | `task` | Cancellable worker with staged shutdown |

// ============================================================================
// Submodules
// ============================================================================

mod orchestrator;
mod pump;
mod relay;
mod session;
pub(crate) mod task;

// ============================================================================
// Re-exports
// ============================================================================

pub use orchestrator::{NegotiationOrchestrator, NegotiationReport};
pub use pump::{CandidatePump, DEFAULT_CANDIDATE_POLL, PumpHandle, PumpStats};
pub use relay::EndpointCandidateRelay;
pub use session::{NegotiationSession, NegotiationSessionBuilder};
