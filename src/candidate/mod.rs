//! ICE candidate classification and rewriting.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `classifier` | Candidate line parsing into [`Candidate`] |
//! | `rewriter` | Family filtering and address masking |
//!
//! # Example
//!
//! ```ignore
//! let candidate = classify("candidate:1 1 UDP 2122260223 10.0.0.5 54321 typ host")?;
//!
//! match decide(&candidate, AddressFamilyFilter::Ipv4, CandidateTypeFilter::Relay) {
//!     Decision::Keep(c) => assert_eq!(c.internal_address(), Some("10.0.0.254")),
//!     Decision::Drop => unreachable!(),
//! }
//! ```

// ============================================================================
// Submodules
// ============================================================================

mod classifier;
mod rewriter;

// ============================================================================
// Re-exports
// ============================================================================

pub use classifier::{AddressFamily, Candidate, CandidateType, classify};
pub use rewriter::{
    AddressFamilyFilter, CandidateFilter, CandidateTypeFilter, Decision, IPV4_SENTINEL,
    IPV6_SENTINEL, decide, mask_address,
};
