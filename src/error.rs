//! Error types for the negotiation harness.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use webrtc_harness::{Error, Result};
//!
//! async fn example(orchestrator: &NegotiationOrchestrator, session: &NegotiationSession) -> Result<()> {
//!     match orchestrator.negotiate(session).await {
//!         Ok(report) => println!("negotiated in {:?}", report.elapsed),
//!         Err(e) if e.is_timeout() => println!("negotiation did not converge"),
//!         Err(e) => return Err(e),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Candidate | [`Error::Parse`] |
//! | Transport | [`Error::Transport`], [`Error::PageClosed`], [`Error::Protocol`] |
//! | Negotiation | [`Error::Timeout`], [`Error::Negotiation`], [`Error::Cancelled`] |
//! | Events | [`Error::NoSubscription`] |
//! | External | [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::ParticipantId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when harness or session configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Candidate Errors
    // ========================================================================
    /// Malformed ICE candidate line.
    ///
    /// Always recovered locally: the candidate is dropped and logged.
    #[error("Malformed candidate ({reason}): {line}")]
    Parse {
        /// What was wrong with the line.
        reason: String,
        /// The offending candidate line.
        line: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// A page, source or sink call failed.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failed call.
        message: String,
    },

    /// The signaling page is permanently unreachable.
    #[error("Page closed")]
    PageClosed,

    /// Unexpected or unusable value returned by a collaborator.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Negotiation Errors
    // ========================================================================
    /// Operation timeout.
    ///
    /// Returned when the session deadline expires before negotiation completes.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Offer/answer exchange failed.
    ///
    /// Carries the underlying cause (page scripting failure, endpoint rejection,
    /// unusable answer).
    #[error("Negotiation failed: {message}")]
    Negotiation {
        /// Step that failed.
        message: String,
        /// Underlying cause.
        #[source]
        cause: Box<Error>,
    },

    /// Worker observed cancellation before finishing.
    #[error("Operation cancelled")]
    Cancelled,

    // ========================================================================
    // Event Errors
    // ========================================================================
    /// Wait requested for an event that has no active subscription.
    #[error("No subscription for event '{event}' of participant {participant}")]
    NoSubscription {
        /// Participant the wait was issued for.
        participant: ParticipantId,
        /// Event name.
        event: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a candidate parse error.
    #[inline]
    pub fn parse(reason: impl Into<String>, line: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
            line: line.into(),
        }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a negotiation error wrapping its cause.
    #[inline]
    pub fn negotiation(message: impl Into<String>, cause: Error) -> Self {
        Self::Negotiation {
            message: message.into(),
            cause: Box::new(cause),
        }
    }

    /// Creates a no-subscription error.
    #[inline]
    pub fn no_subscription(participant: ParticipantId, event: impl Into<String>) -> Self {
        Self::NoSubscription {
            participant,
            event: event.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a transport-level error.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::PageClosed | Self::Protocol { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Transport { .. } | Self::Parse { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
