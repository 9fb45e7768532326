//! Signaling page access.
//!
//! The page is reached only through [`ScriptExecutor`]; [`WebRtcPage`]
//! layers the page's JavaScript API on top of it.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `executor` | [`ScriptExecutor`] and [`CandidateSource`] seams |
//! | `core` | [`WebRtcPage`] directives |
//! | `channel` | Channel, mode, console level and ICE server types |

// ============================================================================
// Submodules
// ============================================================================

mod channel;
mod core;
mod executor;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{ConsoleLogLevel, IceServer, WebRtcChannel, WebRtcMode};
pub use self::core::WebRtcPage;
pub use executor::{CandidateSource, ScriptExecutor};

#[cfg(test)]
pub(crate) use self::core::{LOCAL_CANDIDATES_SCRIPT, SDP_OFFER_SCRIPT, STATUS_SCRIPT};
