//! Media event subscriptions.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `registry` | [`EventWaitRegistry`] one-shot rendezvous |
//! | `listener` | [`EventListener`] page status watchers |

// ============================================================================
// Submodules
// ============================================================================

mod listener;
mod registry;

// ============================================================================
// Re-exports
// ============================================================================

pub use listener::EventListener;
pub use registry::EventWaitRegistry;
