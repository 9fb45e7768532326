//! Script execution seam.
//!
//! Everything the harness does to the browser page goes through one call:
//! run a script, optionally read back its return value. How the script
//! reaches the browser (WebDriver, extension socket, CDP) is up to the
//! implementor.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// ScriptExecutor
// ============================================================================

/// Executes JavaScript in the signaling page.
///
/// The script uses `return` to produce a value; scripts without one yield
/// [`Value::Null`].
///
/// # Errors
///
/// Implementors return [`Error::Transport`](crate::Error::Transport) for a
/// failed call and [`Error::PageClosed`](crate::Error::PageClosed) once the
/// page can no longer be reached.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Runs `script` in the page context.
    async fn execute_script(&self, script: &str) -> Result<Value>;
}

// ============================================================================
// CandidateSource
// ============================================================================

/// Exposes local candidates gathered by the page.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Returns every raw candidate accumulated so far, oldest first.
    ///
    /// The list is append-only from the reader's point of view.
    async fn read_all(&self) -> Result<Vec<String>>;
}
