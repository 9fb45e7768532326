//! Harness configuration.
//!
//! Timing knobs and page defaults shared by every session a harness runs.
//!
//! # Example
//!
//! ```ignore
//! use webrtc_harness::HarnessConfig;
//!
//! let config = HarnessConfig::new()
//!     .with_timeout_secs(20)
//!     .with_custom_audio("http://files/fiware.wav");
//! config.validate()?;
//! ```
//!
//! # Sources
//!
//! | Source | Method |
//! |--------|--------|
//! | Code | [`HarnessConfig::new`] + `with_*` |
//! | JSON | [`HarnessConfig::from_json_str`] |
//! | Environment | [`HarnessConfig::from_env`] |

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::page::IceServer;

// ============================================================================
// Constants
// ============================================================================

/// Default negotiation and event wait timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default interval between candidate pump polls.
pub const DEFAULT_CANDIDATE_POLL_MS: u64 = 300;

/// Default interval between page value polls.
pub const DEFAULT_SCRIPT_POLL_MS: u64 = 100;

/// Default bounded join before a worker is aborted.
pub const DEFAULT_WORKER_GRACE_MS: u64 = 500;

/// Environment variable names read by [`HarnessConfig::from_env`].
pub mod env_vars {
    /// Timeout in seconds.
    pub const TIMEOUT_SECS: &str = "HARNESS_TIMEOUT_SECS";
    /// Candidate poll interval in milliseconds.
    pub const CANDIDATE_POLL_MS: &str = "HARNESS_CANDIDATE_POLL_MS";
    /// Page poll interval in milliseconds.
    pub const SCRIPT_POLL_MS: &str = "HARNESS_SCRIPT_POLL_MS";
    /// Worker join grace in milliseconds.
    pub const WORKER_GRACE_MS: &str = "HARNESS_WORKER_GRACE_MS";
    /// Custom audio URL.
    pub const CUSTOM_AUDIO: &str = "HARNESS_CUSTOM_AUDIO";
}

// ============================================================================
// HarnessConfig
// ============================================================================

/// Harness-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HarnessConfig {
    /// Negotiation deadline and event wait timeout, in seconds.
    pub timeout_secs: u64,

    /// Candidate pump poll interval, in milliseconds.
    pub candidate_poll_ms: u64,

    /// Offer and status poll interval, in milliseconds.
    pub script_poll_ms: u64,

    /// Bounded join before a worker is aborted, in milliseconds.
    pub worker_grace_ms: u64,

    /// Audio file the page plays instead of the microphone.
    pub custom_audio: Option<String>,

    /// STUN/TURN servers passed to the page.
    pub ice_servers: Vec<IceServer>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl HarnessConfig {
    /// Creates a configuration with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            candidate_poll_ms: DEFAULT_CANDIDATE_POLL_MS,
            script_poll_ms: DEFAULT_SCRIPT_POLL_MS,
            worker_grace_ms: DEFAULT_WORKER_GRACE_MS,
            custom_audio: None,
            ice_servers: Vec::new(),
        }
    }

    /// Parses a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] on malformed JSON
    /// - [`Error::Config`] if the result fails validation
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Builds a configuration from `HARNESS_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but unparsable, or the
    /// result fails validation.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new();

        if let Some(v) = env_parse(env_vars::TIMEOUT_SECS)? {
            config.timeout_secs = v;
        }
        if let Some(v) = env_parse(env_vars::CANDIDATE_POLL_MS)? {
            config.candidate_poll_ms = v;
        }
        if let Some(v) = env_parse(env_vars::SCRIPT_POLL_MS)? {
            config.script_poll_ms = v;
        }
        if let Some(v) = env_parse(env_vars::WORKER_GRACE_MS)? {
            config.worker_grace_ms = v;
        }
        if let Ok(audio) = env::var(env_vars::CUSTOM_AUDIO)
            && !audio.is_empty()
        {
            config.custom_audio = Some(audio);
        }

        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl HarnessConfig {
    /// Sets the timeout in seconds.
    #[inline]
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the candidate poll interval in milliseconds.
    #[inline]
    #[must_use]
    pub fn with_candidate_poll_ms(mut self, ms: u64) -> Self {
        self.candidate_poll_ms = ms;
        self
    }

    /// Sets the page poll interval in milliseconds.
    #[inline]
    #[must_use]
    pub fn with_script_poll_ms(mut self, ms: u64) -> Self {
        self.script_poll_ms = ms;
        self
    }

    /// Sets the worker join grace in milliseconds.
    #[inline]
    #[must_use]
    pub fn with_worker_grace_ms(mut self, ms: u64) -> Self {
        self.worker_grace_ms = ms;
        self
    }

    /// Sets the custom audio URL.
    #[inline]
    #[must_use]
    pub fn with_custom_audio(mut self, url: impl Into<String>) -> Self {
        self.custom_audio = Some(url.into());
        self
    }

    /// Adds an ICE server.
    #[inline]
    #[must_use]
    pub fn with_ice_server(mut self, server: IceServer) -> Self {
        self.ice_servers.push(server);
        self
    }
}

// ============================================================================
// Accessors & Validation
// ============================================================================

impl HarnessConfig {
    /// Returns the timeout.
    #[inline]
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the candidate poll interval.
    #[inline]
    #[must_use]
    pub const fn candidate_poll_interval(&self) -> Duration {
        Duration::from_millis(self.candidate_poll_ms)
    }

    /// Returns the page poll interval.
    #[inline]
    #[must_use]
    pub const fn script_poll_interval(&self) -> Duration {
        Duration::from_millis(self.script_poll_ms)
    }

    /// Returns the worker join grace.
    #[inline]
    #[must_use]
    pub const fn worker_grace(&self) -> Duration {
        Duration::from_millis(self.worker_grace_ms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the timeout or any interval is zero, or an
    /// ICE server has no URL.
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(Error::config("timeoutSecs must be greater than zero"));
        }
        if self.candidate_poll_ms == 0 || self.script_poll_ms == 0 {
            return Err(Error::config("Poll intervals must be greater than zero"));
        }
        if self.worker_grace_ms == 0 {
            return Err(Error::config("workerGraceMs must be greater than zero"));
        }
        if self.ice_servers.iter().any(|s| s.urls.is_empty()) {
            return Err(Error::config("ICE server entries need at least one URL"));
        }
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("{name} has invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================
