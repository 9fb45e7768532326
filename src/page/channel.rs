//! Channel and mode vocabulary for the test page.
//!
//! Each variant maps to the page-side directive that configures it.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// WebRtcChannel
// ============================================================================

/// Media carried by the peer connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebRtcChannel {
    /// Audio track only.
    AudioOnly,
    /// Video track only.
    VideoOnly,
    /// Audio and video tracks.
    #[default]
    AudioAndVideo,
}

impl WebRtcChannel {
    /// Returns the media-constraint directive, if the channel needs one.
    #[must_use]
    pub const fn js_function(self) -> Option<&'static str> {
        match self {
            Self::AudioOnly => Some("setAudioUserMediaConstraints();"),
            Self::VideoOnly => Some("setVideoUserMediaConstraints();"),
            Self::AudioAndVideo => None,
        }
    }
}

impl fmt::Display for WebRtcChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AudioOnly => f.write_str("(audio-only)"),
            Self::VideoOnly => f.write_str("(video-only)"),
            Self::AudioAndVideo => f.write_str("(audio & video)"),
        }
    }
}

// ============================================================================
// WebRtcMode
// ============================================================================

/// Direction of the media flow from the page's point of view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WebRtcMode {
    /// Page sends media.
    SendOnly,
    /// Page receives media.
    #[serde(rename = "RCV_ONLY")]
    RecvOnly,
    /// Page sends and receives.
    #[default]
    #[serde(rename = "SEND_RCV")]
    SendRecv,
}

impl WebRtcMode {
    /// Returns the directive that creates the peer and its offer.
    #[must_use]
    pub const fn js_function(self) -> &'static str {
        match self {
            Self::SendOnly => "startSendOnly();",
            Self::RecvOnly => "startRecvOnly();",
            Self::SendRecv => "startSendRecv();",
        }
    }
}

impl fmt::Display for WebRtcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendOnly => f.write_str("Send only"),
            Self::RecvOnly => f.write_str("Receive only"),
            Self::SendRecv => f.write_str("Send & receive"),
        }
    }
}

// ============================================================================
// ConsoleLogLevel
// ============================================================================

/// Browser console method used for page-side log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleLogLevel {
    /// `console.info`.
    Info,
    /// `console.warn`.
    Warn,
    /// `console.error`.
    Error,
    /// `console.debug`.
    Debug,
}

impl ConsoleLogLevel {
    /// Returns the console method name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Debug => "debug",
        }
    }
}

// ============================================================================
// IceServer
// ============================================================================

/// STUN/TURN server handed to the page's peer connection.
///
/// Serialized in the browser `RTCIceServer` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
    /// Server URLs (`stun:` / `turn:`).
    pub urls: Vec<String>,
    /// TURN username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// TURN credential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    /// Creates a STUN server entry.
    #[must_use]
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }

    /// Creates a TURN server entry with credentials.
    #[must_use]
    pub fn turn(
        url: impl Into<String>,
        username: impl Into<String>,
        credential: impl Into<String>,
    ) -> Self {
        Self {
            urls: vec![url.into()],
            username: Some(username.into()),
            credential: Some(credential.into()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_functions() {
        assert_eq!(
            WebRtcChannel::AudioOnly.js_function(),
            Some("setAudioUserMediaConstraints();")
        );
        assert_eq!(WebRtcChannel::AudioAndVideo.js_function(), None);
        assert_eq!(
            WebRtcChannel::VideoOnly.js_function(),
            Some("setVideoUserMediaConstraints();")
        );
    }

    #[test]
    fn test_mode_functions() {
        assert_eq!(WebRtcMode::SendOnly.js_function(), "startSendOnly();");
        assert_eq!(WebRtcMode::RecvOnly.js_function(), "startRecvOnly();");
        assert_eq!(WebRtcMode::SendRecv.js_function(), "startSendRecv();");
    }

    #[test]
    fn test_mode_serde_names() {
        let json = serde_json::to_string(&WebRtcMode::RecvOnly).unwrap();
        assert_eq!(json, "\"RCV_ONLY\"");
        let mode: WebRtcMode = serde_json::from_str("\"SEND_RCV\"").unwrap();
        assert_eq!(mode, WebRtcMode::SendRecv);
    }

    #[test]
    fn test_ice_server_shape() {
        let stun = serde_json::to_value(IceServer::stun("stun:stun.example.org:3478")).unwrap();
        assert_eq!(stun, serde_json::json!({ "urls": ["stun:stun.example.org:3478"] }));

        let turn = serde_json::to_value(IceServer::turn("turn:t.example.org", "u", "p")).unwrap();
        assert_eq!(turn["username"], "u");
        assert_eq!(turn["credential"], "p");
    }
}
