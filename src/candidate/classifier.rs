//! Candidate line classification.
//!
//! Parses a single `candidate:` attribute line as emitted by the test page
//! into a structured [`Candidate`]. This is deliberately not a full SDP
//! grammar: only the fields the harness needs are extracted.
//!
//! # Field Layout
//!
//! ```text
//! candidate:<foundation> <component> <transport> <priority> <address> <port> typ <type> [raddr <address> rport <port>]
//!     1          2           3           4           5        6      7    8        9       10
//! ```
//!
//! - HOST: internal address is field 5.
//! - SRFLX / RELAY: public address is field 5, internal (base) address is field 10.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Label that precedes the foundation field.
const CANDIDATE_LABEL: &str = "candidate:";

/// Token that precedes the candidate type.
const TYPE_MARKER: &str = "typ";

/// Zero-based index of the 5th whitespace-separated field.
const PRIMARY_ADDRESS_FIELD: usize = 4;

/// Zero-based index of the 10th whitespace-separated field.
const RELATED_ADDRESS_FIELD: usize = 9;

// ============================================================================
// CandidateType
// ============================================================================

/// ICE candidate type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateType {
    /// Locally bound address.
    Host,
    /// Server-reflexive (NAT-translated public) address.
    Srflx,
    /// Address relayed through a TURN server.
    Relay,
}

impl CandidateType {
    /// Returns the wire token for this type.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Srflx => "srflx",
            Self::Relay => "relay",
        }
    }
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CandidateType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "host" => Ok(Self::Host),
            "srflx" => Ok(Self::Srflx),
            "relay" => Ok(Self::Relay),
            other => Err(Error::parse(format!("unknown candidate type '{other}'"), s)),
        }
    }
}

// ============================================================================
// AddressFamily
// ============================================================================

/// Address family of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamily {
    /// IPv4.
    Ipv4,
    /// IPv6.
    Ipv6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => f.write_str("ipv4"),
            Self::Ipv6 => f.write_str("ipv6"),
        }
    }
}

// ============================================================================
// Candidate
// ============================================================================

/// A classified ICE candidate.
///
/// Immutable once built. Rewriting produces a new value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    raw: String,
    typ: CandidateType,
    family: AddressFamily,
    internal_address: Option<String>,
    public_address: Option<String>,
}

impl Candidate {
    pub(super) fn from_parts(
        raw: String,
        typ: CandidateType,
        family: AddressFamily,
        internal_address: Option<String>,
        public_address: Option<String>,
    ) -> Self {
        Self {
            raw,
            typ,
            family,
            internal_address,
            public_address,
        }
    }

    /// Returns the raw candidate line.
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns the candidate type.
    #[inline]
    #[must_use]
    pub fn typ(&self) -> CandidateType {
        self.typ
    }

    /// Returns the address family.
    #[inline]
    #[must_use]
    pub fn family(&self) -> AddressFamily {
        self.family
    }

    /// Returns the internal (host or base) address.
    #[inline]
    #[must_use]
    pub fn internal_address(&self) -> Option<&str> {
        self.internal_address.as_deref()
    }

    /// Returns the public address (SRFLX / RELAY only).
    #[inline]
    #[must_use]
    pub fn public_address(&self) -> Option<&str> {
        self.public_address.as_deref()
    }

    /// Consumes the candidate and returns its raw line.
    #[inline]
    #[must_use]
    pub fn into_raw(self) -> String {
        self.raw
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Candidate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        classify(s)
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Classifies a raw candidate line.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the `typ` token or its value is missing, the
/// type is not one of `host`, `srflx`, `relay`, or the line has too few
/// fields for its type.
pub fn classify(raw: &str) -> Result<Candidate> {
    let family = detect_family(raw);

    let fields: Vec<&str> = raw.split_whitespace().collect();

    let marker = fields
        .iter()
        .position(|&field| field == TYPE_MARKER)
        .ok_or_else(|| Error::parse("missing 'typ' token", raw))?;

    let typ: CandidateType = fields
        .get(marker + 1)
        .ok_or_else(|| Error::parse("missing candidate type after 'typ'", raw))?
        .parse()
        .map_err(|_| Error::parse(format!("unknown candidate type '{}'", fields[marker + 1]), raw))?;

    let field = |index: usize| -> Result<String> {
        fields.get(index).map(|f| (*f).to_string()).ok_or_else(|| {
            Error::parse(
                format!("{typ} candidate needs at least {} fields", index + 1),
                raw,
            )
        })
    };

    let (internal_address, public_address) = match typ {
        CandidateType::Host => (Some(field(PRIMARY_ADDRESS_FIELD)?), None),
        CandidateType::Srflx | CandidateType::Relay => (
            Some(field(RELATED_ADDRESS_FIELD)?),
            Some(field(PRIMARY_ADDRESS_FIELD)?),
        ),
    };

    Ok(Candidate::from_parts(
        raw.to_string(),
        typ,
        family,
        internal_address,
        public_address,
    ))
}

/// Colon after the `candidate:` label means IPv6.
///
/// Lines without the label are inspected whole.
fn detect_family(raw: &str) -> AddressFamily {
    let body = match raw.find(CANDIDATE_LABEL) {
        Some(start) => &raw[start + CANDIDATE_LABEL.len()..],
        None => raw,
    };

    if body.contains(':') {
        AddressFamily::Ipv6
    } else {
        AddressFamily::Ipv4
    }
}

// ============================================================================
// Tests
// ============================================================================
