//! Candidate filtering and address masking.
//!
//! Two independent policies run in order:
//!
//! 1. **Family filter** decides keep or drop.
//! 2. **Type filter** decides whether a kept candidate is forwarded as-is or
//!    with its addresses masked (last segment replaced by a sentinel).
//!
//! Masking substitutes whole whitespace-delimited tokens only, so every
//! other byte of the raw line survives unchanged.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::classifier::{AddressFamily, Candidate, CandidateType};

// ============================================================================
// Constants
// ============================================================================

/// Replacement for the last octet of a masked IPv4 address.
pub const IPV4_SENTINEL: &str = "254";

/// Replacement for the last group of a masked IPv6 address.
pub const IPV6_SENTINEL: &str = "2000";

// ============================================================================
// Filters
// ============================================================================

/// Which address families are allowed through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressFamilyFilter {
    /// IPv4 only.
    Ipv4,
    /// IPv6 only.
    Ipv6,
    /// Both families.
    #[default]
    Both,
}

impl AddressFamilyFilter {
    /// Returns `true` if candidates of `family` pass this filter.
    #[inline]
    #[must_use]
    pub const fn allows(self, family: AddressFamily) -> bool {
        matches!(
            (self, family),
            (Self::Both, _)
                | (Self::Ipv4, AddressFamily::Ipv4)
                | (Self::Ipv6, AddressFamily::Ipv6)
        )
    }
}

impl fmt::Display for AddressFamilyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ipv4 => f.write_str("ipv4"),
            Self::Ipv6 => f.write_str("ipv6"),
            Self::Both => f.write_str("both"),
        }
    }
}

impl FromStr for AddressFamilyFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ipv4" => Ok(Self::Ipv4),
            "ipv6" => Ok(Self::Ipv6),
            "both" => Ok(Self::Both),
            _ => Err(Error::config(format!("Unknown address family filter: {s}"))),
        }
    }
}

/// Which candidate type is forwarded unmasked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateTypeFilter {
    /// Host candidates pass unmasked.
    Host,
    /// Server-reflexive candidates pass unmasked.
    Srflx,
    /// Relay candidates pass unmasked.
    Relay,
    /// Every candidate passes unmasked.
    #[default]
    All,
}

impl CandidateTypeFilter {
    /// Returns `true` if candidates of `typ` are forwarded without masking.
    #[inline]
    #[must_use]
    pub const fn passes_unmasked(self, typ: CandidateType) -> bool {
        matches!(
            (self, typ),
            (Self::All, _)
                | (Self::Host, CandidateType::Host)
                | (Self::Srflx, CandidateType::Srflx)
                | (Self::Relay, CandidateType::Relay)
        )
    }
}

impl fmt::Display for CandidateTypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => f.write_str("host"),
            Self::Srflx => f.write_str("srflx"),
            Self::Relay => f.write_str("relay"),
            Self::All => f.write_str("all"),
        }
    }
}

impl FromStr for CandidateTypeFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "host" => Ok(Self::Host),
            "srflx" => Ok(Self::Srflx),
            "relay" => Ok(Self::Relay),
            "all" => Ok(Self::All),
            _ => Err(Error::config(format!("Unknown candidate type filter: {s}"))),
        }
    }
}

/// Family and type filter pair applied by the candidate pump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFilter {
    /// Family filter.
    pub family: AddressFamilyFilter,
    /// Type filter.
    pub typ: CandidateTypeFilter,
}

impl CandidateFilter {
    /// Creates a filter pair.
    #[inline]
    #[must_use]
    pub const fn new(family: AddressFamilyFilter, typ: CandidateTypeFilter) -> Self {
        Self { family, typ }
    }

    /// Applies both filters to `candidate`.
    #[inline]
    #[must_use]
    pub fn apply(&self, candidate: &Candidate) -> Decision {
        decide(candidate, self.family, self.typ)
    }
}

// ============================================================================
// Decision
// ============================================================================

/// Outcome of filtering one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Candidate is filtered out.
    Drop,
    /// Candidate is forwarded, possibly with masked addresses.
    Keep(Candidate),
}

impl Decision {
    /// Returns `true` if the candidate was dropped.
    #[inline]
    #[must_use]
    pub fn is_drop(&self) -> bool {
        matches!(self, Self::Drop)
    }

    /// Returns the kept candidate, if any.
    #[inline]
    #[must_use]
    pub fn into_candidate(self) -> Option<Candidate> {
        match self {
            Self::Drop => None,
            Self::Keep(candidate) => Some(candidate),
        }
    }
}

// ============================================================================
// Decide
// ============================================================================

/// Filters and, if needed, masks a candidate.
///
/// A dropped candidate is never rewritten.
#[must_use]
pub fn decide(
    candidate: &Candidate,
    family_filter: AddressFamilyFilter,
    type_filter: CandidateTypeFilter,
) -> Decision {
    if !family_filter.allows(candidate.family()) {
        return Decision::Drop;
    }

    if type_filter.passes_unmasked(candidate.typ()) {
        return Decision::Keep(candidate.clone());
    }

    Decision::Keep(rewrite(candidate))
}

/// Masks the candidate's addresses according to its type.
fn rewrite(candidate: &Candidate) -> Candidate {
    let family = candidate.family();

    let internal = candidate
        .internal_address()
        .map(|addr| (addr, mask_address(addr, family)));

    let public = match candidate.typ() {
        CandidateType::Host => None,
        CandidateType::Srflx | CandidateType::Relay => candidate
            .public_address()
            .map(|addr| (addr, mask_address(addr, family))),
    };

    let replacements: Vec<(&str, String)> = internal.iter().chain(public.iter()).cloned().collect();
    let raw = replace_tokens(candidate.raw(), &replacements);

    Candidate::from_parts(
        raw,
        candidate.typ(),
        family,
        internal.map(|(_, masked)| masked),
        public.map(|(_, masked)| masked),
    )
}

/// Replaces the final segment of `address` with the family sentinel.
///
/// IPv4 segments are split on `.`, IPv6 on `:`. An address without a
/// separator is replaced by the sentinel alone.
#[must_use]
pub fn mask_address(address: &str, family: AddressFamily) -> String {
    let (separator, sentinel) = match family {
        AddressFamily::Ipv4 => ('.', IPV4_SENTINEL),
        AddressFamily::Ipv6 => (':', IPV6_SENTINEL),
    };

    match address.rsplit_once(separator) {
        Some((prefix, _)) => format!("{prefix}{separator}{sentinel}"),
        None => sentinel.to_string(),
    }
}

/// Rebuilds `raw`, substituting whole tokens that exactly match a key.
///
/// Whitespace runs are copied verbatim. Each token is substituted at most
/// once, so masked values are never masked again.
fn replace_tokens(raw: &str, replacements: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    let mut rest = raw;

    while !rest.is_empty() {
        let token_start = rest
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(rest.len());
        out.push_str(&rest[..token_start]);
        rest = &rest[token_start..];

        let token_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let token = &rest[..token_end];

        match replacements.iter().find(|(from, _)| *from == token) {
            Some((_, to)) => out.push_str(to),
            None => out.push_str(token),
        }

        rest = &rest[token_end..];
    }

    out
}

// ============================================================================
// Tests
// ============================================================================
