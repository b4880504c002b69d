//! Structural Interest parsing and encoding.

use crate::coding::{self, Tt, dtag};
use crate::error::WireError;
use crate::name::parse_name;
use crate::scan::Scanner;

// Optional selector elements in canonical order. The trailer copied into
// re-expressed Interests runs from where the publisher digest would sit
// through the end of Scope; suffix bounds sit before it and Nonce after, so
// a fresh expression never reuses a stale nonce.
const PRE_TRAILER: [u64; 2] = [dtag::MIN_SUFFIX_COMPONENTS, dtag::MAX_SUFFIX_COMPONENTS];
const TRAILER: [u64; 5] = [
    dtag::PUBLISHER_PUBLIC_KEY_DIGEST,
    dtag::EXCLUDE,
    dtag::CHILD_SELECTOR,
    dtag::ANSWER_ORIGIN_KIND,
    dtag::SCOPE,
];

/// Byte offsets of the pieces of a parsed Interest.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInterest {
    pub name_start: usize,
    pub name_end: usize,
    /// Selector trailer range; empty when the Interest carries no selectors.
    pub selectors_start: usize,
    pub selectors_end: usize,
    pub end: usize,
}

impl ParsedInterest {
    /// The selector bytes reused verbatim by every re-expression.
    pub fn selectors<'a>(&self, msg: &'a [u8]) -> &'a [u8] {
        &msg[self.selectors_start..self.selectors_end]
    }
}

/// Structural parse of exactly one Interest message.
///
/// `comps` receives one offset per component start plus a final offset at
/// the name close, so the depth-`i` prefix key is `msg[comps[0]..comps[i]]`.
pub fn parse_interest(msg: &[u8], comps: &mut Vec<usize>) -> Result<ParsedInterest, WireError> {
    comps.clear();
    let mut s = Scanner::new(msg);
    s.expect_dtag(dtag::INTEREST)?;
    let (name_start, name_end) = parse_name(&mut s, comps)?;

    for tag in PRE_TRAILER {
        if s.peek_dtag() == Some(tag) {
            s.skip_element()?;
        }
    }
    let selectors_start = s.pos();
    for tag in TRAILER {
        if s.peek_dtag() == Some(tag) {
            s.skip_element()?;
        }
    }
    let selectors_end = s.pos();
    if s.peek_dtag() == Some(dtag::NONCE) {
        s.skip_element()?;
    }
    s.take_close()?;
    if !s.at_end() {
        return Err(WireError::UnexpectedElement);
    }
    Ok(ParsedInterest {
        name_start,
        name_end,
        selectors_start,
        selectors_end,
        end: msg.len(),
    })
}

/// Encode `Interest { <name element> <trailer> }` from a complete Name
/// element and an optional pre-encoded selector trailer.
pub fn encode_interest(name: &[u8], trailer: Option<&[u8]>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(name.len() + trailer.map_or(0, <[u8]>::len) + 2);
    coding::append_tt(&mut buf, dtag::INTEREST, Tt::Dtag);
    buf.extend_from_slice(name);
    if let Some(t) = trailer {
        buf.extend_from_slice(t);
    }
    coding::append_closer(&mut buf);
    buf
}
