//! Structural ContentObject parsing and encoding.
//!
//! Dispatch only needs the name's component offsets; signature and metadata
//! elements are segmented and skipped, never interpreted.

use crate::coding::{self, Tt, dtag};
use crate::error::WireError;
use crate::name::parse_name;
use crate::scan::Scanner;

/// Name bounds of a parsed ContentObject. The rest of the message is
/// signature and metadata that consumers route by name and never touch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParsedContentObject {
    pub name_start: usize,
    pub name_end: usize,
}

/// Structural parse of exactly one ContentObject message. Same `comps`
/// contract as [`parse_interest`](crate::parse_interest).
pub fn parse_content_object(
    msg: &[u8],
    comps: &mut Vec<usize>,
) -> Result<ParsedContentObject, WireError> {
    comps.clear();
    let mut s = Scanner::new(msg);
    s.expect_dtag(dtag::CONTENT_OBJECT)?;
    if s.peek_dtag() == Some(dtag::SIGNATURE) {
        s.skip_element()?;
    }
    let (name_start, name_end) = parse_name(&mut s, comps)?;
    while !s.at_close() {
        s.skip_element()?;
    }
    s.take_close()?;
    if !s.at_end() {
        return Err(WireError::UnexpectedElement);
    }
    Ok(ParsedContentObject { name_start, name_end })
}

/// Encode a minimal `ContentObject { <name element> Content { payload } }`.
pub fn encode_content_object(name: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(name.len() + payload.len() + 8);
    coding::append_tt(&mut buf, dtag::CONTENT_OBJECT, Tt::Dtag);
    buf.extend_from_slice(name);
    coding::append_tagged_blob(&mut buf, dtag::CONTENT, payload);
    coding::append_closer(&mut buf);
    buf
}
