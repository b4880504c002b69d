//! Name construction and validation.
//!
//! A name on the wire is `Name { Component { <bytes> } ... }`: an ordered
//! sequence of opaque byte components, each a tagged blob. The opening byte
//! of the envelope is the deterministic [`NAME_OPEN`] header and the last
//! byte is the universal close marker; everything in between is the
//! component run that name-keyed tables use as their key.
//!
//! [`NAME_OPEN`]: crate::coding::NAME_OPEN

use crate::coding::{self, CLOSE, NAME_OPEN, Tt, dtag};
use crate::error::WireError;
use crate::scan::Scanner;

/// Builds a complete Name element.
#[derive(Debug)]
pub struct NameBuilder {
    buf: Vec<u8>,
}

impl Default for NameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NameBuilder {
    pub fn new() -> Self {
        let mut buf = Vec::new();
        coding::append_tt(&mut buf, dtag::NAME, Tt::Dtag);
        Self { buf }
    }

    #[must_use]
    pub fn append(mut self, component: &[u8]) -> Self {
        coding::append_tagged_blob(&mut self.buf, dtag::COMPONENT, component);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        coding::append_closer(&mut self.buf);
        self.buf
    }
}

/// Envelope check: the deterministic opening byte, the close marker, and
/// room for both.
pub fn is_valid_name(buf: &[u8]) -> bool {
    buf.len() >= 2 && buf[0] == NAME_OPEN && buf[buf.len() - 1] == CLOSE
}

/// Name element for a slash-separated printable name. Empty segments are
/// ignored, so `"/a/b"` and `"a/b/"` encode the same two components.
pub fn name_from_uri(uri: &str) -> Vec<u8> {
    let mut builder = NameBuilder::new();
    for segment in uri.split('/').filter(|s| !s.is_empty()) {
        builder = builder.append(segment.as_bytes());
    }
    builder.finish()
}

/// Parse a Name element at the cursor, pushing one offset per component
/// start plus a final offset at the name close. The depth-`i` prefix key of
/// the surrounding message is `msg[comps[0]..comps[i]]`.
pub(crate) fn parse_name(
    s: &mut Scanner<'_>,
    comps: &mut Vec<usize>,
) -> Result<(usize, usize), WireError> {
    let start = s.pos();
    s.expect_dtag(dtag::NAME)?;
    loop {
        if s.at_close() {
            comps.push(s.pos());
            s.take_close()?;
            break;
        }
        comps.push(s.pos());
        s.expect_dtag(dtag::COMPONENT)?;
        s.read_blob()?;
        s.take_close()?;
    }
    Ok((start, s.pos()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_validates() {
        let name = NameBuilder::new().append(b"a").finish();
        assert!(is_valid_name(&name));
        assert!(!is_valid_name(&name[..1]));
        assert!(!is_valid_name(&[]));
        assert!(!is_valid_name(&[NAME_OPEN]));
        assert!(!is_valid_name(&[0x13, CLOSE]));
    }

    #[test]
    fn empty_name_is_just_the_envelope() {
        let name = NameBuilder::new().finish();
        assert_eq!(name, vec![NAME_OPEN, CLOSE]);
        assert!(is_valid_name(&name));
    }

    #[test]
    fn uri_segments_become_components() {
        assert_eq!(name_from_uri("/a/b"), NameBuilder::new().append(b"a").append(b"b").finish());
        assert_eq!(name_from_uri("a/b/"), name_from_uri("/a/b"));
        assert_eq!(name_from_uri("/"), NameBuilder::new().finish());
    }
}
