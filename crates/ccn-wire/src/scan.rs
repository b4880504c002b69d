//! Cursor over a single already-framed message, shared by the structural
//! parsers.

use crate::coding::{CLOSE, MAX_TINY, TT_BITS, TT_HBIT, TT_MASK, Tt};
use crate::error::WireError;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Token {
    pub tt: Tt,
    pub val: u64,
}

pub(crate) struct Scanner<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos == self.buf.len()
    }

    pub fn at_close(&self) -> bool {
        self.buf.get(self.pos) == Some(&CLOSE)
    }

    pub fn take_close(&mut self) -> Result<(), WireError> {
        if self.at_close() {
            self.pos += 1;
            Ok(())
        } else if self.pos >= self.buf.len() {
            Err(WireError::Truncated)
        } else {
            Err(WireError::UnexpectedElement)
        }
    }

    /// Read one token header at the cursor.
    pub fn next_header(&mut self) -> Result<Token, WireError> {
        if self.at_close() {
            return Err(WireError::BadHeader);
        }
        let mut val: u64 = 0;
        loop {
            let c = *self.buf.get(self.pos).ok_or(WireError::Truncated)?;
            self.pos += 1;
            if c & TT_HBIT != 0 {
                val = (val << (7 - TT_BITS)) | u64::from((c >> TT_BITS) & MAX_TINY as u8);
                let tt = Tt::from_bits(c & TT_MASK).ok_or(WireError::BadHeader)?;
                return Ok(Token { tt, val });
            }
            if val > u64::MAX >> 7 {
                return Err(WireError::BadHeader);
            }
            val = (val << 7) | u64::from(c);
        }
    }

    /// Dtag number of the next token, if the next token is a dtag header.
    pub fn peek_dtag(&self) -> Option<u64> {
        let mut probe = Scanner { buf: self.buf, pos: self.pos };
        match probe.next_header() {
            Ok(Token { tt: Tt::Dtag, val }) => Some(val),
            _ => None,
        }
    }

    pub fn expect_dtag(&mut self, tag: u64) -> Result<(), WireError> {
        match self.next_header()? {
            Token { tt: Tt::Dtag, val } if val == tag => Ok(()),
            _ => Err(WireError::UnexpectedElement),
        }
    }

    pub fn skip_bytes(&mut self, n: usize) -> Result<(), WireError> {
        if self.buf.len() - self.pos < n {
            return Err(WireError::Truncated);
        }
        self.pos += n;
        Ok(())
    }

    pub fn read_blob(&mut self) -> Result<&'a [u8], WireError> {
        match self.next_header()? {
            Token { tt: Tt::Blob, val } => {
                let len = val as usize;
                let start = self.pos;
                self.skip_bytes(len)?;
                Ok(&self.buf[start..start + len])
            }
            _ => Err(WireError::UnexpectedElement),
        }
    }

    /// Skip one whole token at the cursor: a leaf blob/udata, or a tagged
    /// element together with its nested content and close marker.
    pub fn skip_element(&mut self) -> Result<(), WireError> {
        let mut depth = 0_usize;
        loop {
            if self.at_close() {
                if depth == 0 {
                    return Err(WireError::UnexpectedElement);
                }
                self.take_close()?;
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
                continue;
            }
            let token = self.next_header()?;
            match token.tt {
                Tt::Dtag => depth += 1,
                Tt::Blob | Tt::Udata => {
                    self.skip_bytes(token.val as usize)?;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => return Err(WireError::UnexpectedElement),
            }
        }
    }
}
