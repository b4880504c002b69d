//! Inbound path: the framer that segments the byte stream and the
//! dispatcher that routes each message by longest-prefix match.

use std::io::{self, Read};
use std::mem;

use ccn_wire::{parse_content_object, parse_interest};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::upcall::{UpcallInfo, UpcallKind, UpcallResult};

/// Headroom reserved ahead of every socket read.
const READ_HEADROOM: usize = 8800;

impl Handle {
    /// Pull everything the socket currently has, segment complete messages
    /// with the skeleton decoder, and dispatch each one. The poller is
    /// edge-triggered, so reading must continue until the kernel blocks.
    pub(crate) fn process_input(&mut self) -> Result<()> {
        while self.pull_input()? {}
        Ok(())
    }

    /// One read cycle. Returns whether bytes arrived (so the caller keeps
    /// pulling); a blocked socket reads as no progress.
    fn pull_input(&mut self) -> Result<bool> {
        if self.inbuf.is_empty() {
            self.decoder.reset();
        }
        let old_len = self.inbuf.len();
        self.inbuf.resize(old_len + READ_HEADROOM, 0);
        let res = {
            let Some(stream) = self.sock.as_mut() else {
                self.inbuf.truncate(old_len);
                return Err(self.note_err(Error::NotConnected));
            };
            stream.read(&mut self.inbuf[old_len..])
        };
        let n = match res {
            Ok(0) => {
                self.inbuf.truncate(old_len);
                debug!("daemon closed the connection");
                self.disconnect()?;
                return Err(Error::Disconnected);
            }
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => {
                self.inbuf.truncate(old_len);
                let err = Error::from(e);
                return Err(self.note_err(err));
            }
        };
        self.inbuf.truncate(old_len + n);

        // Walk the decoder over the new bytes, peeling off one message per
        // boundary. The buffer is taken out of the handle for the duration
        // so upcalls may freely mutate handle state.
        let mut inbuf = mem::take(&mut self.inbuf);
        let mut msgstart = 0_usize;
        self.decoder.feed(&inbuf[self.decoder.index()..]);
        while self.decoder.at_boundary() && self.decoder.index() > msgstart {
            let end = self.decoder.index();
            self.dispatch_message(&inbuf[msgstart..end]);
            if self.sock.is_none() {
                // An upcall disconnected us; the rest of the buffer is
                // gone with the connection.
                return Ok(false);
            }
            msgstart = end;
            if msgstart == inbuf.len() {
                inbuf.clear();
                break;
            }
            self.decoder.feed(&inbuf[self.decoder.index()..]);
        }
        if self.decoder.is_error() {
            self.disconnect()?;
            return Err(self.note_err(Error::Protocol));
        }
        // Keep at most one partial message, moved to the front.
        if msgstart < inbuf.len() && msgstart > 0 {
            inbuf.copy_within(msgstart.., 0);
            inbuf.truncate(inbuf.len() - msgstart);
            self.decoder.rebase(msgstart);
        }
        self.inbuf = inbuf;
        Ok(n > 0)
    }

    /// Route one complete message: an Interest goes through the filter
    /// table, a ContentObject through the expressed-Interest table,
    /// anything else is dropped.
    pub(crate) fn dispatch_message(&mut self, msg: &[u8]) {
        let mut comps = self.obtain_offsets();
        if parse_interest(msg, &mut comps).is_ok() {
            self.dispatch_interest(msg, &comps);
        } else if parse_content_object(msg, &mut comps).is_ok() {
            self.dispatch_content(msg, &comps);
        } else {
            trace!(len = msg.len(), "dropping unrecognized message");
        }
        self.release_offsets(comps);
    }

    /// Filter walk, deepest prefix first. Once any filter accepts (returns
    /// other than `Decline`), shallower filters see `ConsumedInterest` so
    /// they know a deeper handler already took responsibility. The default
    /// handler runs last with whatever kind the walk ended on.
    fn dispatch_interest(&mut self, msg: &[u8], comps: &[usize]) {
        let mut kind = UpcallKind::Interest;
        if !self.filters.is_empty() {
            let keystart = comps[0];
            for i in (0..comps.len()).rev() {
                let key = &msg[keystart..comps[i]];
                let Some(action) = self.filters.get(key).map(|f| f.action.clone()) else {
                    continue;
                };
                let info = UpcallInfo { message: msg, components: comps, matched: i };
                let res = action.borrow_mut().upcall(self, kind, &info);
                self.release_handler(Some(action));
                if res != UpcallResult::Decline {
                    kind = UpcallKind::ConsumedInterest;
                }
            }
        }
        if let Some(action) = self.default_interest_action.clone() {
            let info = UpcallInfo { message: msg, components: comps, matched: 0 };
            let _ = action.borrow_mut().upcall(self, kind, &info);
            self.release_handler(Some(action));
        }
    }

    /// Expressed-Interest walk, deepest prefix first. The upcall may remove
    /// or replace the entry it matched, so the entry is re-sought by key
    /// afterwards and only what is present then gets acted on.
    fn dispatch_content(&mut self, msg: &[u8], comps: &[usize]) {
        if !self.interests.is_empty() {
            let keystart = comps[0];
            for i in (0..comps.len()).rev() {
                let key = &msg[keystart..comps[i]];
                // Whether the content satisfies the selectors of the
                // expressed Interest is not checked before the upcall;
                // prefix match is all the qualification applied here.
                let Some(action) = self
                    .interests
                    .get(key)
                    .and_then(|e| (e.target > 0).then(|| e.action.clone()))
                else {
                    continue;
                };
                if let Some(entry) = self.interests.get_mut(key) {
                    entry.outstanding -= 1;
                }
                let info = UpcallInfo { message: msg, components: comps, matched: i };
                let res = action.borrow_mut().upcall(self, UpcallKind::Content, &info);
                self.release_handler(Some(action));
                match res {
                    UpcallResult::Decline => {}
                    UpcallResult::Reexpress => self.refresh_interest(key),
                    UpcallResult::Consumed => {
                        if let Some(entry) = self.interests.remove(key) {
                            self.release_handler(Some(entry.action));
                        }
                    }
                }
            }
        }
        if let Some(action) = self.default_content_action.clone() {
            let info = UpcallInfo { message: msg, components: comps, matched: 0 };
            let _ = action.borrow_mut().upcall(self, UpcallKind::Content, &info);
            self.release_handler(Some(action));
        }
    }
}
