//! The per-process endpoint handle: connection management, Interest
//! expression, filter registration, and the outbound path.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::mem;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use ccn_wire::{SkeletonDecoder, is_complete_message, is_valid_name, parse_interest};
use mio::net::UnixStream;
use mio::{Events, Interest as Readiness, Poll, Token};
use tracing::{debug, warn};

use crate::config;
use crate::error::{Error, Result};
use crate::outbound::{OutBuf, SendState};
use crate::upcall::{HandlerRef, UpcallInfo, UpcallKind, same_handler};

pub(crate) const STREAM: Token = Token(0);

/// Desired number of concurrently outstanding copies of an Interest at the
/// daemon, set on every (re-)registration.
pub(crate) const EXPRESS_TARGET: i32 = 8;

/// Default half-life of the outstanding-count decay of expressed
/// Interests; also the natural wakeup cadence of the event loop.
pub(crate) const DEFAULT_HALFLIFE: Duration = Duration::from_secs(4);

/// Idle span after which an entry's outstanding estimate is plainly stale.
pub(crate) const STALE_AFTER: Duration = Duration::from_secs(30);

const DEFAULT_OUTPUT_LIMIT: usize = 4 * 1024 * 1024;

/// One expressed Interest, keyed in the table by its concatenated name
/// components (envelope bytes stripped).
pub(crate) struct ExpressedInterest {
    /// Instant of the last re-expression. `None` until the scheduler first
    /// touches the entry, which makes a fresh registration immediately due.
    pub lasttime: Option<Instant>,
    pub action: HandlerRef,
    /// Selector trailer reused verbatim on every re-expression.
    pub template: Option<Vec<u8>>,
    /// Desired concurrently-outstanding copies at the daemon.
    pub target: i32,
    /// Decaying estimate of copies currently outstanding.
    pub outstanding: i32,
}

pub(crate) struct InterestFilter {
    pub action: HandlerRef,
}

/// Per-process endpoint handle. Owns one connection to the local daemon
/// and every table entry, buffer, and callback reachable from it.
///
/// A handle is strictly single-threaded: all upcalls happen on the thread
/// driving [`run`](Handle::run), and there is no internal locking.
pub struct Handle {
    pub(crate) sock: Option<UnixStream>,
    pub(crate) poll: Poll,
    pub(crate) events: Events,
    pub(crate) writable_armed: bool,
    pub(crate) outbuf: OutBuf,
    pub(crate) inbuf: Vec<u8>,
    pub(crate) decoder: SkeletonDecoder,
    // Reusable wire scratch for re-expressions.
    pub(crate) interestbuf: Vec<u8>,
    // Single-slot pool keeping steady-state dispatch allocation-free.
    pub(crate) scratch_offsets: Option<Vec<usize>>,
    pub(crate) interests: HashMap<Vec<u8>, ExpressedInterest>,
    pub(crate) filters: HashMap<Vec<u8>, InterestFilter>,
    pub(crate) default_content_action: Option<HandlerRef>,
    pub(crate) default_interest_action: Option<HandlerRef>,
    pub(crate) last_error: Option<Error>,
    pub(crate) verbose: bool,
    pub(crate) tap: Option<File>,
    pub(crate) halflife: Duration,
}

impl Handle {
    /// A disconnected handle. Reads `CCN_DEBUG` (verbose error records) and
    /// `CCN_TAP` (outbound byte capture) once, here.
    pub fn new() -> Result<Self> {
        let verbose = std::env::var(config::DEBUG_ENV).is_ok_and(|v| !v.is_empty());
        let tap = std::env::var(config::TAP_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .and_then(|prefix| open_tap(&prefix));
        Ok(Self {
            sock: None,
            poll: Poll::new()?,
            events: Events::with_capacity(4),
            writable_armed: false,
            outbuf: OutBuf::new(DEFAULT_OUTPUT_LIMIT),
            inbuf: Vec::new(),
            decoder: SkeletonDecoder::new(),
            interestbuf: Vec::new(),
            scratch_offsets: None,
            interests: HashMap::new(),
            filters: HashMap::new(),
            default_content_action: None,
            default_interest_action: None,
            last_error: None,
            verbose,
            tap,
            halflife: DEFAULT_HALFLIFE,
        })
    }

    /// Sets the half-life of the outstanding-count decay, and with it the
    /// re-expression cadence of expressed Interests.
    #[must_use]
    pub fn with_interest_halflife(mut self, halflife: Duration) -> Self {
        self.halflife = halflife.max(Duration::from_micros(1));
        self
    }

    /// Sets the ceiling on queued outbound bytes.
    #[must_use]
    pub fn with_output_limit(mut self, limit: usize) -> Self {
        self.outbuf.set_limit(limit);
        self
    }

    /// Connect to the daemon. `None` resolves the address from
    /// `CCN_LOCAL_PORT` (a short value suffixes the default socket path)
    /// and falls back to the default.
    pub fn connect(&mut self, name: Option<&str>) -> Result<()> {
        let env = std::env::var(config::LOCAL_PORT_ENV).ok();
        let path = config::socket_path(name, env.as_deref());
        self.connect_path(&path)
    }

    /// Connect to an explicit socket path, bypassing environment lookup.
    pub fn connect_path(&mut self, path: &Path) -> Result<()> {
        self.last_error = None;
        if self.sock.is_some() {
            return Err(self.note_err(Error::InvalidArg));
        }
        let stream = match std::os::unix::net::UnixStream::connect(path) {
            Ok(s) => s,
            Err(e) => return Err(self.note_err(e.into())),
        };
        if let Err(e) = stream.set_nonblocking(true) {
            return Err(self.note_err(e.into()));
        }
        let mut stream = UnixStream::from_std(stream);
        if let Err(e) = self.poll.registry().register(&mut stream, STREAM, Readiness::READABLE) {
            return Err(self.note_err(e.into()));
        }
        self.writable_armed = false;
        debug!(path = %path.display(), "connected to daemon");
        self.sock = Some(stream);
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.sock.is_some()
    }

    /// Raw descriptor of the daemon connection, for callers integrating
    /// the handle into an outer readiness loop.
    pub fn connection_fd(&self) -> Option<RawFd> {
        self.sock.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Drop the connection and both transfer buffers. Table entries and
    /// their callbacks survive; they die with the handle or by explicit
    /// clearing.
    pub fn disconnect(&mut self) -> Result<()> {
        let Some(mut stream) = self.sock.take() else {
            return Ok(());
        };
        self.inbuf.clear();
        self.decoder.reset();
        self.outbuf.clear();
        self.writable_armed = false;
        let _ = self.poll.registry().deregister(&mut stream);
        drop(stream);
        debug!("disconnected");
        Ok(())
    }

    /// Most recent error recorded on the handle.
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    pub(crate) fn note_err(&mut self, err: Error) -> Error {
        if self.verbose {
            warn!(%err, "handle error");
        } else {
            debug!(%err, "handle error");
        }
        self.last_error = Some(err.clone());
        err
    }

    /// Release a handler reference; if it is the last one, the handler
    /// receives its single `Final` upcall first.
    pub(crate) fn release_handler(&mut self, old: Option<HandlerRef>) {
        if let Some(h) = old {
            if Rc::strong_count(&h) == 1 {
                let info = UpcallInfo::default();
                let _ = h.borrow_mut().upcall(self, UpcallKind::Final, &info);
            }
        }
    }

    /// Handler invoked for Interests no filter consumed (it still sees the
    /// final upcall kind). `None` clears the slot.
    pub fn set_default_interest_handler(&mut self, action: Option<HandlerRef>) {
        if same_handler(self.default_interest_action.as_ref(), action.as_ref()) {
            return;
        }
        let old = mem::replace(&mut self.default_interest_action, action);
        self.release_handler(old);
    }

    /// Handler invoked for every ContentObject after the expressed-Interest
    /// walk. `None` clears the slot.
    pub fn set_default_content_handler(&mut self, action: Option<HandlerRef>) {
        if same_handler(self.default_content_action.as_ref(), action.as_ref()) {
            return;
        }
        let old = mem::replace(&mut self.default_content_action, action);
        self.release_handler(old);
    }

    /// Register interest in `name` (a complete Name element). The daemon is
    /// asked for matching content until the Interest is consumed; delivery
    /// is by name prefix only, and selector qualifiers on the template are
    /// forwarded to the daemon but not re-checked before the upcall.
    ///
    /// The wire Interest is issued from the next scheduler pass, carrying
    /// the selector trailer extracted from `template` (itself a complete
    /// Interest message) on every (re-)expression.
    pub fn express_interest(
        &mut self,
        name: &[u8],
        action: HandlerRef,
        template: Option<&[u8]>,
    ) -> Result<()> {
        if !is_valid_name(name) {
            return Err(self.note_err(Error::InvalidArg));
        }
        let key = &name[1..name.len() - 1];
        let template = template.and_then(extract_template);
        if let Some(entry) = self.interests.get_mut(key) {
            let old = if Rc::ptr_eq(&entry.action, &action) {
                None
            } else {
                Some(mem::replace(&mut entry.action, action))
            };
            entry.template = template;
            entry.target = EXPRESS_TARGET;
            self.release_handler(old);
        } else {
            self.interests.insert(
                key.to_vec(),
                ExpressedInterest {
                    lasttime: None,
                    action,
                    template,
                    target: EXPRESS_TARGET,
                    outstanding: 0,
                },
            );
        }
        Ok(())
    }

    /// Serve Interests under `name`: `action` fires for every inbound
    /// Interest whose name extends this prefix. `None` removes the filter.
    pub fn set_interest_filter(
        &mut self,
        name: &[u8],
        action: Option<HandlerRef>,
    ) -> Result<()> {
        if !is_valid_name(name) {
            return Err(self.note_err(Error::InvalidArg));
        }
        let key = &name[1..name.len() - 1];
        match action {
            Some(action) => {
                if let Some(entry) = self.filters.get_mut(key) {
                    if !Rc::ptr_eq(&entry.action, &action) {
                        let old = mem::replace(&mut entry.action, action);
                        self.release_handler(Some(old));
                    }
                } else {
                    self.filters.insert(key.to_vec(), InterestFilter { action });
                }
            }
            None => {
                if let Some(entry) = self.filters.remove(key) {
                    self.release_handler(Some(entry.action));
                }
            }
        }
        Ok(())
    }

    /// Hand one complete wire message to the daemon. `Pending` means the
    /// bytes (or a suffix of them) are queued behind a busy socket and will
    /// drain from the event loop.
    pub fn put(&mut self, bytes: &[u8]) -> Result<SendState> {
        if bytes.is_empty() || !is_complete_message(bytes) {
            return Err(self.note_err(Error::InvalidArg));
        }
        if self.sock.is_none() {
            return Err(self.note_err(Error::NotConnected));
        }
        if self.outbuf.is_pending() {
            if let Err(e) = self.outbuf.enqueue(bytes) {
                return Err(self.note_err(e));
            }
            return self.push_out();
        }
        self.tap_write(bytes);
        let Some(stream) = self.sock.as_mut() else {
            return Err(self.note_err(Error::NotConnected));
        };
        let res = stream.write(bytes);
        let written = match res {
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => 0,
            Err(e) => return Err(self.note_err(e.into())),
        };
        if written == bytes.len() {
            return Ok(SendState::Flushed);
        }
        if let Err(e) = self.outbuf.enqueue(&bytes[written..]) {
            return Err(self.note_err(e));
        }
        self.arm_writable()?;
        Ok(SendState::Pending)
    }

    /// True iff queued outbound bytes are waiting on the socket.
    pub fn output_is_pending(&self) -> bool {
        self.outbuf.is_pending()
    }

    /// Drain the outbound queue as far as the kernel allows, keeping
    /// writable interest armed exactly while something is still queued.
    pub(crate) fn push_out(&mut self) -> Result<SendState> {
        if !self.outbuf.is_pending() {
            return Ok(SendState::Flushed);
        }
        let res = {
            let Some(stream) = self.sock.as_mut() else {
                return Err(self.note_err(Error::NotConnected));
            };
            self.outbuf.flush(stream)
        };
        match res {
            Ok(SendState::Flushed) => {
                self.disarm_writable()?;
                Ok(SendState::Flushed)
            }
            Ok(SendState::Pending) => {
                self.arm_writable()?;
                Ok(SendState::Pending)
            }
            Err(e) => Err(self.note_err(e)),
        }
    }

    fn arm_writable(&mut self) -> Result<()> {
        if self.writable_armed {
            return Ok(());
        }
        if let Some(stream) = self.sock.as_mut() {
            let res = self.poll.registry().reregister(
                stream,
                STREAM,
                Readiness::READABLE | Readiness::WRITABLE,
            );
            if let Err(e) = res {
                return Err(self.note_err(e.into()));
            }
            self.writable_armed = true;
        }
        Ok(())
    }

    fn disarm_writable(&mut self) -> Result<()> {
        if !self.writable_armed {
            return Ok(());
        }
        if let Some(stream) = self.sock.as_mut() {
            let res = self.poll.registry().reregister(stream, STREAM, Readiness::READABLE);
            if let Err(e) = res {
                return Err(self.note_err(e.into()));
            }
        }
        self.writable_armed = false;
        Ok(())
    }

    fn tap_write(&mut self, bytes: &[u8]) {
        if let Some(tap) = self.tap.as_mut() {
            // Tap failures are silent.
            let _ = tap.write_all(bytes);
        }
    }

    pub(crate) fn obtain_offsets(&mut self) -> Vec<usize> {
        match self.scratch_offsets.take() {
            Some(mut v) => {
                v.clear();
                v
            }
            None => Vec::new(),
        }
    }

    pub(crate) fn release_offsets(&mut self, v: Vec<usize>) {
        if self.scratch_offsets.is_none() {
            self.scratch_offsets = Some(v);
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let _ = self.disconnect();
        let old = self.default_interest_action.take();
        self.release_handler(old);
        let old = self.default_content_action.take();
        self.release_handler(old);
        let actions: Vec<HandlerRef> = self.interests.drain().map(|(_, e)| e.action).collect();
        for action in actions {
            self.release_handler(Some(action));
        }
        let actions: Vec<HandlerRef> = self.filters.drain().map(|(_, f)| f.action).collect();
        for action in actions {
            self.release_handler(Some(action));
        }
    }
}

/// Selector trailer of a template Interest, from the publisher digest
/// through Scope. An unparseable or selector-free template contributes
/// nothing.
fn extract_template(template: &[u8]) -> Option<Vec<u8>> {
    let mut comps = Vec::new();
    let pi = parse_interest(template, &mut comps).ok()?;
    let stuff = pi.selectors(template);
    (!stuff.is_empty()).then(|| stuff.to_vec())
}

fn open_tap(prefix: &str) -> Option<File> {
    let path = config::tap_path(prefix);
    match OpenOptions::new().append(true).create(true).open(&path) {
        Ok(f) => {
            debug!(path = %path.display(), "tap capture enabled");
            Some(f)
        }
        Err(err) => {
            warn!(%err, path = %path.display(), "unable to open tap file");
            None
        }
    }
}
