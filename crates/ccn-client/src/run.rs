//! The event loop and the Interest aging/refresh scheduler.

use std::io;
use std::time::{Duration, Instant};

use ccn_wire::coding::{self, Tt, dtag};
use tracing::debug;

use crate::error::{Error, Result};
use crate::handle::{Handle, STALE_AFTER, STREAM};
use crate::upcall::{UpcallInfo, UpcallKind};

impl Handle {
    /// Rebuild and issue the wire Interest for `key` (the stored component
    /// run), reusing the entry's selector trailer. Issues only while the
    /// outstanding estimate is below target; a successful hand-off to
    /// `put` counts as one more outstanding copy.
    pub(crate) fn refresh_interest(&mut self, key: &[u8]) {
        let mut wire = std::mem::take(&mut self.interestbuf);
        wire.clear();
        let should_send = match self.interests.get(key) {
            Some(entry) => {
                coding::append_tt(&mut wire, dtag::INTEREST, Tt::Dtag);
                coding::append_tt(&mut wire, dtag::NAME, Tt::Dtag);
                wire.extend_from_slice(key);
                coding::append_closer(&mut wire);
                if let Some(template) = &entry.template {
                    wire.extend_from_slice(template);
                }
                coding::append_closer(&mut wire);
                entry.outstanding < entry.target
            }
            None => false,
        };
        if should_send && self.put(&wire).is_ok() {
            if let Some(entry) = self.interests.get_mut(key) {
                entry.outstanding += 1;
            }
        }
        self.interestbuf = wire;
    }

    /// One scheduler pass: decay outstanding counts by elapsed half-lives,
    /// fire timeout upcalls, and re-express entries that have gone fully
    /// quiet. Returns the time until the next entry's half-life lapses,
    /// the loop's natural wakeup.
    fn age_interests(&mut self, now: Instant) -> Duration {
        let halflife = self.halflife;
        let halflife_us = halflife.as_micros() as u64;
        let mut refresh = 5 * halflife;
        // Keys are copied up front: the timeout upcall may add or remove
        // entries, so every key is re-sought before being touched.
        let keys: Vec<Vec<u8>> = self.interests.keys().cloned().collect();
        for key in keys {
            let mut fire = false;
            if let Some(entry) = self.interests.get_mut(&key) {
                let last = match entry.lasttime {
                    Some(t) if now.duration_since(t) <= STALE_AFTER => t,
                    // Long-idle (or never-issued) entries restart from a
                    // clean estimate.
                    _ => {
                        entry.outstanding = 0;
                        now
                    }
                };
                let mut delta_us = now.duration_since(last).as_micros() as u64;
                while delta_us >= halflife_us {
                    entry.outstanding /= 2;
                    delta_us -= halflife_us;
                }
                let remaining = Duration::from_micros(halflife_us - delta_us);
                if remaining < refresh {
                    refresh = remaining;
                }
                // Write back `now - residual` so partial progress toward
                // the next half-life is kept across passes.
                entry.lasttime = Some(now - Duration::from_micros(delta_us));
                fire = entry.target > 0 && entry.outstanding == 0;
            }
            if fire {
                // The timeout upcall is informational and always precedes
                // the re-expression.
                if let Some(action) = self.interests.get(&key).map(|e| e.action.clone()) {
                    let info = UpcallInfo::default();
                    let _ = action.borrow_mut().upcall(self, UpcallKind::InterestTimedOut, &info);
                    self.release_handler(Some(action));
                }
                self.refresh_interest(&key);
            }
        }
        refresh
    }

    /// Drive the handle: age Interests, poll the socket, drain queued
    /// output, and dispatch whatever arrives.
    ///
    /// Returns `Ok(())` once `timeout` wall time has elapsed (`None` means
    /// no cap), `Err(Disconnected)` when the daemon goes away, and any
    /// other error when the loop hits something unrecoverable.
    pub fn run(&mut self, timeout: Option<Duration>) -> Result<()> {
        let mut start: Option<Instant> = None;
        while self.sock.is_some() {
            let now = Instant::now();
            let mut refresh = 5 * self.halflife;
            // Re-expressions are deferred while output is stuck so they do
            // not pile up behind a busy socket.
            if !self.interests.is_empty() && !self.output_is_pending() {
                refresh = self.age_interests(now);
            }
            match start {
                None => start = Some(now),
                Some(s) => {
                    if let Some(cap) = timeout {
                        if now.duration_since(s) > cap {
                            return Ok(());
                        }
                    }
                }
            }
            let mut poll_timeout = refresh;
            if let Some(cap) = timeout {
                poll_timeout = poll_timeout.min(cap);
            }
            match self.poll.poll(&mut self.events, Some(poll_timeout)) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    let err = Error::from(e);
                    return Err(self.note_err(err));
                }
            }
            let mut readable = false;
            let mut writable = false;
            for ev in self.events.iter() {
                if ev.token() == STREAM {
                    readable |= ev.is_readable();
                    writable |= ev.is_writable();
                }
            }
            if writable && self.output_is_pending() {
                if let Err(err) = self.push_out() {
                    return self.fail(err);
                }
            }
            if readable {
                if let Err(err) = self.process_input() {
                    return self.fail(err);
                }
            }
            if matches!(self.last_error, Some(Error::NotConnected)) {
                self.disconnect()?;
            }
        }
        Err(Error::Disconnected)
    }

    fn fail(&mut self, err: Error) -> Result<()> {
        debug!(%err, "event loop exiting");
        if err == Error::NotConnected {
            let _ = self.disconnect();
        }
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use ccn_wire::name_from_uri;

    use super::*;
    use crate::upcall::{UpcallResult, handler};

    fn timeout_counter(count: &Rc<RefCell<u32>>) -> crate::HandlerRef {
        let count = Rc::clone(count);
        handler(move |_h: &mut Handle, kind: UpcallKind, _info: &UpcallInfo<'_>| {
            if kind == UpcallKind::InterestTimedOut {
                *count.borrow_mut() += 1;
            }
            UpcallResult::Consumed
        })
    }

    #[test]
    fn fresh_entry_times_out_and_refreshes_immediately() {
        let mut h = Handle::new().unwrap();
        let count = Rc::new(RefCell::new(0));
        let name = name_from_uri("/probe");
        h.express_interest(&name, timeout_counter(&count), None).unwrap();

        let refresh = h.age_interests(Instant::now());
        assert_eq!(*count.borrow(), 1);
        assert!(refresh <= h.halflife);
        // Disconnected, so the re-issue could not go out and the estimate
        // stays at zero; the entry itself survives.
        let entry = h.interests.values().next().unwrap();
        assert_eq!(entry.outstanding, 0);
        assert!(entry.lasttime.is_some());
    }

    #[test]
    fn outstanding_halves_once_per_halflife() {
        let mut h = Handle::new().unwrap().with_interest_halflife(Duration::from_millis(10));
        let count = Rc::new(RefCell::new(0));
        let name = name_from_uri("/probe");
        h.express_interest(&name, timeout_counter(&count), None).unwrap();

        let t0 = Instant::now();
        h.age_interests(t0);
        {
            let entry = h.interests.values_mut().next().unwrap();
            entry.outstanding = 8;
        }
        h.age_interests(t0 + Duration::from_millis(25));
        let entry = h.interests.values().next().unwrap();
        // Two full half-lives elapsed: 8 -> 4 -> 2.
        assert_eq!(entry.outstanding, 2);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn quiet_entries_do_not_fire_before_the_halflife() {
        let mut h = Handle::new().unwrap().with_interest_halflife(Duration::from_millis(50));
        let count = Rc::new(RefCell::new(0));
        let name = name_from_uri("/probe");
        h.express_interest(&name, timeout_counter(&count), None).unwrap();

        let t0 = Instant::now();
        h.age_interests(t0);
        assert_eq!(*count.borrow(), 1);
        {
            let entry = h.interests.values_mut().next().unwrap();
            entry.outstanding = 1;
        }
        // Well inside the half-life: no decay to zero, no upcall.
        h.age_interests(t0 + Duration::from_millis(10));
        assert_eq!(*count.borrow(), 1);
        let entry = h.interests.values().next().unwrap();
        assert_eq!(entry.outstanding, 1);
    }

    #[test]
    fn stale_entries_reset_their_estimate() {
        let mut h = Handle::new().unwrap();
        let count = Rc::new(RefCell::new(0));
        let name = name_from_uri("/probe");
        h.express_interest(&name, timeout_counter(&count), None).unwrap();

        let t0 = Instant::now();
        h.age_interests(t0);
        {
            let entry = h.interests.values_mut().next().unwrap();
            entry.outstanding = 8;
        }
        // Past the stale horizon the estimate is meaningless; it resets
        // and the entry fires again.
        h.age_interests(t0 + STALE_AFTER + Duration::from_secs(1));
        assert_eq!(*count.borrow(), 2);
        let entry = h.interests.values().next().unwrap();
        assert_eq!(entry.outstanding, 0);
    }

    #[test]
    fn timeout_upcall_may_cancel_the_entry() {
        let mut h = Handle::new().unwrap();
        let name = name_from_uri("/probe");
        let key = name[1..name.len() - 1].to_vec();
        let action = handler(move |h: &mut Handle, kind: UpcallKind, _info: &UpcallInfo<'_>| {
            if kind == UpcallKind::InterestTimedOut {
                if let Some(entry) = h.interests.remove(&key) {
                    h.release_handler(Some(entry.action));
                }
            }
            UpcallResult::Consumed
        });
        h.express_interest(&name, action, None).unwrap();
        h.age_interests(Instant::now());
        assert!(h.interests.is_empty());
    }

    #[test]
    fn run_without_a_connection_reports_disconnected() {
        let mut h = Handle::new().unwrap();
        assert_eq!(h.run(Some(Duration::from_millis(1))), Err(Error::Disconnected));
    }
}
