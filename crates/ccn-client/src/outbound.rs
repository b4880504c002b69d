//! Deferred-write queue with partial-send resumption.

use std::io::{self, Write};

use crate::error::{Error, Result};

/// Whether bytes remain queued after a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendState {
    Flushed,
    Pending,
}

/// Outbound byte queue. Bytes `[0, index)` have already been handed to the
/// kernel; `flush` retries the suffix and compacts only once everything is
/// out, so queued messages always leave in FIFO order.
#[derive(Debug)]
pub(crate) struct OutBuf {
    buf: Vec<u8>,
    index: usize,
    limit: usize,
}

impl OutBuf {
    pub fn new(limit: usize) -> Self {
        Self { buf: Vec::new(), index: 0, limit }
    }

    pub fn set_limit(&mut self, limit: usize) {
        self.limit = limit;
    }

    pub fn is_pending(&self) -> bool {
        self.index < self.buf.len()
    }

    /// Queue `bytes` behind whatever is already waiting. Fails without
    /// queueing anything when the soft ceiling would be exceeded.
    pub fn enqueue(&mut self, bytes: &[u8]) -> Result<()> {
        if self.buf.len() - self.index + bytes.len() > self.limit {
            return Err(Error::OutputLimit);
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Write the unsent suffix until the kernel blocks or the queue
    /// drains. A write of zero means the peer is gone.
    pub fn flush(&mut self, w: &mut impl Write) -> Result<SendState> {
        while self.is_pending() {
            match w.write(&self.buf[self.index..]) {
                Ok(0) => return Err(Error::Disconnected),
                Ok(n) => self.index += n,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return Ok(SendState::Pending);
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.buf.clear();
        self.index = 0;
        Ok(SendState::Flushed)
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts up to `budget` bytes per flush call, then blocks.
    struct Throttled {
        taken: Vec<u8>,
        budget: usize,
        used: usize,
    }

    impl Throttled {
        fn new(budget: usize) -> Self {
            Self { taken: Vec::new(), budget, used: 0 }
        }

        fn refill(&mut self) {
            self.used = 0;
        }
    }

    impl Write for Throttled {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = self.budget - self.used;
            if room == 0 {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            let n = room.min(buf.len());
            self.taken.extend_from_slice(&buf[..n]);
            self.used += n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn empty_queue_flushes_trivially() {
        let mut q = OutBuf::new(64);
        let mut w = Throttled::new(8);
        assert_eq!(q.flush(&mut w).unwrap(), SendState::Flushed);
        assert!(w.taken.is_empty());
    }

    #[test]
    fn partial_writes_resume_where_they_stopped() {
        let mut q = OutBuf::new(64);
        q.enqueue(b"abcdefghij").unwrap();
        let mut w = Throttled::new(4);

        assert_eq!(q.flush(&mut w).unwrap(), SendState::Pending);
        assert_eq!(w.taken, b"abcd");
        assert!(q.is_pending());

        w.refill();
        assert_eq!(q.flush(&mut w).unwrap(), SendState::Pending);
        w.refill();
        assert_eq!(q.flush(&mut w).unwrap(), SendState::Flushed);
        assert_eq!(w.taken, b"abcdefghij");
        assert!(!q.is_pending());
    }

    #[test]
    fn fifo_across_enqueues() {
        let mut q = OutBuf::new(64);
        q.enqueue(b"one").unwrap();
        q.enqueue(b"two").unwrap();
        let mut w = Throttled::new(64);
        assert_eq!(q.flush(&mut w).unwrap(), SendState::Flushed);
        assert_eq!(w.taken, b"onetwo");
    }

    #[test]
    fn ceiling_rejects_without_queueing() {
        let mut q = OutBuf::new(8);
        q.enqueue(b"12345678").unwrap();
        assert_eq!(q.enqueue(b"x"), Err(Error::OutputLimit));
        let mut w = Throttled::new(64);
        q.flush(&mut w).unwrap();
        assert_eq!(w.taken, b"12345678");
    }

    #[test]
    fn dead_peer_is_an_error() {
        struct Dead;
        impl Write for Dead {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let mut q = OutBuf::new(8);
        q.enqueue(b"x").unwrap();
        assert_eq!(q.flush(&mut Dead), Err(Error::Disconnected));
    }
}
