//! User callbacks and their reference-counting discipline.
//!
//! Callback slots (handle defaults, filter actions, expressed-Interest
//! actions) share handlers through [`HandlerRef`]. The `Rc` strong count
//! *is* the handler's reference count: the number of owning slots plus any
//! transient dispatch references. Whoever drops the last reference invokes
//! the handler once with [`UpcallKind::Final`] first (see
//! `Handle::release_handler`), so a handler gets exactly one `Final` per
//! logical lifetime and can still observe the handle while cleaning up.

use std::cell::RefCell;
use std::rc::Rc;

use crate::handle::Handle;

/// Why the library is calling up into user code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpcallKind {
    /// Last reference to the handler released; final chance to clean up.
    Final,
    /// An Interest arrived matching a registered filter.
    Interest,
    /// Same, but a deeper filter already accepted responsibility.
    ConsumedInterest,
    /// A ContentObject arrived matching an expressed Interest.
    Content,
    /// An expressed Interest went a full half-life without content.
    InterestTimedOut,
}

/// What the callback tells the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpcallResult {
    /// Not interested; for filters, do not mark the Interest consumed; for
    /// content, keep the entry.
    Decline,
    /// Handled.
    Consumed,
    /// Handled, and the matched Interest should be re-issued.
    Reexpress,
}

/// Context handed to every upcall. Offsets index into `message`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UpcallInfo<'a> {
    /// The complete wire message; empty for `Final` and
    /// `InterestTimedOut`.
    pub message: &'a [u8],
    /// Component start offsets plus a final offset at the name close.
    pub components: &'a [usize],
    /// Component depth at which the table key matched.
    pub matched: usize,
}

pub trait Handler {
    fn upcall(
        &mut self,
        handle: &mut Handle,
        kind: UpcallKind,
        info: &UpcallInfo<'_>,
    ) -> UpcallResult;
}

impl<F> Handler for F
where
    F: FnMut(&mut Handle, UpcallKind, &UpcallInfo<'_>) -> UpcallResult,
{
    fn upcall(
        &mut self,
        handle: &mut Handle,
        kind: UpcallKind,
        info: &UpcallInfo<'_>,
    ) -> UpcallResult {
        self(handle, kind, info)
    }
}

/// Shared, interiorly mutable handler reference.
pub type HandlerRef = Rc<RefCell<dyn Handler>>;

/// Wrap a handler (or a plain closure) for registration.
pub fn handler(h: impl Handler + 'static) -> HandlerRef {
    Rc::new(RefCell::new(h))
}

pub(crate) fn same_handler(a: Option<&HandlerRef>, b: Option<&HandlerRef>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => Rc::ptr_eq(x, y),
        (None, None) => true,
        _ => false,
    }
}
