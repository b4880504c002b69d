//! Client endpoint of a content-centric network.
//!
//! A [`Handle`] owns one connection to the local daemon over a Unix stream
//! socket. Through it an application expresses named Interests
//! ([`Handle::express_interest`]), receives matching ContentObjects, and
//! serves inbound Interests under registered prefixes
//! ([`Handle::set_interest_filter`]). [`Handle::run`] is the single-threaded
//! event loop driving I/O, dispatch, and Interest re-expression; callers
//! needing several connections run several handles, each on its own loop.
//!
//! Inbound messages are routed by longest prefix: the deepest registered
//! match is called first, and for Interests shallower filters then see
//! [`UpcallKind::ConsumedInterest`] once any deeper handler has accepted
//! responsibility. Handlers may mutate the handle freely from inside an
//! upcall, including cancelling or replacing the entry that matched.

mod config;
mod dispatch;
mod error;
mod handle;
mod outbound;
mod run;
mod upcall;

pub use config::{DEBUG_ENV, DEFAULT_SOCK, LOCAL_PORT_ENV, TAP_ENV};
pub use error::{Error, Result};
pub use handle::Handle;
pub use outbound::SendState;
pub use upcall::{Handler, HandlerRef, UpcallInfo, UpcallKind, UpcallResult, handler};
