use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong on a handle. IO failures keep the raw OS
/// errno so callers bridging to other tooling can still see it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid argument")]
    InvalidArg,
    #[error("not connected")]
    NotConnected,
    #[error("connection closed")]
    Disconnected,
    #[error("output queue limit exceeded")]
    OutputLimit,
    #[error("malformed inbound stream")]
    Protocol,
    #[error("io error: {kind:?}")]
    Io { kind: io::ErrorKind, raw: Option<i32> },
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::NotConnected {
            Self::NotConnected
        } else {
            Self::Io { kind: e.kind(), raw: e.raw_os_error() }
        }
    }
}
