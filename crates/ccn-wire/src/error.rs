use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("element truncated")]
    Truncated,
    #[error("malformed token header")]
    BadHeader,
    #[error("unexpected element")]
    UnexpectedElement,
}
