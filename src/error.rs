//! Domain status codes (§3, §7).
//!
//! Every fallible operation in the library core returns exactly one of
//! these, never a raw I/O or parse error — that keeps family-specific
//! device/parser code uniform and lets callers match on a closed set.

use thiserror::Error;

/// Tagged status returned by every fallible library operation.
///
/// `Protocol` means the peer spoke but violated framing/CRC/echo rules.
/// `DataFormat` means a parsed blob violates its schema. `Io` is
/// transport-level (syscall failure, broken pipe, etc).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Status {
    #[error("unsupported operation")]
    Unsupported,
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("out of memory")]
    NoMemory,
    #[error("no device")]
    NoDevice,
    #[error("no access")]
    NoAccess,
    #[error("I/O error: {0}")]
    Io(String),
    #[error("timeout")]
    Timeout,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("data format error: {0}")]
    DataFormat(String),
    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = core::result::Result<T, Status>;

impl Status {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Status::Protocol(msg.into())
    }

    pub fn data_format(msg: impl Into<String>) -> Self {
        Status::DataFormat(msg.into())
    }

    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Status::InvalidArgs(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Status::Io(msg.into())
    }
}

impl From<std::io::Error> for Status {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::TimedOut {
            Status::Timeout
        } else {
            Status::Io(err.to_string())
        }
    }
}
