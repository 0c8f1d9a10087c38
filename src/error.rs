//! Library-wide error and result types.

use std::fmt;

/// Result alias used throughout pvukit.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Error messages are kept intentionally terse; callers that need richer
/// context should wrap `Error` in their own type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The message is too short, a nano length is malformed, the main CW
    /// nano is absent, or a hash mode is not implemented.
    NotSupported,
    /// The ECM tail CRC-32 did not match the message body.
    ChecksumMismatch,
    /// Every candidate key in the store was tried and rejected.
    KeyNotFound,
    /// A structural constraint was violated (message describes which one).
    Parse(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotSupported => write!(f, "message not supported"),
            Error::ChecksumMismatch => write!(f, "checksum mismatch"),
            Error::KeyNotFound => write!(f, "no matching key"),
            Error::Parse(s) => write!(f, "parse error: {s}"),
        }
    }
}

impl std::error::Error for Error {}
