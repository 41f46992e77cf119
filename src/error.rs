//! Crate-wide error type.
//!
//! Mirrors the error kinds laid out for this system: configuration, I/O,
//! malformed data, store failures, and geometry invariant violations. The
//! last of these is a programmer error and is expected to be unreachable
//! for well-formed inputs; everything else is recoverable somewhere in the
//! pipeline.

use std::fmt;

/// All the ways an operation in this crate can fail.
#[derive(Debug)]
pub enum SatFireError {
    /// A required environment variable or command line flag was missing.
    ConfigMissing(String),
    /// A filesystem or file-open failure.
    Io(std::io::Error),
    /// A malformed pixel binary blob or an unreadable scan file.
    BadFormat(String),
    /// A store (database) query or insert failure.
    Store(String),
    /// A geometry degeneracy that should be unreachable for well-formed
    /// inputs, e.g. parallel diagonals when computing a pixel centroid.
    InvariantViolation(String),
    /// Anything else, usually a wrapped third-party error.
    Other(String),
}

impl fmt::Display for SatFireError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SatFireError::ConfigMissing(msg) => write!(f, "missing configuration: {}", msg),
            SatFireError::Io(err) => write!(f, "I/O error: {}", err),
            SatFireError::BadFormat(msg) => write!(f, "bad format: {}", msg),
            SatFireError::Store(msg) => write!(f, "store error: {}", msg),
            SatFireError::InvariantViolation(msg) => {
                write!(f, "invariant violation: {}", msg)
            }
            SatFireError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SatFireError {}

impl From<std::io::Error> for SatFireError {
    fn from(err: std::io::Error) -> Self {
        SatFireError::Io(err)
    }
}

impl From<rusqlite::Error> for SatFireError {
    fn from(err: rusqlite::Error) -> Self {
        SatFireError::Store(err.to_string())
    }
}

impl From<chrono::ParseError> for SatFireError {
    fn from(err: chrono::ParseError) -> Self {
        SatFireError::BadFormat(err.to_string())
    }
}

impl From<zip::result::ZipError> for SatFireError {
    fn from(err: zip::result::ZipError) -> Self {
        SatFireError::Io(std::io::Error::new(std::io::ErrorKind::Other, err))
    }
}

impl From<log::SetLoggerError> for SatFireError {
    fn from(err: log::SetLoggerError) -> Self {
        SatFireError::Other(err.to_string())
    }
}

impl From<std::num::ParseFloatError> for SatFireError {
    fn from(err: std::num::ParseFloatError) -> Self {
        SatFireError::BadFormat(err.to_string())
    }
}

impl From<std::fmt::Error> for SatFireError {
    fn from(err: std::fmt::Error) -> Self {
        SatFireError::Other(err.to_string())
    }
}

impl From<String> for SatFireError {
    fn from(msg: String) -> Self {
        SatFireError::Other(msg)
    }
}

impl From<&str> for SatFireError {
    fn from(msg: &str) -> Self {
        SatFireError::Other(msg.to_owned())
    }
}

impl<T> From<crossbeam_channel::SendError<T>> for SatFireError {
    fn from(err: crossbeam_channel::SendError<T>) -> Self {
        SatFireError::Other(format!("channel closed: {}", err))
    }
}

impl From<crossbeam_channel::RecvError> for SatFireError {
    fn from(err: crossbeam_channel::RecvError) -> Self {
        SatFireError::Other(format!("channel closed: {}", err))
    }
}

impl From<std::num::TryFromIntError> for SatFireError {
    fn from(err: std::num::TryFromIntError) -> Self {
        SatFireError::BadFormat(err.to_string())
    }
}
