// We want a few things here:
// 1. A way to create a new error with a backtrace
// 2. A way to centralize setting a breakpoint to trap any error in the system fairly soon
//    after it's created (or at least when it's propagated from a library we use back to us)
// 3. Same but for logging / emitting error messages into the tracing/logging system
// 4. Distinguishable error kinds so callers can match on what went wrong instead of
//    sniffing a message string.

use std::borrow::Cow;
use std::fmt;

use backtrace_error::DynBacktraceError;
use thiserror::Error as ThisError;
use tracing::error;

#[cfg(test)]
use test_log::test;

/// The kind of failure that occurred, independent of its message. Matched on by
/// callers that need to decide *what to do* (retry, return 409, abort).
#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    #[error("validation")]
    Validation,
    #[error("transport")]
    Transport,
    #[error("capacity")]
    Capacity,
    #[error("conflict")]
    Conflict,
    #[error("not found")]
    NotFound,
    #[error("fatal")]
    Fatal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    inner: DynBacktraceError,
}

pub type Result<T> = std::result::Result<T, Error>;

struct SimpleErr(Cow<'static, str>);
impl fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}
impl std::error::Error for Error {}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(kind: Kind, err: E) -> Error {
        error!(target: "metric_store", kind = ?kind, "{:?}", err);
        Error {
            kind,
            inner: DynBacktraceError::from(err),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == Kind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == Kind::Conflict
    }
}

/// Construct a validation error from a message. The most common error
/// constructor in the codebase: bad matchers, non-finite values, malformed ids.
pub fn validation(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(Kind::Validation, SimpleErr(msg.into()))
}

pub fn transport(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(Kind::Transport, SimpleErr(msg.into()))
}

pub fn capacity(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(Kind::Capacity, SimpleErr(msg.into()))
}

pub fn conflict(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(Kind::Conflict, SimpleErr(msg.into()))
}

pub fn not_found(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(Kind::NotFound, SimpleErr(msg.into()))
}

pub fn fatal(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(Kind::Fatal, SimpleErr(msg.into()))
}

/// Generic constructor kept for call sites that don't carry a more specific
/// kind; defaults to `Transport` since that's almost always "something
/// external misbehaved" (I/O, codec) at the seams where this gets used.
pub fn err(msg: impl Into<Cow<'static, str>>) -> Error {
    transport(msg)
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::new(Kind::Transport, err)
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Error {
        Error::new(Kind::Transport, err)
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Error {
        Error::new(Kind::Transport, err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Error {
        Error::new(Kind::Validation, err)
    }
}

#[test]
fn test_error_kinds() {
    let e = validation("bad matcher");
    assert_eq!(e.kind(), Kind::Validation);
    assert!(!e.is_conflict());

    let e = conflict("manager exists");
    assert!(e.is_conflict());

    let e = not_found("manager missing");
    assert!(e.is_not_found());
}
