// src/core/errors.rs

//! Defines the primary error type for the entire director.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum. Every failure in the director maps to exactly one
/// of these variants; only `Unrecoverable` may abort the process.
#[derive(Error, Debug)]
pub enum AmfError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    /// Caller-provided data is inconsistent or out of range. Surfaced to
    /// the caller (CCB abort, admin result INVALID-PARAM); no state mutated.
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    /// The target entity is in a state that forbids the operation.
    #[error("Bad operation: {0}")]
    BadOperation(String),

    /// The target is undergoing another operation; the caller may retry.
    #[error("Try again: {0}")]
    TryAgain(String),

    #[error("Object does not exist: {0}")]
    NotExist(String),

    /// A create collided with an existing object that is not
    /// attribute-identical to the request.
    #[error("Object already exists: {0}")]
    Exist(String),

    #[error("No resources: {0}")]
    NoResources(String),

    /// A downstream peer did not reply within the per-operation budget.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// A retryable bus-level failure.
    #[error("Transient bus error: {0}")]
    Transient(String),

    /// A partial admin-operation failure that requires repair before the
    /// target can be used again.
    #[error("Repair pending: {0}")]
    RepairPending(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Checkpoint decode error: {0}")]
    CodecError(String),

    #[error("Version mismatch: peer {peer} below minimum {minimum}")]
    VersionMismatch { peer: u16, minimum: u16 },

    /// A protocol invariant was violated. The supervisor restarts us.
    #[error("Unrecoverable: {0}")]
    Unrecoverable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AmfResult<T> = Result<T, AmfError>;

// Manual Clone because `std::io::Error` is not cloneable; the Arc makes
// sharing cheap.
impl Clone for AmfError {
    fn clone(&self) -> Self {
        match self {
            AmfError::Io(e) => AmfError::Io(Arc::clone(e)),
            AmfError::InvalidParam(s) => AmfError::InvalidParam(s.clone()),
            AmfError::BadOperation(s) => AmfError::BadOperation(s.clone()),
            AmfError::TryAgain(s) => AmfError::TryAgain(s.clone()),
            AmfError::NotExist(s) => AmfError::NotExist(s.clone()),
            AmfError::Exist(s) => AmfError::Exist(s.clone()),
            AmfError::NoResources(s) => AmfError::NoResources(s.clone()),
            AmfError::Timeout(s) => AmfError::Timeout(s.clone()),
            AmfError::Transient(s) => AmfError::Transient(s.clone()),
            AmfError::RepairPending(s) => AmfError::RepairPending(s.clone()),
            AmfError::NotSupported(s) => AmfError::NotSupported(s.clone()),
            AmfError::CodecError(s) => AmfError::CodecError(s.clone()),
            AmfError::VersionMismatch { peer, minimum } => AmfError::VersionMismatch {
                peer: *peer,
                minimum: *minimum,
            },
            AmfError::Unrecoverable(s) => AmfError::Unrecoverable(s.clone()),
            AmfError::Internal(s) => AmfError::Internal(s.clone()),
        }
    }
}

impl PartialEq for AmfError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AmfError::Io(e1), AmfError::Io(e2)) => e1.to_string() == e2.to_string(),
            (AmfError::InvalidParam(a), AmfError::InvalidParam(b)) => a == b,
            (AmfError::BadOperation(a), AmfError::BadOperation(b)) => a == b,
            (AmfError::TryAgain(a), AmfError::TryAgain(b)) => a == b,
            (AmfError::NotExist(a), AmfError::NotExist(b)) => a == b,
            (AmfError::Exist(a), AmfError::Exist(b)) => a == b,
            (AmfError::NoResources(a), AmfError::NoResources(b)) => a == b,
            (AmfError::Timeout(a), AmfError::Timeout(b)) => a == b,
            (AmfError::Transient(a), AmfError::Transient(b)) => a == b,
            (AmfError::RepairPending(a), AmfError::RepairPending(b)) => a == b,
            (AmfError::NotSupported(a), AmfError::NotSupported(b)) => a == b,
            (AmfError::CodecError(a), AmfError::CodecError(b)) => a == b,
            (
                AmfError::VersionMismatch { peer: p1, minimum: m1 },
                AmfError::VersionMismatch { peer: p2, minimum: m2 },
            ) => p1 == p2 && m1 == m2,
            (AmfError::Unrecoverable(a), AmfError::Unrecoverable(b)) => a == b,
            (AmfError::Internal(a), AmfError::Internal(b)) => a == b,
            _ => false,
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for AmfError {
    fn from(e: std::io::Error) -> Self {
        AmfError::Io(Arc::new(e))
    }
}

impl From<std::num::ParseIntError> for AmfError {
    fn from(e: std::num::ParseIntError) -> Self {
        AmfError::InvalidParam(format!("not an integer: {e}"))
    }
}

impl From<std::num::ParseFloatError> for AmfError {
    fn from(e: std::num::ParseFloatError) -> Self {
        AmfError::InvalidParam(format!("not a float: {e}"))
    }
}

impl From<std::str::Utf8Error> for AmfError {
    fn from(e: std::str::Utf8Error) -> Self {
        AmfError::CodecError(format!("invalid utf-8: {e}"))
    }
}

impl From<std::string::FromUtf8Error> for AmfError {
    fn from(e: std::string::FromUtf8Error) -> Self {
        AmfError::CodecError(format!("invalid utf-8: {e}"))
    }
}

impl From<bincode::error::EncodeError> for AmfError {
    fn from(e: bincode::error::EncodeError) -> Self {
        AmfError::CodecError(format!("encode: {e}"))
    }
}

impl From<bincode::error::DecodeError> for AmfError {
    fn from(e: bincode::error::DecodeError) -> Self {
        AmfError::CodecError(format!("decode: {e}"))
    }
}
