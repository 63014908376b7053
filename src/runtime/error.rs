//! Bridge error definitions.
//!
//! Every failure crossing the boundary surfaces as a [`BridgeError`]. Only
//! [`BridgeError::ForeignFailure`] is expected during normal operation; the
//! remaining variants are native-side programming errors.

use thiserror::Error;

use super::abi::ValueKind;
use super::refs::{ForeignHandle, Lifetime};

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// The handle is null where an object is required, was invalidated, or
    /// belongs to another registry or context.
    #[error("invalid handle {0:?}")]
    InvalidHandle(ForeignHandle),

    /// A handle passed as a call argument failed validation.
    #[error("argument {index} is an invalid handle {handle:?}")]
    InvalidArgumentHandle { index: usize, handle: ForeignHandle },

    #[error("handle {0:?} was already released")]
    DoubleRelease(ForeignHandle),

    #[error("cannot promote {from} handle to {to} without re-validating liveness")]
    UnsupportedPromotion { from: Lifetime, to: Lifetime },

    #[error("{0} handles are not released explicitly")]
    NotReleasable(Lifetime),

    /// A crossing call was attempted while a foreign failure is unacknowledged.
    #[error("a foreign failure is pending; acknowledge it before crossing again")]
    ReentrantPendingFailure,

    /// The translated foreign-side exception.
    #[error("foreign failure {kind}: {message}")]
    ForeignFailure { kind: String, message: String },

    #[error("operation requires an active entry")]
    NotInEntry,

    #[error("no local frame to pop")]
    NoLocalFrame,

    #[error("signature mismatch: expected {expected}, got {got}")]
    SignatureMismatch { expected: String, got: String },

    #[error("invalid signature {signature:?}: {reason}")]
    InvalidSignature { signature: String, reason: String },

    #[error("{lifetime} reference table full ({limit} entries)")]
    ReferenceTableFull { lifetime: Lifetime, limit: usize },

    #[error("invalid bridge configuration: {0}")]
    Config(String),
}

impl BridgeError {
    /// True for the translated foreign-side exception, false for programming
    /// errors on the native side.
    pub fn is_foreign(&self) -> bool {
        matches!(self, BridgeError::ForeignFailure { .. })
    }

    pub(crate) fn kind_mismatch(expected: ValueKind, got: ValueKind) -> Self {
        BridgeError::SignatureMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }

    pub(crate) fn invalid_signature(signature: &str, reason: impl Into<String>) -> Self {
        BridgeError::InvalidSignature {
            signature: signature.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Config(err.to_string())
    }
}
