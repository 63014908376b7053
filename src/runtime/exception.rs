//! Exception bridge
//!
//! Tracks the foreign runtime's pending-failure state for one entry of a context.
//!
//! Inbound: after a failed crossing call the marshaler records the failure
//! (`Clear -> Pending`). Until [`ExceptionBridge::acknowledge`] clears it, no
//! further crossing call is allowed.
//!
//! Outbound: when native code implements a callback invoked from foreign code,
//! [`ExceptionBridge::raise`] queues a failure that the context hands to the
//! host as the callback returns.

use tracing::debug;

use super::error::{BridgeError, BridgeResult};

/// Kind and message of a foreign-side exception.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignFailure {
    pub kind: String,
    pub message: String,
}

impl ForeignFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<ForeignFailure> for BridgeError {
    fn from(failure: ForeignFailure) -> Self {
        BridgeError::ForeignFailure {
            kind: failure.kind,
            message: failure.message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FailureState {
    #[default]
    Clear,
    Pending(ForeignFailure),
}

#[derive(Debug, Default)]
pub struct ExceptionBridge {
    state: FailureState,
    outgoing: Option<ForeignFailure>,
}

impl ExceptionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &FailureState {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, FailureState::Pending(_))
    }

    /// Inspect the pending failure without clearing it.
    pub fn pending(&self) -> Option<&ForeignFailure> {
        match &self.state {
            FailureState::Pending(failure) => Some(failure),
            FailureState::Clear => None,
        }
    }

    /// Gate for every crossing call.
    pub fn ensure_clear(&self) -> BridgeResult<()> {
        if self.is_pending() {
            return Err(BridgeError::ReentrantPendingFailure);
        }
        Ok(())
    }

    /// Record a failure detected after a crossing call and return it as the
    /// call's error.
    pub(crate) fn record(&mut self, failure: ForeignFailure) -> BridgeError {
        debug!(kind = %failure.kind, message = %failure.message, "foreign failure pending");
        let err = BridgeError::from(failure.clone());
        self.state = FailureState::Pending(failure);
        err
    }

    /// `Pending -> Clear`, returning the recorded failure. The caller clears
    /// the host side.
    pub(crate) fn take(&mut self) -> Option<ForeignFailure> {
        match std::mem::take(&mut self.state) {
            FailureState::Pending(failure) => Some(failure),
            FailureState::Clear => None,
        }
    }

    /// Queue a failure for the foreign caller. A later raise replaces an
    /// earlier one, as only one exception can be thrown.
    pub fn raise(&mut self, failure: ForeignFailure) {
        debug!(kind = %failure.kind, "native failure raised for foreign caller");
        self.outgoing = Some(failure);
    }

    pub fn outgoing(&self) -> Option<&ForeignFailure> {
        self.outgoing.as_ref()
    }

    pub(crate) fn take_outgoing(&mut self) -> Option<ForeignFailure> {
        self.outgoing.take()
    }
}
