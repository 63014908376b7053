//! The host runtime collaborator
//!
//! Everything the bridge needs from the foreign runtime goes through
//! [`Host`]. An implementation wraps the runtime's real native interface;
//! [`sim::SimulatedHost`](super::sim::SimulatedHost) scripts one in process.
//!
//! The calling convention is:
//! - Arguments and returns are [`RawValue`] slots (see `abi`)
//! - References are raw host pointers; null means "no object"
//! - Failure is reported by flag, never by return value

use super::abi::RawValue;
use super::exception::ForeignFailure;
use super::refs::{RawEnv, RawRef};
use super::signature::MethodDescriptor;

/// Outcome of one crossing call as reported by the host.
///
/// When `failed` is set, `raw` is whatever default the host returned and
/// must not be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostReturn {
    pub raw: RawValue,
    pub failed: bool,
}

impl HostReturn {
    pub fn value(raw: RawValue) -> Self {
        Self { raw, failed: false }
    }

    pub fn failure(raw: RawValue) -> Self {
        Self { raw, failed: true }
    }
}

pub trait Host {
    /// Perform a crossing call. `receiver` is null for static targets.
    fn invoke(
        &mut self,
        env: RawEnv,
        descriptor: &MethodDescriptor,
        receiver: RawRef,
        args: &[RawValue],
    ) -> HostReturn;

    /// Kind and message of the failure currently pending in the host.
    fn describe_pending_failure(&mut self, env: RawEnv) -> ForeignFailure;

    fn clear_pending_failure(&mut self, env: RawEnv);

    /// Make `failure` pending on the foreign side, to be thrown when control
    /// returns to foreign code.
    fn throw_new(&mut self, env: RawEnv, failure: &ForeignFailure);
}
