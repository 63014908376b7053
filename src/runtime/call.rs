//! Call marshaler
//!
//! Turns a typed call on a [`BoundaryContext`] into one host crossing:
//! check gating state, check tags against the signature, resolve handles,
//! encode, invoke, then inspect the failure flag before trusting the return.

use tracing::debug;

use super::abi::{MarshaledValue, RawValue, ValueKind};
use super::context::BoundaryContext;
use super::error::{BridgeError, BridgeResult};
use super::host::Host;
use super::refs::{ForeignHandle, RawRef};
use super::signature::MethodDescriptor;

impl<H: Host> BoundaryContext<H> {
    /// Call `descriptor` on `receiver` (or statically when `None`).
    ///
    /// Returns the decoded result, or the first error encountered. A returned
    /// object becomes a fresh Local handle. If the host flags a failure the
    /// result is discarded, the failure becomes pending, and
    /// [`BridgeError::ForeignFailure`] is returned.
    pub fn call(
        &mut self,
        descriptor: &MethodDescriptor,
        receiver: Option<ForeignHandle>,
        args: &[MarshaledValue],
    ) -> BridgeResult<MarshaledValue> {
        self.require_entry()?;
        self.exceptions.ensure_clear()?;

        let encoded = self.encode_args(descriptor, args)?;
        let receiver_raw = match receiver {
            Some(handle) => self.resolve(&handle)?,
            None => RawRef::null(),
        };

        if self.config().trace_crossings {
            debug!(method = %descriptor, args = encoded.len(), "crossing");
        }
        let ret = self.host.invoke(self.env, descriptor, receiver_raw, &encoded);

        if ret.failed {
            let failure = self.host.describe_pending_failure(self.env);
            return Err(self.exceptions.record(failure));
        }
        self.decode_return(descriptor.parsed().return_kind(), ret.raw)
    }

    pub fn call_method(
        &mut self,
        receiver: ForeignHandle,
        descriptor: &MethodDescriptor,
        args: &[MarshaledValue],
    ) -> BridgeResult<MarshaledValue> {
        self.call(descriptor, Some(receiver), args)
    }

    pub fn call_static(
        &mut self,
        descriptor: &MethodDescriptor,
        args: &[MarshaledValue],
    ) -> BridgeResult<MarshaledValue> {
        self.call(descriptor, None, args)
    }

    fn encode_args(
        &self,
        descriptor: &MethodDescriptor,
        args: &[MarshaledValue],
    ) -> BridgeResult<Vec<RawValue>> {
        let params = descriptor.parsed().params();
        if params.len() != args.len() {
            return Err(BridgeError::SignatureMismatch {
                expected: format!("{} arguments", params.len()),
                got: format!("{} arguments", args.len()),
            });
        }
        if let Some((&expected, arg)) = params.iter().zip(args).find(|(k, a)| **k != a.kind()) {
            return Err(BridgeError::kind_mismatch(expected, arg.kind()));
        }

        let mut encoded = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            let raw = match arg {
                MarshaledValue::Object(handle) if handle.is_null() => RawValue::ZERO,
                MarshaledValue::Object(handle) => {
                    let raw = self
                        .resolve(handle)
                        .map_err(|_| BridgeError::InvalidArgumentHandle {
                            index,
                            handle: *handle,
                        })?;
                    RawValue::from_address(raw.as_usize())
                }
                other => other
                    .encode_primitive()
                    .ok_or_else(|| BridgeError::kind_mismatch(ValueKind::Object, other.kind()))?,
            };
            encoded.push(raw);
        }
        Ok(encoded)
    }

    fn decode_return(&mut self, kind: ValueKind, raw: RawValue) -> BridgeResult<MarshaledValue> {
        if kind == ValueKind::Object {
            let handle = self.acquire_local(RawRef::from_usize(raw.as_address()))?;
            return Ok(MarshaledValue::Object(handle));
        }
        MarshaledValue::decode_primitive(kind, raw)
            .ok_or_else(|| BridgeError::kind_mismatch(ValueKind::Object, kind))
    }
}
