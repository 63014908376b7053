//! In-process simulated host
//!
//! [`SimulatedHost`] implements [`Host`] with scripted per-method behaviour
//! and records everything that crosses it, so bridge behaviour can be tested
//! without a real foreign runtime.

use std::collections::HashMap;

use super::abi::RawValue;
use super::exception::ForeignFailure;
use super::host::{Host, HostReturn};
use super::refs::{RawEnv, RawRef};
use super::signature::MethodDescriptor;

/// What a scripted method does when invoked.
#[derive(Debug, Clone, PartialEq)]
pub enum SimOutcome {
    Return(RawValue),
    ReturnObject(RawRef),
    /// Fail, returning `raw` as the host's default value alongside the flag.
    Throw { failure: ForeignFailure, raw: RawValue },
}

type Handler = Box<dyn FnMut(RawRef, &[RawValue]) -> SimOutcome>;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: String,
    pub receiver: RawRef,
    pub args: Vec<RawValue>,
}

/// First address handed out by [`SimulatedHost::alloc_object`].
const OBJECT_BASE: usize = 0x1000;
const OBJECT_ALIGN: usize = 16;

pub struct SimulatedHost {
    handlers: HashMap<String, Handler>,
    pending: Option<ForeignFailure>,
    calls: Vec<RecordedCall>,
    thrown: Vec<ForeignFailure>,
    calls_while_pending: usize,
    next_addr: usize,
}

impl Default for SimulatedHost {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            pending: None,
            calls: Vec::new(),
            thrown: Vec::new(),
            calls_while_pending: 0,
            next_addr: OBJECT_BASE,
        }
    }

    /// Script the method called `name` (any class, any signature).
    pub fn on<F>(&mut self, name: &str, handler: F)
    where
        F: FnMut(RawRef, &[RawValue]) -> SimOutcome + 'static,
    {
        self.handlers.insert(name.to_string(), Box::new(handler));
    }

    pub fn returning(&mut self, name: &str, raw: RawValue) {
        self.on(name, move |_, _| SimOutcome::Return(raw));
    }

    pub fn throwing(&mut self, name: &str, kind: &str, message: &str, raw: RawValue) {
        let failure = ForeignFailure::new(kind, message);
        self.on(name, move |_, _| SimOutcome::Throw {
            failure: failure.clone(),
            raw,
        });
    }

    /// A fresh, distinct object address. Never dereferenced.
    pub fn alloc_object(&mut self) -> RawRef {
        let addr = self.next_addr;
        self.next_addr += OBJECT_ALIGN;
        RawRef::from_usize(addr)
    }

    pub fn calls(&self) -> &[RecordedCall] {
        &self.calls
    }

    /// Failures delivered with `throw_new`, oldest first.
    pub fn thrown(&self) -> &[ForeignFailure] {
        &self.thrown
    }

    /// The failure pending on the host side.
    pub fn host_pending(&self) -> Option<&ForeignFailure> {
        self.pending.as_ref()
    }

    /// Calls that arrived while a failure was pending. A correct bridge
    /// keeps this at zero.
    pub fn calls_while_pending(&self) -> usize {
        self.calls_while_pending
    }
}

impl Host for SimulatedHost {
    fn invoke(
        &mut self,
        _env: RawEnv,
        descriptor: &MethodDescriptor,
        receiver: RawRef,
        args: &[RawValue],
    ) -> HostReturn {
        if self.pending.is_some() {
            self.calls_while_pending += 1;
        }
        self.calls.push(RecordedCall {
            method: descriptor.to_string(),
            receiver,
            args: args.to_vec(),
        });

        let Some(handler) = self.handlers.get_mut(descriptor.name()) else {
            self.pending = Some(ForeignFailure::new(
                "java/lang/NoSuchMethodError",
                descriptor.to_string(),
            ));
            return HostReturn::failure(RawValue::ZERO);
        };
        match handler(receiver, args) {
            SimOutcome::Return(raw) => HostReturn::value(raw),
            SimOutcome::ReturnObject(obj) => HostReturn::value(RawValue::from_address(obj.as_usize())),
            SimOutcome::Throw { failure, raw } => {
                self.pending = Some(failure);
                HostReturn::failure(raw)
            }
        }
    }

    fn describe_pending_failure(&mut self, _env: RawEnv) -> ForeignFailure {
        self.pending.clone().unwrap_or_else(|| {
            ForeignFailure::new("java/lang/IllegalStateException", "no pending failure")
        })
    }

    fn clear_pending_failure(&mut self, _env: RawEnv) {
        self.pending = None;
    }

    fn throw_new(&mut self, _env: RawEnv, failure: &ForeignFailure) {
        self.pending = Some(failure.clone());
        self.thrown.push(failure.clone());
    }
}
