//! Bridge kernel for calls between native code and a foreign runtime
//!
//! This module provides the pieces every crossing goes through. It separates:
//! - Primitive encoding and the argument slot layout (abi.rs)
//! - Handle lifetimes and the shared Global/Weak table (refs.rs, registry.rs)
//! - Entry bracketing and the per-thread capability (context.rs)
//! - Marshaled calls and method descriptors (call.rs, signature.rs)
//! - Pending-failure tracking in both directions (exception.rs)
//! - The host collaborator interface (host.rs)
//!
//! Native code never holds a raw host pointer; it holds a `ForeignHandle`
//! that is validated on every use.

pub mod abi;
pub mod abi_version;
pub mod call;
pub mod config;
pub mod context;
pub mod error;
pub mod exception;
pub mod host;
pub mod refs;
pub mod registry;
pub mod signature;
#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use abi::{MarshaledValue, Primitive, RawValue, ValueKind};
pub use abi_version::ABI_VERSION;
pub use config::BridgeConfig;
pub use context::{BoundaryContext, Bridge};
pub use error::{BridgeError, BridgeResult};
pub use exception::{FailureState, ForeignFailure};
pub use host::{Host, HostReturn};
pub use refs::{ForeignHandle, Lifetime, RawEnv, RawRef};
pub use registry::{ReferenceRegistry, RegistryStats};
pub use signature::{MethodDescriptor, Signature};
