//! Safe bridge between native Rust code and a managed foreign runtime
//!
//! Native code attaches a `BoundaryContext` per thread, brackets each
//! host-initiated entry with `enter`/`exit`, and crosses into the foreign
//! runtime through marshaled calls. References are opaque `ForeignHandle`s
//! checked against a registry; foreign exceptions come back as
//! `BridgeError::ForeignFailure`.

pub mod runtime;

pub use runtime::*;

#[cfg(test)]
mod tests;
