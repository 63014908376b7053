//! ABI version constants
//!
//! Bump `ABI_VERSION` whenever the `RawValue` slot layout, the boolean
//! encoding, or the `Host` calling convention changes.

pub const ABI_VERSION: u32 = 1;

pub const ABI_NAME: &str = "vmbridge";
