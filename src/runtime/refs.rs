//! Raw host pointers and the opaque handles native code holds instead.
//!
//! [`RawRef`] and [`RawEnv`] wrap pointers owned by the host runtime. Native
//! code never sees a `RawRef`; it holds a [`ForeignHandle`], an identifier
//! into a registry table that is checked on every use.

use std::fmt;

use libc::c_void;

/// A raw reference to a host-managed object.
///
/// This is a wrapper around a raw pointer that:
/// - Is never dereferenced on the native side
/// - Converts to/from usize for slot encoding
/// - Compares by address (referent identity)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawRef {
    ptr: *mut c_void,
}

impl RawRef {
    #[inline]
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self { ptr }
    }

    #[inline]
    pub fn from_usize(addr: usize) -> Self {
        Self {
            ptr: addr as *mut c_void,
        }
    }

    #[inline]
    pub fn as_ptr(self) -> *mut c_void {
        self.ptr
    }

    #[inline]
    pub fn as_usize(self) -> usize {
        self.ptr as usize
    }

    #[inline]
    pub const fn null() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
        }
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.ptr.is_null()
    }
}

// SAFETY: a RawRef is only an identity for a host object. Native code never
// dereferences it, and host references in the Global/Weak table are valid on
// any attached thread.
unsafe impl Send for RawRef {}
unsafe impl Sync for RawRef {}

impl fmt::Debug for RawRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawRef({:p})", self.ptr)
    }
}

impl fmt::Pointer for RawRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.ptr, f)
    }
}

/// The host's per-thread environment pointer, passed back on every host call.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct RawEnv {
    ptr: *mut c_void,
}

impl RawEnv {
    #[inline]
    pub fn from_ptr(ptr: *mut c_void) -> Self {
        Self { ptr }
    }

    #[inline]
    pub fn as_ptr(self) -> *mut c_void {
        self.ptr
    }

    #[inline]
    pub const fn null() -> Self {
        Self {
            ptr: std::ptr::null_mut(),
        }
    }
}

impl fmt::Debug for RawEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawEnv({:p})", self.ptr)
    }
}

// =========================================================================
// Handles
// =========================================================================

/// Lifetime class of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// Valid until the entry (or local frame) that created it ends.
    Local,
    /// Valid until released; keeps the referent alive.
    Global,
    /// Valid until released; does not keep the referent alive.
    Weak,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Local => write!(f, "local"),
            Lifetime::Global => write!(f, "global"),
            Lifetime::Weak => write!(f, "weak"),
        }
    }
}

/// An opaque identifier for a host object.
///
/// `owner` is the id of the registry (Global/Weak) or context (Local) that
/// issued it. For Local handles `scope` is the serial of the local frame;
/// for Global/Weak it is zero. `generation` detects reuse of `slot`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForeignHandle {
    lifetime: Lifetime,
    owner: u32,
    scope: u32,
    slot: u32,
    generation: u32,
}

impl ForeignHandle {
    /// The handle of a null foreign reference. Owner id 0 is never issued.
    pub const NULL: ForeignHandle = ForeignHandle {
        lifetime: Lifetime::Local,
        owner: 0,
        scope: 0,
        slot: 0,
        generation: 0,
    };

    pub(crate) fn new(lifetime: Lifetime, owner: u32, scope: u32, slot: u32, generation: u32) -> Self {
        Self {
            lifetime,
            owner,
            scope,
            slot,
            generation,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.owner == 0
    }

    #[inline]
    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    pub(crate) fn owner(&self) -> u32 {
        self.owner
    }

    pub(crate) fn scope(&self) -> u32 {
        self.scope
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot as usize
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }
}

impl Default for ForeignHandle {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for ForeignHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            return write!(f, "ForeignHandle(null)");
        }
        match self.lifetime {
            Lifetime::Local => write!(
                f,
                "ForeignHandle(local #{}/{}:{}@{})",
                self.owner, self.scope, self.slot, self.generation
            ),
            lifetime => write!(
                f,
                "ForeignHandle({} #{}:{}@{})",
                lifetime, self.owner, self.slot, self.generation
            ),
        }
    }
}
