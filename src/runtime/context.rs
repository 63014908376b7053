//! Boundary contexts
//!
//! A [`BoundaryContext`] is the capability every bridge operation requires.
//! It is bound to the thread that attached it (`!Send`) and is usable only
//! inside an entry, bracketed by [`enter`](BoundaryContext::enter) and
//! [`exit`](BoundaryContext::exit). The host gives no notification when its
//! own reference frame ends, so the embedding layer must bracket every
//! host-initiated call; `exit` is where Local handles are invalidated.

use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::config::BridgeConfig;
use super::error::{BridgeError, BridgeResult};
use super::exception::{ExceptionBridge, ForeignFailure};
use super::host::Host;
use super::refs::{ForeignHandle, Lifetime, RawEnv, RawRef};
use super::registry::{FrameKind, LocalFrames, ReferenceRegistry};

/// Owner of the shared reference registry; hands out contexts.
#[derive(Clone)]
pub struct Bridge {
    registry: Arc<ReferenceRegistry>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self {
            registry: Arc::new(ReferenceRegistry::default()),
        }
    }
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> BridgeResult<Self> {
        config.validate()?;
        Ok(Self {
            registry: Arc::new(ReferenceRegistry::new(config)),
        })
    }

    pub fn registry(&self) -> &Arc<ReferenceRegistry> {
        &self.registry
    }

    /// Bind a context to the calling thread using the host's environment.
    pub fn attach<H: Host>(&self, host: H, env: RawEnv) -> BoundaryContext<H> {
        BoundaryContext {
            registry: Arc::clone(&self.registry),
            host,
            env,
            locals: LocalFrames::new(),
            entries: 0,
            exceptions: ExceptionBridge::new(),
            suspended: Vec::new(),
            _not_send: PhantomData,
        }
    }
}

pub struct BoundaryContext<H: Host> {
    registry: Arc<ReferenceRegistry>,
    pub(crate) host: H,
    pub(crate) env: RawEnv,
    locals: LocalFrames,
    entries: usize,
    pub(crate) exceptions: ExceptionBridge,
    /// Failure state of each enclosing entry, restored when the nested one exits.
    suspended: Vec<ExceptionBridge>,
    _not_send: PhantomData<*const ()>,
}

impl<H: Host> BoundaryContext<H> {
    pub fn registry(&self) -> &ReferenceRegistry {
        &self.registry
    }

    pub(crate) fn config(&self) -> &BridgeConfig {
        self.registry.config()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn env(&self) -> RawEnv {
        self.env
    }

    // =========================================================================
    // Entries
    // =========================================================================

    /// Begin a host-initiated entry. Entries nest; each one starts with a
    /// clear failure state of its own.
    pub fn enter(&mut self) {
        self.entries += 1;
        self.suspended.push(std::mem::take(&mut self.exceptions));
        let capacity = self.config().local_frame_capacity;
        self.locals.push(FrameKind::Entry, capacity);
        debug!(depth = self.entries, frames = self.locals.depth(), "entry begin");
    }

    /// End the innermost entry.
    ///
    /// Invalidates every Local created during it, including those in local
    /// frames left unpopped, and returns how many were invalidated. A failure
    /// raised during this entry is handed to the host here; the enclosing
    /// entry's failure state is then restored.
    pub fn exit(&mut self) -> BridgeResult<usize> {
        if self.entries == 0 {
            return Err(BridgeError::NotInEntry);
        }

        let mut invalidated = 0;
        while let Some(frame) = self.locals.pop() {
            invalidated += frame.live();
            if frame.kind() == FrameKind::Entry {
                break;
            }
            warn!("local frame still open at entry exit");
        }
        self.entries -= 1;

        if let Some(failure) = self.exceptions.take() {
            // Unacknowledged failures propagate to the foreign caller.
            debug!(kind = %failure.kind, "pending failure propagates to caller");
        }
        if let Some(failure) = self.exceptions.take_outgoing() {
            self.host.clear_pending_failure(self.env);
            self.host.throw_new(self.env, &failure);
        }
        self.exceptions = self.suspended.pop().unwrap_or_default();

        debug!(depth = self.entries, invalidated, "entry end");
        Ok(invalidated)
    }

    /// Run `f` inside an entry.
    pub fn with_entry<T>(&mut self, f: impl FnOnce(&mut Self) -> BridgeResult<T>) -> BridgeResult<T> {
        self.enter();
        let result = f(self);
        self.exit()?;
        result
    }

    pub fn in_entry(&self) -> bool {
        self.entries > 0
    }

    pub(crate) fn require_entry(&self) -> BridgeResult<()> {
        if self.entries == 0 {
            return Err(BridgeError::NotInEntry);
        }
        Ok(())
    }

    // =========================================================================
    // References
    // =========================================================================

    /// Wrap a raw reference returned by the host as a Local handle.
    pub fn acquire_local(&mut self, raw: RawRef) -> BridgeResult<ForeignHandle> {
        self.require_entry()?;
        let handle = self.locals.acquire(raw)?;
        trace!(?handle, "local acquired");
        Ok(handle)
    }

    /// Create a handle of `target` lifetime referring to the same object.
    ///
    /// Weak handles cannot become Global directly: promote to Local first,
    /// which yields the null handle if the referent was collected.
    pub fn promote(&mut self, handle: ForeignHandle, target: Lifetime) -> BridgeResult<ForeignHandle> {
        self.require_entry()?;
        if handle.is_null() {
            return Ok(ForeignHandle::NULL);
        }
        match (handle.lifetime(), target) {
            (Lifetime::Weak, Lifetime::Global) => Err(BridgeError::UnsupportedPromotion {
                from: Lifetime::Weak,
                to: Lifetime::Global,
            }),
            (Lifetime::Weak, Lifetime::Local) => match self.registry.weak_referent(&handle)? {
                Some(raw) => self.locals.acquire(raw),
                None => Ok(ForeignHandle::NULL),
            },
            (_, Lifetime::Local) => {
                let raw = self.resolve(&handle)?;
                self.locals.acquire(raw)
            }
            (_, lifetime) => {
                let raw = self.resolve(&handle)?;
                self.registry.insert(raw, lifetime)
            }
        }
    }

    /// Release a Global or Weak handle.
    pub fn release(&mut self, handle: ForeignHandle) -> BridgeResult<()> {
        self.require_entry()?;
        self.registry.release(handle)
    }

    /// Invalidate a Local handle before its frame ends.
    pub fn delete_local(&mut self, handle: ForeignHandle) -> BridgeResult<()> {
        self.require_entry()?;
        if handle.lifetime() != Lifetime::Local {
            return Err(BridgeError::InvalidHandle(handle));
        }
        self.locals.delete(handle)
    }

    /// Whether `handle` can still be used. Never fails.
    pub fn is_valid(&self, handle: &ForeignHandle) -> bool {
        if handle.is_null() {
            return false;
        }
        match handle.lifetime() {
            Lifetime::Local => self.locals.is_valid(handle),
            Lifetime::Global | Lifetime::Weak => self.registry.is_valid(handle),
        }
    }

    pub(crate) fn resolve(&self, handle: &ForeignHandle) -> BridgeResult<RawRef> {
        if handle.is_null() {
            return Err(BridgeError::InvalidHandle(*handle));
        }
        match handle.lifetime() {
            Lifetime::Local => self
                .locals
                .lookup(handle)
                .ok_or(BridgeError::InvalidHandle(*handle)),
            Lifetime::Global | Lifetime::Weak => self.registry.resolve(handle),
        }
    }

    /// Open a nested local frame inside the current entry.
    pub fn push_local_frame(&mut self, capacity: usize) -> BridgeResult<()> {
        self.require_entry()?;
        self.locals.push(FrameKind::Explicit, capacity);
        Ok(())
    }

    /// Close the innermost local frame, carrying `keep` (if valid) into the
    /// parent frame as a fresh Local.
    ///
    /// The frame is popped even when `keep` is invalid; the error is reported
    /// afterwards.
    pub fn pop_local_frame(&mut self, keep: ForeignHandle) -> BridgeResult<ForeignHandle> {
        self.require_entry()?;
        if self.locals.top_kind() != Some(FrameKind::Explicit) {
            return Err(BridgeError::NoLocalFrame);
        }
        let kept = if keep.is_null() {
            Ok(RawRef::null())
        } else {
            self.resolve(&keep)
        };
        if let Some(frame) = self.locals.pop() {
            trace!(invalidated = frame.live(), "local frame popped");
        }
        self.locals.acquire(kept?)
    }

    // =========================================================================
    // Failures
    // =========================================================================

    /// The pending foreign failure, if any, without clearing it.
    pub fn pending(&self) -> Option<&ForeignFailure> {
        self.exceptions.pending()
    }

    /// Clear the pending failure on both sides and return it.
    pub fn acknowledge(&mut self) -> Option<ForeignFailure> {
        let failure = self.exceptions.take()?;
        self.host.clear_pending_failure(self.env);
        debug!(kind = %failure.kind, "foreign failure acknowledged");
        Some(failure)
    }

    /// Queue `err` to be thrown to the foreign caller when the entry exits.
    pub fn raise(&mut self, err: BridgeError) -> BridgeResult<()> {
        self.require_entry()?;
        let failure = match err {
            BridgeError::ForeignFailure { kind, message } => ForeignFailure { kind, message },
            other => ForeignFailure::new(self.config().native_error_kind.clone(), other.to_string()),
        };
        self.exceptions.raise(failure);
        Ok(())
    }

    /// Turn a callback's result into the value returned to foreign code.
    /// On error the failure is raised and the default value returned.
    pub fn complete_callback<T: Default>(&mut self, result: BridgeResult<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => {
                if let Err(raise_err) = self.raise(err) {
                    warn!(error = %raise_err, "callback failed outside an entry");
                }
                T::default()
            }
        }
    }
}

impl<H: Host> Drop for BoundaryContext<H> {
    fn drop(&mut self) {
        if self.entries > 0 {
            warn!(open = self.entries, "boundary context dropped inside an entry");
        }
    }
}
