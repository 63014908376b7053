//! Reference registry
//!
//! Two tables back every [`ForeignHandle`]:
//! - [`ReferenceRegistry`]: Global and Weak handles. Shared across threads
//!   and entries, guarded by a single mutex.
//! - [`LocalFrames`]: Local handles of one boundary context. Never shared, so
//!   unlocked. Each entry (and each explicit local frame) pushes a frame;
//!   popping it invalidates every Local created in it.
//!
//! Slots carry a generation counter that is bumped on release or deletion,
//! so a stale handle never revalidates when its slot is reused.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use super::config::BridgeConfig;
use super::error::{BridgeError, BridgeResult};
use super::refs::{ForeignHandle, Lifetime, RawRef};

/// Source of registry and context ids. Zero is reserved for the null handle.
static NEXT_OWNER_ID: AtomicU32 = AtomicU32::new(1);

pub(crate) fn next_owner_id() -> u32 {
    NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed)
}

// =========================================================================
// Global / Weak table
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Live,
    /// Weak slot whose referent was collected. Still needs a release.
    Cleared,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    raw: RawRef,
    lifetime: Lifetime,
    generation: u32,
    state: SlotState,
}

#[derive(Default)]
struct Table {
    slots: Vec<Slot>,
    free: Vec<u32>,
    globals: usize,
    weaks: usize,
}

impl Table {
    /// Find the slot a handle refers to, distinguishing never-issued handles
    /// from released ones.
    fn slot(&self, handle: &ForeignHandle) -> Result<&Slot, SlotLookup> {
        let slot = self.slots.get(handle.slot()).ok_or(SlotLookup::Unknown)?;
        if handle.generation() > slot.generation {
            return Err(SlotLookup::Unknown);
        }
        if handle.generation() < slot.generation || slot.state == SlotState::Free {
            return Err(SlotLookup::Released);
        }
        if slot.lifetime != handle.lifetime() {
            return Err(SlotLookup::Unknown);
        }
        Ok(slot)
    }

    fn count_mut(&mut self, lifetime: Lifetime) -> &mut usize {
        match lifetime {
            Lifetime::Weak => &mut self.weaks,
            _ => &mut self.globals,
        }
    }
}

enum SlotLookup {
    Unknown,
    Released,
}

/// Snapshot of registry counters, for leak detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    pub live_globals: usize,
    pub live_weaks: usize,
    pub acquired: usize,
    pub released: usize,
}

impl RegistryStats {
    /// Handles acquired but never released.
    pub fn outstanding(&self) -> usize {
        self.live_globals + self.live_weaks
    }
}

/// The Global and Weak handle table.
pub struct ReferenceRegistry {
    id: u32,
    config: BridgeConfig,
    table: Mutex<Table>,
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl Default for ReferenceRegistry {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl ReferenceRegistry {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            id: next_owner_id(),
            config,
            table: Mutex::new(Table::default()),
            acquired: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        // Table invariants hold between statements, so a poisoned lock is
        // still consistent.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn owns(&self, handle: &ForeignHandle) -> bool {
        handle.owner() == self.id && handle.lifetime() != Lifetime::Local
    }

    /// Insert a new Global or Weak entry for `raw`.
    pub(crate) fn insert(&self, raw: RawRef, lifetime: Lifetime) -> BridgeResult<ForeignHandle> {
        debug_assert!(lifetime != Lifetime::Local);
        if raw.is_null() {
            return Ok(ForeignHandle::NULL);
        }
        let limit = match lifetime {
            Lifetime::Weak => self.config.max_weak_refs,
            _ => self.config.max_global_refs,
        };

        let mut table = self.table();
        if *table.count_mut(lifetime) >= limit {
            return Err(BridgeError::ReferenceTableFull { lifetime, limit });
        }
        let (index, generation) = match table.free.pop() {
            Some(index) => {
                let slot = &mut table.slots[index as usize];
                slot.raw = raw;
                slot.lifetime = lifetime;
                slot.state = SlotState::Live;
                (index, slot.generation)
            }
            None => {
                let index = table.slots.len() as u32;
                table.slots.push(Slot {
                    raw,
                    lifetime,
                    generation: 0,
                    state: SlotState::Live,
                });
                (index, 0)
            }
        };
        *table.count_mut(lifetime) += 1;
        drop(table);

        self.acquired.fetch_add(1, Ordering::Relaxed);
        let handle = ForeignHandle::new(lifetime, self.id, 0, index, generation);
        trace!(?handle, ?raw, "acquired");
        Ok(handle)
    }

    /// Release a Global or Weak handle. Releasing the null handle is a no-op.
    pub fn release(&self, handle: ForeignHandle) -> BridgeResult<()> {
        if handle.is_null() {
            return Ok(());
        }
        if handle.lifetime() == Lifetime::Local {
            return Err(BridgeError::NotReleasable(Lifetime::Local));
        }
        if !self.owns(&handle) {
            return Err(BridgeError::InvalidHandle(handle));
        }

        let mut table = self.table();
        match table.slot(&handle) {
            Ok(_) => {}
            Err(SlotLookup::Released) => return Err(BridgeError::DoubleRelease(handle)),
            Err(SlotLookup::Unknown) => return Err(BridgeError::InvalidHandle(handle)),
        }
        let index = handle.slot();
        let slot = &mut table.slots[index];
        slot.state = SlotState::Free;
        slot.raw = RawRef::null();
        slot.generation = slot.generation.wrapping_add(1);
        *table.count_mut(handle.lifetime()) -= 1;
        table.free.push(index as u32);
        drop(table);

        self.released.fetch_add(1, Ordering::Relaxed);
        trace!(?handle, "released");
        Ok(())
    }

    /// True while the handle is unreleased and, for Weak, its referent live.
    pub fn is_valid(&self, handle: &ForeignHandle) -> bool {
        if handle.is_null() || !self.owns(handle) {
            return false;
        }
        matches!(self.table().slot(handle), Ok(slot) if slot.state == SlotState::Live)
    }

    /// The raw reference behind a live handle.
    pub(crate) fn resolve(&self, handle: &ForeignHandle) -> BridgeResult<RawRef> {
        match self.weak_referent(handle)? {
            Some(raw) => Ok(raw),
            None => Err(BridgeError::InvalidHandle(*handle)),
        }
    }

    /// Like [`resolve`](Self::resolve) but reports a cleared Weak as `None`.
    pub(crate) fn weak_referent(&self, handle: &ForeignHandle) -> BridgeResult<Option<RawRef>> {
        if !self.owns(handle) {
            return Err(BridgeError::InvalidHandle(*handle));
        }
        match self.table().slot(handle) {
            Ok(slot) if slot.state == SlotState::Live => Ok(Some(slot.raw)),
            Ok(_) => Ok(None),
            Err(_) => Err(BridgeError::InvalidHandle(*handle)),
        }
    }

    /// Host notification that `raw` was collected. Clears every Weak entry
    /// for it and returns how many were cleared. A referent still held by a
    /// Global is not collectable and is left untouched.
    pub fn mark_collected(&self, raw: RawRef) -> usize {
        let mut table = self.table();
        let pinned = table
            .slots
            .iter()
            .any(|s| s.raw == raw && s.lifetime == Lifetime::Global && s.state == SlotState::Live);
        if pinned {
            warn!(?raw, "collection reported for a referent held by a global handle");
            return 0;
        }
        let mut cleared = 0;
        for slot in table.slots.iter_mut() {
            if slot.raw == raw && slot.lifetime == Lifetime::Weak && slot.state == SlotState::Live {
                slot.state = SlotState::Cleared;
                cleared += 1;
            }
        }
        trace!(?raw, cleared, "referent collected");
        cleared
    }

    pub fn stats(&self) -> RegistryStats {
        let table = self.table();
        RegistryStats {
            live_globals: table.globals,
            live_weaks: table.weaks,
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
        }
    }

    /// Every Global and Weak handle not yet released.
    pub fn outstanding(&self) -> Vec<ForeignHandle> {
        let table = self.table();
        table
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state != SlotState::Free)
            .map(|(i, s)| ForeignHandle::new(s.lifetime, self.id, 0, i as u32, s.generation))
            .collect()
    }
}

impl Drop for ReferenceRegistry {
    fn drop(&mut self) {
        let stats = self.stats();
        if stats.outstanding() > 0 {
            warn!(
                globals = stats.live_globals,
                weaks = stats.live_weaks,
                "reference registry dropped with unreleased handles"
            );
        }
    }
}

// =========================================================================
// Local frames
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FrameKind {
    /// Pushed by `enter`, popped by `exit`.
    Entry,
    /// Pushed by `push_local_frame` within an entry.
    Explicit,
}

#[derive(Debug, Clone, Copy)]
struct LocalSlot {
    raw: Option<RawRef>,
    generation: u32,
}

#[derive(Debug)]
pub(crate) struct LocalFrame {
    serial: u32,
    kind: FrameKind,
    capacity: usize,
    slots: Vec<LocalSlot>,
    free: Vec<u32>,
    live: usize,
    warned: bool,
}

impl LocalFrame {
    pub(crate) fn kind(&self) -> FrameKind {
        self.kind
    }

    /// Locals still valid when the frame ends.
    pub(crate) fn live(&self) -> usize {
        self.live
    }
}

/// The Local handle tables of one context, innermost frame last.
#[derive(Debug)]
pub(crate) struct LocalFrames {
    owner: u32,
    frames: Vec<LocalFrame>,
    next_serial: u32,
}

impl LocalFrames {
    pub(crate) fn new() -> Self {
        Self {
            owner: next_owner_id(),
            frames: Vec::new(),
            next_serial: 1,
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn top_kind(&self) -> Option<FrameKind> {
        self.frames.last().map(LocalFrame::kind)
    }

    pub(crate) fn push(&mut self, kind: FrameKind, capacity: usize) -> u32 {
        let serial = self.next_serial;
        self.next_serial = self.next_serial.wrapping_add(1).max(1);
        self.frames.push(LocalFrame {
            serial,
            kind,
            capacity,
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            warned: false,
        });
        serial
    }

    pub(crate) fn pop(&mut self) -> Option<LocalFrame> {
        self.frames.pop()
    }

    /// Wrap `raw` as a Local in the innermost frame.
    pub(crate) fn acquire(&mut self, raw: RawRef) -> BridgeResult<ForeignHandle> {
        if raw.is_null() {
            return Ok(ForeignHandle::NULL);
        }
        let owner = self.owner;
        let frame = self.frames.last_mut().ok_or(BridgeError::NotInEntry)?;

        let (index, generation) = match frame.free.pop() {
            Some(index) => {
                let slot = &mut frame.slots[index as usize];
                slot.raw = Some(raw);
                (index, slot.generation)
            }
            None => {
                let index = frame.slots.len() as u32;
                frame.slots.push(LocalSlot {
                    raw: Some(raw),
                    generation: 0,
                });
                (index, 0)
            }
        };
        frame.live += 1;
        if frame.live > frame.capacity && !frame.warned {
            frame.warned = true;
            warn!(
                capacity = frame.capacity,
                live = frame.live,
                "local frame exceeded its capacity"
            );
        }
        Ok(ForeignHandle::new(Lifetime::Local, owner, frame.serial, index, generation))
    }

    fn frame_of(&self, handle: &ForeignHandle) -> Option<usize> {
        if handle.lifetime() != Lifetime::Local || handle.owner() != self.owner {
            return None;
        }
        self.frames.iter().rposition(|f| f.serial == handle.scope())
    }

    pub(crate) fn lookup(&self, handle: &ForeignHandle) -> Option<RawRef> {
        let frame = &self.frames[self.frame_of(handle)?];
        let slot = frame.slots.get(handle.slot())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.raw
    }

    pub(crate) fn is_valid(&self, handle: &ForeignHandle) -> bool {
        self.lookup(handle).is_some()
    }

    /// Invalidate one Local ahead of its frame's end.
    pub(crate) fn delete(&mut self, handle: ForeignHandle) -> BridgeResult<()> {
        if handle.is_null() {
            return Ok(());
        }
        if self.lookup(&handle).is_none() {
            return Err(BridgeError::InvalidHandle(handle));
        }
        let Some(index) = self.frame_of(&handle) else {
            return Err(BridgeError::InvalidHandle(handle));
        };
        let frame = &mut self.frames[index];
        let slot = &mut frame.slots[handle.slot()];
        slot.raw = None;
        slot.generation = slot.generation.wrapping_add(1);
        frame.free.push(handle.slot() as u32);
        frame.live -= 1;
        Ok(())
    }
}
