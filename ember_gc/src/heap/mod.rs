//! The heap: two spaces plus the registries the collector walks.

mod page;
mod space;

pub use page::Page;
pub use space::Space;

use crate::config::HeapConfig;
use crate::handles::HandleTable;
use crate::reloc::RelocationTable;
use crate::stats::GcStats;
use crate::{GcFlag, NeedsGc, SpaceKind};

use ember_core::layout::{self, HeapTag, WORD_SIZE};
use ember_core::Value;

/// Which space a fresh allocation lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tenure {
    /// New space, generation 0.
    New,
    /// Old space, generation already at the tenuring threshold.
    Old,
}

/// The managed heap.
///
/// Owns the new and old spaces, the external-handle registry, the
/// relocation table for code-embedded immediates, the factory slot, the
/// pending-exception slot and the needs-gc flag. Everything is owned
/// exclusively; the runtime is single-threaded and the mutator is blocked
/// for the duration of a collection.
pub struct Heap {
    config: HeapConfig,
    flag: GcFlag,
    new_space: Space,
    old_space: Space,
    handles: HandleTable,
    reloc: RelocationTable,
    /// Canonical constants table, maintained by the runtime's factory.
    /// Always traced as a root.
    factory: Value,
    /// Raised by runtime helpers, polled by generated code on return.
    pending_exception: Value,
    stats: GcStats,
}

impl Heap {
    /// Create a heap with the given configuration.
    pub fn new(config: HeapConfig) -> Self {
        config.validate().expect("invalid heap configuration");

        let flag = GcFlag::new();
        let new_space = Space::new(SpaceKind::New, config.page_size, flag.clone());
        let old_space = Space::new(SpaceKind::Old, config.page_size, flag.clone());

        Self {
            config,
            flag,
            new_space,
            old_space,
            handles: HandleTable::new(),
            reloc: RelocationTable::new(),
            factory: Value::NIL,
            pending_exception: Value::NIL,
            stats: GcStats::new(),
        }
    }

    /// Create a heap with the default configuration.
    pub fn with_defaults() -> Self {
        Self::new(HeapConfig::default())
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate a boxed object: one header word plus `bytes` of payload.
    ///
    /// Writes the header (tag, flags clear, generation 0 for new-tenured
    /// or the tenuring threshold for old-tenured) and returns the object
    /// address. The payload is zeroed; callers fill it before the next
    /// safe point.
    pub fn allocate_tagged(&mut self, tag: HeapTag, tenure: Tenure, bytes: usize) -> *mut u8 {
        let total = bytes + WORD_SIZE;
        let generation = match tenure {
            Tenure::New => 0,
            Tenure::Old => self.config.tenure_threshold,
        };

        let space = match tenure {
            Tenure::New => &mut self.new_space,
            Tenure::Old => &mut self.old_space,
        };
        let addr = space.allocate(total);

        // SAFETY: addr points to `total` fresh bytes owned by the space.
        unsafe {
            (addr as *mut u64).write(layout::make_header(tag, generation));
        }

        self.stats.record_allocation(total);
        addr
    }

    // =========================================================================
    // Collection flag
    // =========================================================================

    /// Which space, if any, the next safe point must collect.
    #[inline]
    pub fn needs_gc(&self) -> NeedsGc {
        self.flag.get()
    }

    /// Request a collection of `kind` unless one is already pending.
    #[inline]
    pub fn request_gc(&self, kind: SpaceKind) {
        self.flag.request(kind);
    }

    /// Clear the pending request. Collector use.
    #[inline]
    pub fn clear_needs_gc(&self) {
        self.flag.set(NeedsGc::None);
    }

    /// Re-raise the flag if a space is still over its soft limit.
    ///
    /// Run at the end of a cycle: promotion can push the old space over
    /// its limit while the flag is already taken by the running cycle.
    pub(crate) fn refresh_gc_request(&self) {
        if self.new_space.size() > self.new_space.size_limit() {
            self.flag.request(SpaceKind::New);
        }
        if self.old_space.size() > self.old_space.size_limit() {
            self.flag.request(SpaceKind::Old);
        }
    }

    // =========================================================================
    // Pending exception
    // =========================================================================

    /// Read the pending exception, if any.
    #[inline]
    pub fn pending_exception(&self) -> Option<Value> {
        if self.pending_exception.is_nil() {
            None
        } else {
            Some(self.pending_exception)
        }
    }

    /// Raise an exception value for the embedder to observe.
    #[inline]
    pub fn set_pending_exception(&mut self, value: Value) {
        self.pending_exception = value;
    }

    /// Take and clear the pending exception.
    #[inline]
    pub fn take_pending_exception(&mut self) -> Option<Value> {
        let value = self.pending_exception();
        self.pending_exception = Value::NIL;
        value
    }

    /// Address of the pending-exception slot. Collector use: the slot is
    /// a root and must be rewritten after evacuation.
    pub(crate) fn pending_exception_slot(&mut self) -> *mut Value {
        &mut self.pending_exception
    }

    // =========================================================================
    // Factory slot
    // =========================================================================

    /// The canonical-constants table installed by the runtime.
    #[inline]
    pub fn factory(&self) -> Value {
        self.factory
    }

    /// Install the factory object.
    #[inline]
    pub fn set_factory(&mut self, factory: Value) {
        self.factory = factory;
    }

    /// Address of the factory slot. Collector use.
    pub(crate) fn factory_slot(&mut self) -> *mut Value {
        &mut self.factory
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The configuration.
    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    /// Accumulated statistics.
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// The new (young) space.
    pub fn new_space(&self) -> &Space {
        &self.new_space
    }

    /// Mutable new space.
    pub fn new_space_mut(&mut self) -> &mut Space {
        &mut self.new_space
    }

    /// The old (tenured) space.
    pub fn old_space(&self) -> &Space {
        &self.old_space
    }

    /// Mutable old space.
    pub fn old_space_mut(&mut self) -> &mut Space {
        &mut self.old_space
    }

    /// The external-handle registry.
    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Mutable handle registry.
    pub fn handles_mut(&mut self) -> &mut HandleTable {
        &mut self.handles
    }

    /// The relocation table for code-embedded immediates.
    pub fn reloc(&self) -> &RelocationTable {
        &self.reloc
    }

    /// Mutable relocation table.
    pub fn reloc_mut(&mut self) -> &mut RelocationTable {
        &mut self.reloc
    }

    /// Check whether an address lies in either space.
    pub fn contains(&self, addr: *const u8) -> bool {
        self.new_space.contains(addr) || self.old_space.contains(addr)
    }
}
