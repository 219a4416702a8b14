//! Relocation table for heap immediates embedded in generated code.
//!
//! The moving collector cannot sweep the code space, but generated code
//! embeds absolute heap addresses as instruction immediates. Every such
//! immediate is recorded here at emission time; after evacuation the
//! collector visits each recorded slot and patches it to the forwarding
//! address. Code caches additionally register the same slots as weak
//! roots so that code lifetime never prolongs object lifetime.

use ember_core::layout::{gc_mark, is_gc_marked, is_traceable_word};
use ember_core::Value;
use rustc_hash::FxHashSet;
use std::ptr::NonNull;

/// Registry of value-sized immediate slots inside generated code.
#[derive(Default)]
pub struct RelocationTable {
    slots: FxHashSet<usize>,
}

impl RelocationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an immediate slot.
    ///
    /// # Safety
    /// The slot must stay valid (and not move) until unregistered.
    pub unsafe fn register(&mut self, slot: NonNull<Value>) {
        self.slots.insert(slot.as_ptr() as usize);
    }

    /// Remove an immediate slot. Returns whether it was registered.
    pub fn unregister(&mut self, slot: *const Value) -> bool {
        self.slots.remove(&(slot as usize))
    }

    /// Number of recorded slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Patch every recorded slot whose target was evacuated this cycle.
    ///
    /// # Safety
    /// All recorded slots must be valid, and evacuated objects must still
    /// carry their forwarding marks (i.e. the cycle's space swap has not
    /// happened yet).
    pub(crate) unsafe fn patch_evacuated(&self) {
        for &addr in &self.slots {
            let slot = addr as *mut Value;
            // SAFETY: registration contract keeps the slot valid.
            let word = unsafe { slot.read() }.raw();
            if !is_traceable_word(word) {
                continue;
            }
            let target = word as *mut u8;
            // SAFETY: traceable words point at live (possibly forwarded)
            // heap objects during a cycle.
            unsafe {
                if is_gc_marked(target) {
                    slot.write(Value::from_addr(gc_mark(target)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_unregister() {
        let mut table = RelocationTable::new();
        let mut slot = Value::NIL;
        let ptr = NonNull::from(&mut slot);

        unsafe { table.register(ptr) };
        assert_eq!(table.len(), 1);
        assert!(!table.is_empty());

        assert!(table.unregister(ptr.as_ptr()));
        assert!(table.is_empty());
        assert!(!table.unregister(ptr.as_ptr()));
    }

    #[test]
    fn test_duplicate_registration_is_idempotent() {
        let mut table = RelocationTable::new();
        let mut slot = Value::NIL;
        let ptr = NonNull::from(&mut slot);
        unsafe {
            table.register(ptr);
            table.register(ptr);
        }
        assert_eq!(table.len(), 1);
    }
}
