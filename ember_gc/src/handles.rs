//! External handles: GC-tracked indirections held by embedder code.
//!
//! A handle is registered by the address of its storage slot (a `Value`
//! cell owned by the embedder) and comes in three kinds:
//!
//! - **Persistent**: traced as a root every cycle and rewritten after
//!   evacuation. Keeps its target alive.
//! - **Normal**: rewritten after evacuation but does not keep the target
//!   alive; the holder re-establishes liveness through persistent handles
//!   or the stack. A normal handle whose target has died holds a stale
//!   word; the holder must release or refresh it before the next cycle.
//! - **Weak**: neither traced nor kept alive. If the target dies in a
//!   collected space, the registered callback fires once and the entry is
//!   removed; if the target merely moved, the slot is rewritten.

use ember_core::Value;
use rustc_hash::FxHashMap;
use std::ptr::NonNull;

/// GC behaviour of an external handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// Root: traced and rewritten.
    Persistent,
    /// Rewritten only.
    Normal,
    /// Notified on death.
    Weak,
}

/// Callback fired when a weak target is collected. Receives the dead
/// value (still readable until the cycle's space swap). Advisory: it has
/// no failure channel by construction.
pub type WeakCallback = Box<dyn FnMut(Value)>;

/// A persistent or normal registration.
pub(crate) struct StrongEntry {
    pub(crate) kind: HandleKind,
    /// The embedder's storage slot.
    pub(crate) slot: *mut Value,
    /// The handle's own copy of the value, kept in sync by the collector.
    pub(crate) value: Value,
}

/// A weak registration.
pub(crate) struct WeakEntry {
    pub(crate) slot: *mut Value,
    pub(crate) callback: WeakCallback,
}

/// Registry of all live external handles, keyed by slot address.
#[derive(Default)]
pub struct HandleTable {
    pub(crate) strong: FxHashMap<usize, StrongEntry>,
    pub(crate) weak: FxHashMap<usize, WeakEntry>,
}

impl HandleTable {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a persistent handle.
    ///
    /// # Safety
    /// `slot` must stay valid (and not move) until released.
    pub unsafe fn acquire_persistent(&mut self, slot: NonNull<Value>) {
        // SAFETY: caller guarantees the slot is readable.
        let value = unsafe { slot.as_ptr().read() };
        self.strong.insert(
            slot.as_ptr() as usize,
            StrongEntry {
                kind: HandleKind::Persistent,
                slot: slot.as_ptr(),
                value,
            },
        );
    }

    /// Register a normal handle.
    ///
    /// # Safety
    /// `slot` must stay valid (and not move) until released.
    pub unsafe fn acquire_normal(&mut self, slot: NonNull<Value>) {
        let value = unsafe { slot.as_ptr().read() };
        self.strong.insert(
            slot.as_ptr() as usize,
            StrongEntry {
                kind: HandleKind::Normal,
                slot: slot.as_ptr(),
                value,
            },
        );
    }

    /// Register a weak handle with a death callback.
    ///
    /// # Safety
    /// `slot` must stay valid (and not move) until released or until the
    /// callback fires.
    pub unsafe fn acquire_weak(&mut self, slot: NonNull<Value>, callback: WeakCallback) {
        self.weak.insert(
            slot.as_ptr() as usize,
            WeakEntry {
                slot: slot.as_ptr(),
                callback,
            },
        );
    }

    /// Remove a registration of any kind. Returns whether one existed.
    pub fn release(&mut self, slot: *const Value) -> bool {
        let key = slot as usize;
        self.strong.remove(&key).is_some() | self.weak.remove(&key).is_some()
    }

    /// Check whether a slot is registered.
    pub fn is_registered(&self, slot: *const Value) -> bool {
        let key = slot as usize;
        self.strong.contains_key(&key) || self.weak.contains_key(&key)
    }

    /// Number of persistent and normal registrations.
    pub fn strong_count(&self) -> usize {
        self.strong.len()
    }

    /// Number of weak registrations.
    pub fn weak_count(&self) -> usize {
        self.weak.len()
    }

    /// Slots the collector must trace as roots: for every persistent
    /// handle, the embedder's storage slot and the handle's value cell.
    pub(crate) fn persistent_trace_slots(&mut self) -> Vec<*mut Value> {
        let mut slots = Vec::new();
        for entry in self.strong.values_mut() {
            if entry.kind == HandleKind::Persistent {
                slots.push(entry.slot);
                slots.push(&mut entry.value as *mut Value);
            }
        }
        slots
    }

    /// Slots the collector rewrites (without tracing) for normal handles.
    pub(crate) fn normal_trace_slots(&mut self) -> Vec<*mut Value> {
        let mut slots = Vec::new();
        for entry in self.strong.values_mut() {
            if entry.kind == HandleKind::Normal {
                slots.push(entry.slot);
                slots.push(&mut entry.value as *mut Value);
            }
        }
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_release() {
        let mut table = HandleTable::new();
        let mut slot = Value::int(1).unwrap();
        let ptr = NonNull::from(&mut slot);

        unsafe { table.acquire_persistent(ptr) };
        assert!(table.is_registered(ptr.as_ptr()));
        assert_eq!(table.strong_count(), 1);

        assert!(table.release(ptr.as_ptr()));
        assert!(!table.is_registered(ptr.as_ptr()));
        assert!(!table.release(ptr.as_ptr()));
    }

    #[test]
    fn test_registration_is_keyed_by_slot() {
        let mut table = HandleTable::new();
        let mut a = Value::NIL;
        let mut b = Value::NIL;

        unsafe {
            table.acquire_normal(NonNull::from(&mut a));
            table.acquire_normal(NonNull::from(&mut b));
        }
        assert_eq!(table.strong_count(), 2);

        // Re-acquiring the same slot replaces, not duplicates.
        unsafe { table.acquire_persistent(NonNull::from(&mut a)) };
        assert_eq!(table.strong_count(), 2);
    }

    #[test]
    fn test_persistent_trace_slots() {
        let mut table = HandleTable::new();
        let mut persistent = Value::NIL;
        let mut normal = Value::NIL;

        unsafe {
            table.acquire_persistent(NonNull::from(&mut persistent));
            table.acquire_normal(NonNull::from(&mut normal));
        }

        // Two slots per persistent handle: storage + value cell.
        assert_eq!(table.persistent_trace_slots().len(), 2);
        assert_eq!(table.normal_trace_slots().len(), 2);
    }

    #[test]
    fn test_weak_registration() {
        let mut table = HandleTable::new();
        let mut slot = Value::NIL;
        unsafe {
            table.acquire_weak(NonNull::from(&mut slot), Box::new(|_| {}));
        }
        assert_eq!(table.weak_count(), 1);
        assert!(table.release(&slot as *const Value));
        assert_eq!(table.weak_count(), 0);
    }
}
