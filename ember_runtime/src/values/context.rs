//! Scope contexts: a parent link plus captured value slots.

use crate::values::{read_value, read_word, value_tag, write_value, write_word};
use ember_core::layout::{
    CONTEXT_PARENT_OFFSET, CONTEXT_SLOTS_OFFSET, CONTEXT_SLOT_COUNT_OFFSET, HeapTag, WORD_SIZE,
};
use ember_core::Value;
use ember_gc::{Heap, Tenure};

/// A scope context.
///
/// Functions capture their lexical environment as a chain of contexts;
/// the parent link of a top-level function holds the binding-context
/// sentinel instead of a real context.
#[derive(Debug, Clone, Copy)]
pub struct HContext {
    addr: *mut u8,
}

impl HContext {
    /// Allocate a context with nil parent and the given slot values.
    pub fn new(heap: &mut Heap, tenure: Tenure, slots: &[Value]) -> HContext {
        let bytes = 2 * WORD_SIZE + slots.len() * WORD_SIZE;
        let addr = heap.allocate_tagged(HeapTag::Context, tenure, bytes);
        // SAFETY: addr is a fresh context object of the right size.
        unsafe {
            write_value(addr, CONTEXT_PARENT_OFFSET, Value::NIL);
            write_word(addr, CONTEXT_SLOT_COUNT_OFFSET, slots.len() as u64);
            for (i, &slot) in slots.iter().enumerate() {
                write_value(addr, CONTEXT_SLOTS_OFFSET + i * WORD_SIZE, slot);
            }
        }
        HContext { addr }
    }

    /// View a value as a context.
    #[inline]
    pub fn cast(value: Value) -> Option<HContext> {
        if value_tag(value) == Some(HeapTag::Context) {
            Some(HContext {
                addr: value.raw() as *mut u8,
            })
        } else {
            None
        }
    }

    /// The parent context value (nil for a root context).
    #[inline]
    pub fn parent(&self) -> Value {
        // SAFETY: the view wraps a live context.
        unsafe { read_value(self.addr, CONTEXT_PARENT_OFFSET) }
    }

    /// Link this context under a parent.
    #[inline]
    pub fn set_parent(&self, parent: Value) {
        // SAFETY: the view wraps a live context.
        unsafe { write_value(self.addr, CONTEXT_PARENT_OFFSET, parent) }
    }

    /// Number of value slots.
    #[inline]
    pub fn slot_count(&self) -> usize {
        // SAFETY: the view wraps a live context.
        unsafe { read_word(self.addr, CONTEXT_SLOT_COUNT_OFFSET) as usize }
    }

    /// Read slot `index`.
    #[inline]
    pub fn slot(&self, index: usize) -> Value {
        debug_assert!(index < self.slot_count());
        // SAFETY: index is within the slot area.
        unsafe { read_value(self.addr, CONTEXT_SLOTS_OFFSET + index * WORD_SIZE) }
    }

    /// Write slot `index`.
    #[inline]
    pub fn set_slot(&self, index: usize, value: Value) {
        debug_assert!(index < self.slot_count());
        // SAFETY: index is within the slot area.
        unsafe { write_value(self.addr, CONTEXT_SLOTS_OFFSET + index * WORD_SIZE, value) }
    }

    /// The underlying tagged word.
    #[inline]
    pub fn as_value(&self) -> Value {
        Value::from_addr(self.addr)
    }
}
