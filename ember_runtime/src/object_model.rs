//! The runtime's object model as seen by the collector.
//!
//! The collector understands only the header word; `HeapObjectModel`
//! supplies byte sizes and child-slot enumeration by dispatching on the
//! tag. Candidate child slots are filtered through
//! `is_traceable_word` so the collector never sees nil, unboxed words,
//! or the non-heap sentinels (an object's proto may hold the IC-disabled
//! sentinel, a function's parent the binding sentinel).

use ember_core::layout::{
    flags_of, is_traceable_word, tag_of, ARRAY_SIZE, BOOLEAN_SIZE, CDATA_BYTES_OFFSET,
    CDATA_SIZE_OFFSET, CONS_STRING_SIZE, CONTEXT_PARENT_OFFSET, CONTEXT_SLOTS_OFFSET,
    CONTEXT_SLOT_COUNT_OFFSET, FUNCTION_PARENT_OFFSET, FUNCTION_ROOT_OFFSET, FUNCTION_SIZE,
    HeaderFlags, HeapTag, MAP_CAPACITY_OFFSET, MAP_PAIRS_OFFSET, MAP_PAIR_SIZE, NUMBER_SIZE,
    OBJECT_MAP_OFFSET, OBJECT_PROTO_OFFSET, OBJECT_SIZE, STRING_BYTES_OFFSET, STRING_LEFT_OFFSET,
    STRING_LENGTH_OFFSET, STRING_RIGHT_OFFSET, WORD_SIZE,
};
use ember_core::Value;
use ember_gc::{ObjectModel, Tracer};

/// Tag-dispatching object model. Zero-sized; one per isolate.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapObjectModel;

impl HeapObjectModel {
    /// Create the model.
    pub const fn new() -> Self {
        Self
    }
}

/// Report `addr + offset` as a child slot if its word is traceable.
///
/// # Safety
/// The slot must lie within a live boxed object.
#[inline]
unsafe fn visit_slot(addr: *mut u8, offset: usize, tracer: &mut dyn Tracer) {
    // SAFETY: caller guarantees the slot is in bounds.
    let slot = unsafe { addr.add(offset) } as *mut Value;
    // SAFETY: tagged slots always hold readable words.
    let word = unsafe { slot.read() }.raw();
    if is_traceable_word(word) {
        tracer.trace_slot(slot);
    }
}

impl ObjectModel for HeapObjectModel {
    unsafe fn size_of(&self, addr: *const u8) -> usize {
        // SAFETY: the collector hands us live, initialised objects.
        unsafe {
            match tag_of(addr) {
                HeapTag::Context => {
                    let slots = (addr.add(CONTEXT_SLOT_COUNT_OFFSET) as *const u64).read() as usize;
                    CONTEXT_SLOTS_OFFSET + slots * WORD_SIZE
                }
                HeapTag::Function => FUNCTION_SIZE,
                HeapTag::Number => NUMBER_SIZE,
                HeapTag::Boolean => BOOLEAN_SIZE,
                HeapTag::String => {
                    if flags_of(addr).contains(HeaderFlags::CONS_STRING) {
                        CONS_STRING_SIZE
                    } else {
                        let length =
                            (addr.add(STRING_LENGTH_OFFSET) as *const u64).read() as usize;
                        STRING_BYTES_OFFSET + length
                    }
                }
                HeapTag::Object => OBJECT_SIZE,
                HeapTag::Array => ARRAY_SIZE,
                HeapTag::Map => {
                    let capacity = (addr.add(MAP_CAPACITY_OFFSET) as *const u64).read() as usize;
                    MAP_PAIRS_OFFSET + capacity * MAP_PAIR_SIZE
                }
                HeapTag::CData => {
                    let size = (addr.add(CDATA_SIZE_OFFSET) as *const u64).read() as usize;
                    CDATA_BYTES_OFFSET + size
                }
            }
        }
    }

    unsafe fn visit_children(&self, addr: *mut u8, tracer: &mut dyn Tracer) {
        // SAFETY: the collector hands us live, initialised objects; every
        // offset below addresses a tagged slot of the matching shape.
        unsafe {
            match tag_of(addr) {
                HeapTag::Context => {
                    visit_slot(addr, CONTEXT_PARENT_OFFSET, tracer);
                    let slots = (addr.add(CONTEXT_SLOT_COUNT_OFFSET) as *const u64).read() as usize;
                    for i in 0..slots {
                        visit_slot(addr, CONTEXT_SLOTS_OFFSET + i * WORD_SIZE, tracer);
                    }
                }
                HeapTag::Function => {
                    // The code address is a raw word; only the context
                    // links are tagged.
                    visit_slot(addr, FUNCTION_PARENT_OFFSET, tracer);
                    visit_slot(addr, FUNCTION_ROOT_OFFSET, tracer);
                }
                HeapTag::String => {
                    if flags_of(addr).contains(HeaderFlags::CONS_STRING) {
                        visit_slot(addr, STRING_LEFT_OFFSET, tracer);
                        visit_slot(addr, STRING_RIGHT_OFFSET, tracer);
                    }
                }
                HeapTag::Object | HeapTag::Array => {
                    visit_slot(addr, OBJECT_MAP_OFFSET, tracer);
                    visit_slot(addr, OBJECT_PROTO_OFFSET, tracer);
                }
                HeapTag::Map => {
                    let capacity = (addr.add(MAP_CAPACITY_OFFSET) as *const u64).read() as usize;
                    for i in 0..capacity {
                        visit_slot(addr, MAP_PAIRS_OFFSET + i * MAP_PAIR_SIZE, tracer);
                        visit_slot(addr, MAP_PAIRS_OFFSET + i * MAP_PAIR_SIZE + WORD_SIZE, tracer);
                    }
                }
                // Leaves: nothing to trace.
                HeapTag::Number | HeapTag::Boolean | HeapTag::CData => {}
            }
        }
    }
}
