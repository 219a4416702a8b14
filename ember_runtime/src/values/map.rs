//! Map buffers: the backing store of objects and arrays.

use crate::values::{read_value, read_word, value_tag, write_value, write_word};
use ember_core::layout::{HeapTag, MAP_CAPACITY_OFFSET, MAP_PAIRS_OFFSET, MAP_PAIR_SIZE, WORD_SIZE};
use ember_core::Value;
use ember_gc::{Heap, Tenure};

/// A separately allocated open-addressing table: a capacity word followed
/// by `capacity` interleaved (key, value) pairs. An empty slot has a nil
/// key; keys are never nil.
#[derive(Debug, Clone, Copy)]
pub struct HMap {
    addr: *mut u8,
}

impl HMap {
    /// Allocate a map with `capacity` zeroed pairs.
    pub fn new(heap: &mut Heap, tenure: Tenure, capacity: usize) -> HMap {
        debug_assert!(capacity.is_power_of_two());
        let bytes = WORD_SIZE + capacity * MAP_PAIR_SIZE;
        let addr = heap.allocate_tagged(HeapTag::Map, tenure, bytes);
        // SAFETY: addr is a fresh map object; pair slots arrive zeroed
        // (nil keys) from the page allocator.
        unsafe { write_word(addr, MAP_CAPACITY_OFFSET, capacity as u64) };
        HMap { addr }
    }

    /// View a value as a map.
    #[inline]
    pub fn cast(value: Value) -> Option<HMap> {
        if value_tag(value) == Some(HeapTag::Map) {
            Some(HMap {
                addr: value.raw() as *mut u8,
            })
        } else {
            None
        }
    }

    /// Number of pair slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        // SAFETY: the view wraps a live map.
        unsafe { read_word(self.addr, MAP_CAPACITY_OFFSET) as usize }
    }

    /// Key of pair `index`.
    #[inline]
    pub fn key(&self, index: usize) -> Value {
        debug_assert!(index < self.capacity());
        // SAFETY: index is within the pair area.
        unsafe { read_value(self.addr, MAP_PAIRS_OFFSET + index * MAP_PAIR_SIZE) }
    }

    /// Value of pair `index`.
    #[inline]
    pub fn value(&self, index: usize) -> Value {
        debug_assert!(index < self.capacity());
        // SAFETY: index is within the pair area.
        unsafe { read_value(self.addr, MAP_PAIRS_OFFSET + index * MAP_PAIR_SIZE + WORD_SIZE) }
    }

    /// Write the key of pair `index`.
    #[inline]
    pub fn set_key(&self, index: usize, key: Value) {
        debug_assert!(index < self.capacity());
        // SAFETY: index is within the pair area.
        unsafe { write_value(self.addr, MAP_PAIRS_OFFSET + index * MAP_PAIR_SIZE, key) }
    }

    /// Write the value of pair `index`.
    #[inline]
    pub fn set_value(&self, index: usize, value: Value) {
        debug_assert!(index < self.capacity());
        // SAFETY: index is within the pair area.
        unsafe {
            write_value(
                self.addr,
                MAP_PAIRS_OFFSET + index * MAP_PAIR_SIZE + WORD_SIZE,
                value,
            )
        }
    }

    /// Whether pair `index` is unoccupied.
    #[inline]
    pub fn is_empty_slot(&self, index: usize) -> bool {
        self.key(index).is_nil()
    }

    /// Byte offset of the value slot of pair `index`, from the map
    /// address. This is what inline caches record.
    #[inline]
    pub fn value_slot_offset(index: usize) -> u32 {
        (MAP_PAIRS_OFFSET + index * MAP_PAIR_SIZE + WORD_SIZE) as u32
    }

    /// Read a value through a recorded slot offset.
    #[inline]
    pub fn value_at_offset(&self, offset: u32) -> Value {
        debug_assert!((offset as usize) < MAP_PAIRS_OFFSET + self.capacity() * MAP_PAIR_SIZE);
        // SAFETY: recorded offsets address value slots of this map.
        unsafe { read_value(self.addr, offset as usize) }
    }

    /// The underlying tagged word.
    #[inline]
    pub fn as_value(&self) -> Value {
        Value::from_addr(self.addr)
    }
}
