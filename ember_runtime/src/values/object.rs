//! Objects and arrays: open-addressed property tables.

use crate::values::{read_value, read_word, value_tag, write_value, write_word, HMap};
use ember_core::layout::{
    ARRAY_LENGTH_OFFSET, ARRAY_SIZE, HeapTag, IC_DISABLED_SENTINEL, OBJECT_MAP_OFFSET,
    OBJECT_MASK_OFFSET, OBJECT_PROTO_OFFSET, OBJECT_SIZE, WORD_SIZE,
};
use ember_core::Value;
use ember_gc::{Heap, Tenure};

/// Initial pair capacity of a fresh object or array.
pub const INITIAL_CAPACITY: usize = 16;

/// An object: a hash table with open addressing.
///
/// The header-adjacent mask is `(capacity - 1) * WORD_SIZE`, letting
/// machine code turn a key hash into a slot index without branching. The
/// map buffer is separately allocated; `proto` is the shape identity the
/// inline caches key on.
#[derive(Debug, Clone, Copy)]
pub struct HObject {
    addr: *mut u8,
}

impl HObject {
    /// Allocate an empty object with the initial capacity.
    pub fn new_empty(heap: &mut Heap, tenure: Tenure) -> HObject {
        let addr = heap.allocate_tagged(HeapTag::Object, tenure, OBJECT_SIZE - WORD_SIZE);
        let map = HMap::new(heap, tenure, INITIAL_CAPACITY);
        // SAFETY: addr is a fresh object.
        unsafe {
            write_word(
                addr,
                OBJECT_MASK_OFFSET,
                ((INITIAL_CAPACITY - 1) * WORD_SIZE) as u64,
            );
            write_value(addr, OBJECT_MAP_OFFSET, map.as_value());
            write_value(addr, OBJECT_PROTO_OFFSET, Value::NIL);
        }
        HObject { addr }
    }

    /// View a value as an object (arrays excluded).
    #[inline]
    pub fn cast(value: Value) -> Option<HObject> {
        if value_tag(value) == Some(HeapTag::Object) {
            Some(HObject {
                addr: value.raw() as *mut u8,
            })
        } else {
            None
        }
    }

    /// Wrap a raw address known to carry the object payload.
    ///
    /// Arrays qualify: they share the first three payload words, and
    /// these accessors never read past them.
    ///
    /// # Safety
    /// `addr` must be a live object or array.
    #[inline]
    pub(crate) unsafe fn from_addr_unchecked(addr: *mut u8) -> HObject {
        HObject { addr }
    }

    /// The probe mask, `(capacity - 1) * WORD_SIZE`.
    #[inline]
    pub fn mask(&self) -> u64 {
        // SAFETY: the view wraps a live object.
        unsafe { read_word(self.addr, OBJECT_MASK_OFFSET) }
    }

    /// The backing map.
    #[inline]
    pub fn map(&self) -> HMap {
        // SAFETY: the map slot always holds a live map.
        let value = unsafe { read_value(self.addr, OBJECT_MAP_OFFSET) };
        HMap::cast(value).expect("object map slot must hold a map")
    }

    /// Replace the backing map (growth path).
    #[inline]
    pub fn set_map(&self, map: HMap) {
        // SAFETY: the view wraps a live object.
        unsafe {
            write_value(self.addr, OBJECT_MAP_OFFSET, map.as_value());
            write_word(
                self.addr,
                OBJECT_MASK_OFFSET,
                ((map.capacity() - 1) * WORD_SIZE) as u64,
            );
        }
    }

    /// The prototype identity used by inline caches.
    #[inline]
    pub fn proto(&self) -> Value {
        // SAFETY: the view wraps a live object.
        unsafe { read_value(self.addr, OBJECT_PROTO_OFFSET) }
    }

    /// Install a prototype identity.
    #[inline]
    pub fn set_proto(&self, proto: Value) {
        // SAFETY: the view wraps a live object.
        unsafe { write_value(self.addr, OBJECT_PROTO_OFFSET, proto) }
    }

    /// Opt this object out of inline caching (set on reshape, so stale
    /// cached slot offsets can never be applied to it).
    #[inline]
    pub fn disable_ic(&self) {
        // SAFETY: the view wraps a live object.
        unsafe {
            write_value(
                self.addr,
                OBJECT_PROTO_OFFSET,
                Value::from_raw(IC_DISABLED_SENTINEL),
            )
        }
    }

    /// Whether inline caching is disabled for this object.
    #[inline]
    pub fn is_ic_disabled(&self) -> bool {
        self.proto().raw() == IC_DISABLED_SENTINEL
    }

    /// The underlying tagged word.
    #[inline]
    pub fn as_value(&self) -> Value {
        Value::from_addr(self.addr)
    }
}

/// An array: the object payload plus a length word.
///
/// Elements are stored in the map keyed by unboxed integer indices; the
/// length tracks one past the highest index ever written.
#[derive(Debug, Clone, Copy)]
pub struct HArray {
    addr: *mut u8,
}

impl HArray {
    /// Allocate an empty array.
    pub fn new_empty(heap: &mut Heap, tenure: Tenure) -> HArray {
        let addr = heap.allocate_tagged(HeapTag::Array, tenure, ARRAY_SIZE - WORD_SIZE);
        let map = HMap::new(heap, tenure, INITIAL_CAPACITY);
        // SAFETY: addr is a fresh array.
        unsafe {
            write_word(
                addr,
                OBJECT_MASK_OFFSET,
                ((INITIAL_CAPACITY - 1) * WORD_SIZE) as u64,
            );
            write_value(addr, OBJECT_MAP_OFFSET, map.as_value());
            write_value(addr, OBJECT_PROTO_OFFSET, Value::NIL);
            write_word(addr, ARRAY_LENGTH_OFFSET, 0);
        }
        HArray { addr }
    }

    /// View a value as an array.
    #[inline]
    pub fn cast(value: Value) -> Option<HArray> {
        if value_tag(value) == Some(HeapTag::Array) {
            Some(HArray {
                addr: value.raw() as *mut u8,
            })
        } else {
            None
        }
    }

    /// One past the highest index written.
    #[inline]
    pub fn length(&self) -> usize {
        // SAFETY: the view wraps a live array.
        unsafe { read_word(self.addr, ARRAY_LENGTH_OFFSET) as usize }
    }

    /// Update the length word.
    #[inline]
    pub fn set_length(&self, length: usize) {
        // SAFETY: the view wraps a live array.
        unsafe { write_word(self.addr, ARRAY_LENGTH_OFFSET, length as u64) }
    }

    /// The underlying tagged word.
    #[inline]
    pub fn as_value(&self) -> Value {
        Value::from_addr(self.addr)
    }
}
