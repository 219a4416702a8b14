//! Typed views over boxed heap objects.
//!
//! A view is a non-owning wrapper around a raw object address. It owns no
//! memory and carries no lifetime: validity follows from the runtime's
//! single-threaded discipline (no collection can run between a safe point
//! and the last use of a view derived before it). Every field access goes
//! through the offsets in `ember_core::layout`; no view computes a layout
//! fact of its own.
//!
//! Views that allocate (string flatten, map growth) take `&mut Heap` and
//! may raise the needs-gc flag, but never enter the collector themselves.

mod boolean;
mod cdata;
mod context;
mod function;
mod map;
mod number;
mod object;
mod string;

pub use boolean::HBoolean;
pub use cdata::HCData;
pub use context::HContext;
pub use function::HFunction;
pub use map::HMap;
pub use number::HNumber;
pub use object::{HArray, HObject, INITIAL_CAPACITY};
pub use string::HString;

use ember_core::layout::{is_traceable_word, tag_of, HeapTag};
use ember_core::Value;

/// An untyped view over any boxed heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HValue {
    addr: *mut u8,
}

impl HValue {
    /// View a boxed value. Returns `None` for nil, unboxed integers and
    /// the non-heap sentinels.
    #[inline]
    pub fn from_value(value: Value) -> Option<HValue> {
        if is_traceable_word(value.raw()) {
            Some(HValue {
                addr: value.raw() as *mut u8,
            })
        } else {
            None
        }
    }

    /// Wrap a raw object address.
    ///
    /// # Safety
    /// `addr` must point to a live, initialised boxed object.
    #[inline]
    pub unsafe fn from_addr(addr: *mut u8) -> HValue {
        HValue { addr }
    }

    /// The object address.
    #[inline]
    pub fn addr(&self) -> *mut u8 {
        self.addr
    }

    /// The object as a tagged value word.
    #[inline]
    pub fn as_value(&self) -> Value {
        Value::from_addr(self.addr)
    }

    /// The object's shape tag.
    #[inline]
    pub fn tag(&self) -> HeapTag {
        // SAFETY: a view only exists for live boxed objects.
        unsafe { tag_of(self.addr) }
    }
}

/// Read the tag of a boxed value, if it is one.
#[inline]
pub(crate) fn value_tag(value: Value) -> Option<HeapTag> {
    HValue::from_value(value).map(|v| v.tag())
}

/// Read a payload word.
///
/// # Safety
/// `addr + offset` must lie within a live boxed object.
#[inline]
pub(crate) unsafe fn read_word(addr: *const u8, offset: usize) -> u64 {
    unsafe { (addr.add(offset) as *const u64).read() }
}

/// Write a payload word.
///
/// # Safety
/// `addr + offset` must lie within a live boxed object.
#[inline]
pub(crate) unsafe fn write_word(addr: *mut u8, offset: usize, word: u64) {
    unsafe { (addr.add(offset) as *mut u64).write(word) }
}

/// Read a tagged payload slot.
///
/// # Safety
/// `addr + offset` must be a tagged slot of a live boxed object.
#[inline]
pub(crate) unsafe fn read_value(addr: *const u8, offset: usize) -> Value {
    Value::from_raw(unsafe { read_word(addr, offset) })
}

/// Write a tagged payload slot.
///
/// # Safety
/// `addr + offset` must be a tagged slot of a live boxed object.
#[inline]
pub(crate) unsafe fn write_value(addr: *mut u8, offset: usize, value: Value) {
    unsafe { write_word(addr, offset, value.raw()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::layout::{BINDING_CONTEXT_SENTINEL, IC_DISABLED_SENTINEL};

    #[test]
    fn test_from_value_rejects_non_objects() {
        assert!(HValue::from_value(Value::NIL).is_none());
        assert!(HValue::from_value(Value::int(5).unwrap()).is_none());
        assert!(HValue::from_value(Value::from_raw(IC_DISABLED_SENTINEL)).is_none());
        assert!(HValue::from_value(Value::from_raw(BINDING_CONTEXT_SENTINEL)).is_none());
    }
}
