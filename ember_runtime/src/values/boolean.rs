//! Boxed booleans.

use crate::values::value_tag;
use ember_core::layout::{BOOLEAN_SIZE, BOOLEAN_VALUE_OFFSET, HeapTag, WORD_SIZE};
use ember_core::Value;
use ember_gc::{Heap, Tenure};

/// A boxed boolean: one payload byte, 0 or 1.
#[derive(Debug, Clone, Copy)]
pub struct HBoolean {
    addr: *mut u8,
}

impl HBoolean {
    /// Allocate a boolean.
    pub fn new(heap: &mut Heap, tenure: Tenure, value: bool) -> HBoolean {
        let addr = heap.allocate_tagged(HeapTag::Boolean, tenure, BOOLEAN_SIZE - WORD_SIZE);
        // SAFETY: addr is a fresh boolean object.
        unsafe { addr.add(BOOLEAN_VALUE_OFFSET).write(value as u8) };
        HBoolean { addr }
    }

    /// View a value as a boolean.
    #[inline]
    pub fn cast(value: Value) -> Option<HBoolean> {
        if value_tag(value) == Some(HeapTag::Boolean) {
            Some(HBoolean {
                addr: value.raw() as *mut u8,
            })
        } else {
            None
        }
    }

    /// The boolean value.
    #[inline]
    pub fn is_true(&self) -> bool {
        // SAFETY: the view wraps a live boolean object.
        unsafe { self.addr.add(BOOLEAN_VALUE_OFFSET).read() != 0 }
    }

    /// The underlying tagged word.
    #[inline]
    pub fn as_value(&self) -> Value {
        Value::from_addr(self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_round_trip() {
        let mut heap = Heap::with_defaults();
        let t = HBoolean::new(&mut heap, Tenure::New, true);
        let f = HBoolean::new(&mut heap, Tenure::New, false);
        assert!(t.is_true());
        assert!(!f.is_true());
    }

    #[test]
    fn test_cast() {
        let mut heap = Heap::with_defaults();
        let b = HBoolean::new(&mut heap, Tenure::New, true).as_value();
        assert!(HBoolean::cast(b).is_some());
        assert!(HBoolean::cast(Value::int(1).unwrap()).is_none());
    }
}
