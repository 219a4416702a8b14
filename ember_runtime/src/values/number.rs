//! Numbers: unboxed 63-bit integers and boxed doubles.

use crate::values::{read_word, value_tag, write_word};
use ember_core::layout::{HeapTag, NUMBER_SIZE, NUMBER_VALUE_OFFSET, WORD_SIZE};
use ember_core::Value;
use ember_gc::{Heap, Tenure};

/// A numeric value in either representation.
///
/// Integers that fit 63 bits stay unboxed; everything else is a boxed
/// IEEE-754 double. The view wraps the tagged word itself so both forms
/// read uniformly through [`value`](HNumber::value).
#[derive(Debug, Clone, Copy)]
pub struct HNumber {
    value: Value,
}

impl HNumber {
    /// Allocate a boxed double.
    pub fn new(heap: &mut Heap, tenure: Tenure, value: f64) -> HNumber {
        let addr = heap.allocate_tagged(HeapTag::Number, tenure, NUMBER_SIZE - WORD_SIZE);
        // SAFETY: addr is a fresh number object.
        unsafe { write_word(addr, NUMBER_VALUE_OFFSET, value.to_bits()) };
        HNumber {
            value: Value::from_addr(addr),
        }
    }

    /// Tag an integer, falling back to a boxed double when it does not
    /// fit 63 bits.
    pub fn from_i64(heap: &mut Heap, tenure: Tenure, value: i64) -> HNumber {
        match Value::int(value) {
            Some(tagged) => HNumber { value: tagged },
            None => HNumber::new(heap, tenure, value as f64),
        }
    }

    /// View a value as a number. Accepts unboxed integers and boxed
    /// number objects.
    #[inline]
    pub fn cast(value: Value) -> Option<HNumber> {
        if value.is_unboxed() || value_tag(value) == Some(HeapTag::Number) {
            Some(HNumber { value })
        } else {
            None
        }
    }

    /// The numeric value, widened to a double.
    #[inline]
    pub fn value(&self) -> f64 {
        match self.value.as_int() {
            Some(n) => n as f64,
            // SAFETY: cast() admits only unboxed ints and number objects.
            None => f64::from_bits(unsafe {
                read_word(self.value.raw() as *const u8, NUMBER_VALUE_OFFSET)
            }),
        }
    }

    /// The integral value, if this is an unboxed integer.
    #[inline]
    pub fn as_small_int(&self) -> Option<i64> {
        self.value.as_int()
    }

    /// Whether this number is boxed.
    #[inline]
    pub fn is_boxed(&self) -> bool {
        self.value.is_boxed()
    }

    /// The underlying tagged word.
    #[inline]
    pub fn as_value(&self) -> Value {
        self.value
    }
}
