//! The factory: content interning for canonical constants.
//!
//! The factory is an ordinary heap object used as a hash table, held in
//! the heap's factory slot and traced as a root every cycle. Interning a
//! constant looks it up by content; the first-seen candidate becomes the
//! canonical entry, mapped to itself, and later content-equal candidates
//! are discarded in favour of the canonical address.
//!
//! Canonical constants are allocated old-tenured: property keys and
//! embedder constants live long, and a stable generation keeps them out
//! of every young cycle.

use crate::property;
use crate::values::{HBoolean, HNumber, HObject, HString, HValue};
use ember_core::layout::HeapTag;
use ember_core::Value;
use ember_gc::{Heap, Tenure};

/// Factory operations. Stateless: the table itself lives in the heap.
pub struct Factory;

impl Factory {
    /// Intern a string constant. Returns the canonical tenured address.
    pub fn intern_string(heap: &mut Heap, bytes: &[u8]) -> Value {
        let candidate = HString::new(heap, Tenure::Old, bytes).as_value();
        to_factory(heap, candidate)
    }

    /// Intern a boxed number constant.
    pub fn intern_number(heap: &mut Heap, value: f64) -> Value {
        let candidate = HNumber::new(heap, Tenure::Old, value).as_value();
        to_factory(heap, candidate)
    }

    /// Intern a boolean constant.
    pub fn intern_boolean(heap: &mut Heap, value: bool) -> Value {
        let candidate = HBoolean::new(heap, Tenure::Old, value).as_value();
        to_factory(heap, candidate)
    }
}

/// Canonicalise a constant by factory lookup; first seen wins.
///
/// Only content-keyed constants (strings, boxed numbers, booleans) are
/// interned; every other value passes through unchanged. The caller
/// discards a duplicate candidate in favour of the returned address.
pub fn to_factory(heap: &mut Heap, candidate: Value) -> Value {
    let internable = matches!(
        HValue::from_value(candidate).map(|v| v.tag()),
        Some(HeapTag::String) | Some(HeapTag::Number) | Some(HeapTag::Boolean)
    );
    if !internable {
        return candidate;
    }

    let factory = ensure_factory(heap);
    match property::get_property(heap, factory, candidate) {
        Ok(existing) if !existing.is_nil() => existing,
        _ => {
            property::insert(heap, factory, candidate, candidate);
            candidate
        }
    }
}

/// Canonicalise a property key. Unboxed integers compare by word and
/// need no interning.
pub(crate) fn canonical_key(heap: &mut Heap, key: Value) -> Value {
    to_factory(heap, key)
}

/// The factory object, created old-tenured on first use.
fn ensure_factory(heap: &mut Heap) -> Value {
    let current = heap.factory();
    if !current.is_nil() {
        return current;
    }
    let factory = HObject::new_empty(heap, Tenure::Old).as_value();
    heap.set_factory(factory);
    factory
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_interning_is_canonical() {
        let mut heap = Heap::with_defaults();
        let a = Factory::intern_string(&mut heap, b"shared");
        let b = Factory::intern_string(&mut heap, b"shared");
        let c = Factory::intern_string(&mut heap, b"other");

        assert_eq!(a.raw(), b.raw());
        assert_ne!(a.raw(), c.raw());
        assert!(heap.old_space().contains(a.raw() as *const u8));
    }

    #[test]
    fn test_number_and_boolean_interning() {
        let mut heap = Heap::with_defaults();
        let a = Factory::intern_number(&mut heap, 3.5);
        let b = Factory::intern_number(&mut heap, 3.5);
        assert_eq!(a.raw(), b.raw());

        let t1 = Factory::intern_boolean(&mut heap, true);
        let t2 = Factory::intern_boolean(&mut heap, true);
        let f = Factory::intern_boolean(&mut heap, false);
        assert_eq!(t1.raw(), t2.raw());
        assert_ne!(t1.raw(), f.raw());
    }

    #[test]
    fn test_non_internable_values_pass_through() {
        let mut heap = Heap::with_defaults();
        let n = Value::int(5).unwrap();
        assert_eq!(to_factory(&mut heap, n), n);
        assert_eq!(to_factory(&mut heap, Value::NIL), Value::NIL);

        let obj = HObject::new_empty(&mut heap, Tenure::New).as_value();
        assert_eq!(to_factory(&mut heap, obj), obj);
    }

    #[test]
    fn test_factory_object_installed_once() {
        let mut heap = Heap::with_defaults();
        assert!(heap.factory().is_nil());
        Factory::intern_string(&mut heap, b"x");
        let factory = heap.factory();
        assert!(!factory.is_nil());
        Factory::intern_string(&mut heap, b"y");
        assert_eq!(heap.factory().raw(), factory.raw());
    }

    #[test]
    fn test_cons_candidate_interns_by_content() {
        let mut heap = Heap::with_defaults();
        let plain = Factory::intern_string(&mut heap, b"ab");

        let a = HString::new(&mut heap, Tenure::New, b"a");
        let b = HString::new(&mut heap, Tenure::New, b"b");
        let cons = HString::concat(&mut heap, Tenure::Old, a, b).as_value();
        let canonical = to_factory(&mut heap, cons);

        assert_eq!(canonical.raw(), plain.raw());
    }
}
