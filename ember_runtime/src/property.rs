//! The object property path.
//!
//! Objects and arrays are open-addressed hash tables over their map
//! buffer. The slot index comes from the key's content hash and the
//! object's probe mask; collisions resolve by linear probing. When the
//! map fills up it is reallocated at double capacity and rehashed, and
//! the object's proto is set to the IC-disabled sentinel: recorded slot
//! offsets into the old map must never be applied to the new one.
//!
//! Property keys are strings, numbers (either representation) and
//! booleans; boxed keys are canonicalised through the factory on insert.
//! Content hashing keeps probe positions stable across collections, so a
//! map needs no rehash when its keys move.

use crate::factory;
use crate::values::{HArray, HBoolean, HMap, HNumber, HObject, HString, HValue};
use ember_core::hash::hash_word;
use ember_core::layout::HeapTag;
use ember_core::{Error, Value};
use ember_gc::{Heap, Tenure};

/// Outcome of scanning a map for a key.
enum Probe {
    /// Key present at this pair index.
    Found(usize),
    /// Key absent; first free pair index.
    Empty(usize),
    /// Key absent and no free slot.
    Full,
}

/// Read a property. Missing keys and non-object receivers read as nil;
/// a nil receiver is a runtime trap.
pub fn get_property(heap: &mut Heap, receiver: Value, key: Value) -> Result<Value, Error> {
    if receiver.is_nil() {
        return Err(Error::PropertyOfNil);
    }
    let Some(map) = receiver_map(receiver) else {
        return Ok(Value::NIL);
    };
    let Some(hash) = key_hash(heap, key) else {
        return Ok(Value::NIL);
    };
    match probe(heap, map, key, hash) {
        Probe::Found(index) => Ok(map.value(index)),
        _ => Ok(Value::NIL),
    }
}

/// Write a property, growing the map when needed. Non-object receivers
/// and unsupported key kinds drop the store; a nil receiver is a trap.
pub fn set_property(
    heap: &mut Heap,
    receiver: Value,
    key: Value,
    value: Value,
) -> Result<(), Error> {
    if receiver.is_nil() {
        return Err(Error::PropertyOfNil);
    }
    if receiver_map(receiver).is_none() {
        return Ok(());
    }
    let key = factory::canonical_key(heap, key);
    insert(heap, receiver, key, value);
    Ok(())
}

/// Insert without key canonicalisation. The factory itself comes through
/// here; routing it via [`set_property`] would recurse.
pub(crate) fn insert(heap: &mut Heap, receiver: Value, key: Value, value: Value) {
    let Some(hash) = key_hash(heap, key) else {
        return;
    };

    loop {
        // Re-read the map each round: growth replaces it.
        let map = receiver_map(receiver).expect("insert on non-object");
        match probe(heap, map, key, hash) {
            Probe::Found(index) => {
                map.set_value(index, value);
                break;
            }
            Probe::Empty(index) => {
                map.set_key(index, key);
                map.set_value(index, value);
                break;
            }
            Probe::Full => grow(heap, receiver),
        }
    }

    update_array_length(receiver, key);
}

/// Resolve a key to the byte offset of its value slot within the
/// receiver's map. This is what inline caches record on a miss.
pub fn lookup_slot_offset(
    heap: &mut Heap,
    receiver: Value,
    key: Value,
) -> Result<Option<u32>, Error> {
    if receiver.is_nil() {
        return Err(Error::PropertyOfNil);
    }
    let Some(map) = receiver_map(receiver) else {
        return Ok(None);
    };
    let Some(hash) = key_hash(heap, key) else {
        return Ok(None);
    };
    match probe(heap, map, key, hash) {
        Probe::Found(index) => Ok(Some(HMap::value_slot_offset(index))),
        _ => Ok(None),
    }
}

/// The backing map of an object or array receiver.
fn receiver_map(receiver: Value) -> Option<HMap> {
    Some(object_payload(receiver)?.map())
}

/// The shared object payload of an object or array receiver.
fn object_payload(receiver: Value) -> Option<HObject> {
    let view = HValue::from_value(receiver)?;
    match view.tag() {
        HeapTag::Object | HeapTag::Array => {
            // SAFETY: tag checked; arrays share the object payload.
            Some(unsafe { HObject::from_addr_unchecked(view.addr()) })
        }
        _ => None,
    }
}

/// Content hash of a property key; `None` for unsupported key kinds.
fn key_hash(heap: &mut Heap, key: Value) -> Option<u32> {
    if key.is_unboxed() {
        return Some(hash_word(key.raw()));
    }
    let view = HValue::from_value(key)?;
    match view.tag() {
        HeapTag::String => {
            let string = HString::cast(key)?;
            Some(string.hash(heap))
        }
        HeapTag::Number => {
            let number = HNumber::cast(key)?;
            Some(hash_word(number.value().to_bits()))
        }
        HeapTag::Boolean => {
            let boolean = HBoolean::cast(key)?;
            Some(hash_word(boolean.is_true() as u64))
        }
        _ => None,
    }
}

/// Content equality for supported key kinds.
fn keys_equal(heap: &mut Heap, a: Value, b: Value) -> bool {
    if a.raw() == b.raw() {
        return true;
    }
    let (Some(va), Some(vb)) = (HValue::from_value(a), HValue::from_value(b)) else {
        return false;
    };
    match (va.tag(), vb.tag()) {
        (HeapTag::String, HeapTag::String) => {
            let sa = HString::cast(a).expect("tag checked");
            let sb = HString::cast(b).expect("tag checked");
            sa.eq_bytes(&sb, heap)
        }
        (HeapTag::Number, HeapTag::Number) => {
            let na = HNumber::cast(a).expect("tag checked");
            let nb = HNumber::cast(b).expect("tag checked");
            na.value().to_bits() == nb.value().to_bits()
        }
        (HeapTag::Boolean, HeapTag::Boolean) => {
            let ba = HBoolean::cast(a).expect("tag checked");
            let bb = HBoolean::cast(b).expect("tag checked");
            ba.is_true() == bb.is_true()
        }
        _ => false,
    }
}

/// Linear scan from the key's home slot.
fn probe(heap: &mut Heap, map: HMap, key: Value, hash: u32) -> Probe {
    let capacity = map.capacity();
    let start = hash as usize & (capacity - 1);

    let mut empty = None;
    for step in 0..capacity {
        let index = (start + step) & (capacity - 1);
        if map.is_empty_slot(index) {
            if empty.is_none() {
                empty = Some(index);
            }
            // Keys are never deleted, so the first hole ends the probe.
            break;
        }
        if keys_equal(heap, map.key(index), key) {
            return Probe::Found(index);
        }
    }

    match empty {
        Some(index) => Probe::Empty(index),
        None => Probe::Full,
    }
}

/// Double the receiver's map, rehash every pair, and opt the object out
/// of inline caching: cached offsets into the old buffer are now stale.
fn grow(heap: &mut Heap, receiver: Value) {
    let old_map = receiver_map(receiver).expect("grow on non-object");
    let new_capacity = old_map.capacity() * 2;
    let new_map = HMap::new(heap, Tenure::New, new_capacity);

    for index in 0..old_map.capacity() {
        if old_map.is_empty_slot(index) {
            continue;
        }
        let key = old_map.key(index);
        let value = old_map.value(index);
        let hash = key_hash(heap, key).expect("stored keys always hash");
        match probe(heap, new_map, key, hash) {
            Probe::Empty(slot) => {
                new_map.set_key(slot, key);
                new_map.set_value(slot, value);
            }
            // The new map has twice the room and no duplicates.
            _ => unreachable!("rehash into doubled map cannot collide fully"),
        }
    }

    let obj = object_payload(receiver).expect("grow on non-object");
    obj.set_map(new_map);
    obj.disable_ic();
}

/// Track the array length invariant: writing index `n` past the current
/// length sets the length to `n + 1`.
fn update_array_length(receiver: Value, key: Value) {
    let Some(array) = HArray::cast(receiver) else {
        return;
    };
    if let Some(index) = key.as_int() {
        if index >= 0 && index as usize >= array.length() {
            array.set_length(index as usize + 1);
        }
    }
}
