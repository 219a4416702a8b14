//! Polymorphic inline caches for property access.
//!
//! Each property-access call site carries a fixed-capacity cache mapping
//! a receiver's prototype identity to the resolved value-slot offset in
//! the receiver's map. Emission lays the compare immediates out in a
//! code image and records every immediate's byte offset in a patch-site
//! table; the miss stub installs new entries by writing through those
//! recorded sites, exactly as it would patch live machine code.
//!
//! The cache assumes objects sharing a proto share their map layout.
//! Reshaped objects (map growth) opt out by taking the IC-disabled proto
//! sentinel, which the guard chain sends to the miss stub unconditionally.
//!
//! Cached proto immediates are registered two ways with the heap:
//!
//! - as **weak roots**, so a dead shape disables its entry instead of
//!   being kept alive by the code cache;
//! - in the **relocation table**, so a moved shape gets its immediate
//!   patched to the forwarding address after evacuation.
//!
//! Patching writes plain memory here. A real emitter must additionally
//! order the proto-word store before the compare becomes reachable and
//! flush the instruction cache on targets that require it; that
//! obligation sits with the code space, not with this table.

use crate::property;
use crate::values::HObject;
use ember_core::layout::IC_DISABLED_SENTINEL;
use ember_core::{Error, Value};
use ember_gc::Heap;

use parking_lot::Mutex;
use smallvec::SmallVec;
use std::ptr::NonNull;
use std::sync::Arc;

/// Entries per call site.
pub const PIC_CAPACITY: usize = 5;

/// Bytes per cache entry in the code image: an 8-byte proto immediate
/// followed by an 8-byte result word.
const ENTRY_SIZE: usize = 16;

/// Byte offsets of one entry's immediates, recorded at emission.
#[derive(Debug, Clone, Copy)]
struct PatchSite {
    proto_offset: usize,
    result_offset: usize,
}

/// Mutable cache state behind the patch lock.
struct PicState {
    /// Owned code image; entry immediates live here at stable addresses.
    code: Box<[u8]>,
    /// Patch sites recorded when the image was emitted.
    sites: SmallVec<[PatchSite; PIC_CAPACITY]>,
    /// The property name this call site resolves, factory-canonical.
    /// Registered in the relocation table like any code immediate.
    key: Value,
    /// Populated entries.
    count: usize,
    lookups: u64,
    misses: u64,
}

impl PicState {
    fn read_proto(&self, index: usize) -> u64 {
        let offset = self.sites[index].proto_offset;
        u64::from_le_bytes(self.code[offset..offset + 8].try_into().expect("site in image"))
    }

    fn write_proto(&mut self, index: usize, word: u64) {
        let offset = self.sites[index].proto_offset;
        self.code[offset..offset + 8].copy_from_slice(&word.to_le_bytes());
    }

    fn read_result(&self, index: usize) -> u32 {
        let offset = self.sites[index].result_offset;
        u64::from_le_bytes(self.code[offset..offset + 8].try_into().expect("site in image"))
            as u32
    }

    fn write_result(&mut self, index: usize, result: u32) {
        let offset = self.sites[index].result_offset;
        self.code[offset..offset + 8].copy_from_slice(&(result as u64).to_le_bytes());
    }

    /// Address of an entry's proto immediate within the code image.
    fn proto_slot(&mut self, index: usize) -> NonNull<Value> {
        let offset = self.sites[index].proto_offset;
        // SAFETY: the image is a live allocation; the offset is in range.
        unsafe {
            NonNull::new_unchecked(self.code.as_mut_ptr().add(offset) as *mut Value)
        }
    }

    /// Address of the cached key word.
    fn key_slot(&mut self) -> NonNull<Value> {
        NonNull::from(&mut self.key)
    }
}

/// A per-call-site polymorphic inline cache.
pub struct Pic {
    state: Arc<Mutex<PicState>>,
}

impl Pic {
    /// Emit the cache for a call site resolving `key`.
    ///
    /// Reserves the code image, records the patch sites, canonicalises
    /// the key and registers its immediate with the relocation table.
    pub fn new(heap: &mut Heap, key: Value) -> Pic {
        let key = crate::factory::canonical_key(heap, key);

        let mut sites: SmallVec<[PatchSite; PIC_CAPACITY]> = SmallVec::new();
        for i in 0..PIC_CAPACITY {
            sites.push(PatchSite {
                proto_offset: i * ENTRY_SIZE,
                result_offset: i * ENTRY_SIZE + 8,
            });
        }

        let mut code = vec![0u8; PIC_CAPACITY * ENTRY_SIZE].into_boxed_slice();
        for site in &sites {
            code[site.proto_offset..site.proto_offset + 8]
                .copy_from_slice(&IC_DISABLED_SENTINEL.to_le_bytes());
        }

        let state = Arc::new(Mutex::new(PicState {
            code,
            sites,
            key,
            count: 0,
            lookups: 0,
            misses: 0,
        }));

        {
            let mut guard = state.lock();
            let key_slot = guard.key_slot();
            // SAFETY: the key word lives inside the Arc allocation, which
            // release() unregisters before it can go away.
            unsafe { heap.reloc_mut().register(key_slot) };
        }

        Pic { state }
    }

    /// The guarded lookup an emitted call site performs.
    ///
    /// Guard order: nil receiver traps; unboxed and non-object receivers
    /// miss; an IC-disabled proto misses; then the populated entries are
    /// compared in order.
    pub fn lookup(&self, heap: &mut Heap, receiver: Value) -> Result<Value, Error> {
        let mut state = self.state.lock();
        state.lookups += 1;

        if receiver.is_nil() {
            return Err(Error::PropertyOfNil);
        }

        let Some(object) = HObject::cast(receiver) else {
            return self.miss(&mut state, heap, receiver, None);
        };
        let proto = object.proto();
        if proto.raw() == IC_DISABLED_SENTINEL {
            return self.miss(&mut state, heap, receiver, None);
        }

        for index in 0..state.count {
            if state.read_proto(index) == proto.raw() {
                let offset = state.read_result(index);
                return Ok(object.map().value_at_offset(offset));
            }
        }

        self.miss(&mut state, heap, receiver, Some((object, proto)))
    }

    /// The runtime miss stub: full property lookup, then an in-place
    /// install through the patch table when the cache has room.
    fn miss(
        &self,
        state: &mut PicState,
        heap: &mut Heap,
        receiver: Value,
        cacheable: Option<(HObject, Value)>,
    ) -> Result<Value, Error> {
        state.misses += 1;
        let key = state.key;

        let Some((object, proto)) = cacheable else {
            return property::get_property(heap, receiver, key);
        };

        let Some(offset) = property::lookup_slot_offset(heap, receiver, key)? else {
            return Ok(Value::NIL);
        };

        // Install only real shapes: a nil proto would match every plain
        // object regardless of layout.
        if state.count < PIC_CAPACITY && proto.is_boxed() {
            let index = state.count;
            state.write_proto(index, proto.raw());
            state.write_result(index, offset);
            state.count += 1;

            let slot = state.proto_slot(index);
            // SAFETY: the code image is pinned for the life of the Arc;
            // release() unregisters both entries.
            unsafe {
                heap.reloc_mut().register(slot);
                let cache = Arc::clone(&self.state);
                heap.handles_mut().acquire_weak(
                    slot,
                    Box::new(move |_dead| {
                        // Shape died: disable the entry in place.
                        cache.lock().write_proto(index, IC_DISABLED_SENTINEL);
                    }),
                );
            }
        }

        Ok(object.map().value_at_offset(offset))
    }

    /// Unregister every recorded slot from the heap. Call before the
    /// call site's code is discarded.
    pub fn release(&self, heap: &mut Heap) {
        let mut state = self.state.lock();
        for index in 0..state.count {
            let slot = state.proto_slot(index).as_ptr();
            heap.reloc_mut().unregister(slot);
            heap.handles_mut().release(slot);
        }
        let key_slot = state.key_slot().as_ptr();
        heap.reloc_mut().unregister(key_slot);
    }

    /// Populated entries.
    pub fn entry_count(&self) -> usize {
        self.state.lock().count
    }

    /// Total lookups.
    pub fn lookups(&self) -> u64 {
        self.state.lock().lookups
    }

    /// Miss-stub invocations.
    pub fn misses(&self) -> u64 {
        self.state.lock().misses
    }

    /// Hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let state = self.state.lock();
        if state.lookups == 0 {
            0.0
        } else {
            ((state.lookups - state.misses) as f64) / (state.lookups as f64) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::HString;
    use ember_gc::Tenure;

    fn test_key(heap: &mut Heap, name: &[u8]) -> Value {
        HString::new(heap, Tenure::New, name).as_value()
    }

    fn object_with(heap: &mut Heap, proto: Value, key: Value, value: Value) -> Value {
        let obj = HObject::new_empty(heap, Tenure::New);
        obj.set_proto(proto);
        property::set_property(heap, obj.as_value(), key, value).unwrap();
        obj.as_value()
    }

    #[test]
    fn test_single_miss_then_hits() {
        let mut heap = Heap::with_defaults();
        let key = test_key(&mut heap, b"x");
        let proto = HObject::new_empty(&mut heap, Tenure::New).as_value();
        let receiver = object_with(&mut heap, proto, key, Value::int(10).unwrap());

        let pic = Pic::new(&mut heap, key);
        for _ in 0..8 {
            let got = pic.lookup(&mut heap, receiver).unwrap();
            assert_eq!(got, Value::int(10).unwrap());
        }

        assert_eq!(pic.misses(), 1);
        assert_eq!(pic.lookups(), 8);
        assert_eq!(pic.entry_count(), 1);
        assert!(pic.hit_rate() > 80.0);

        pic.release(&mut heap);
    }

    #[test]
    fn test_polymorphic_entries() {
        let mut heap = Heap::with_defaults();
        let key = test_key(&mut heap, b"f");
        let pic = Pic::new(&mut heap, key);

        let mut receivers = Vec::new();
        for i in 0..3i64 {
            let proto = HObject::new_empty(&mut heap, Tenure::New).as_value();
            receivers.push(object_with(&mut heap, proto, key, Value::int(i).unwrap()));
        }

        for (i, &receiver) in receivers.iter().enumerate() {
            assert_eq!(
                pic.lookup(&mut heap, receiver).unwrap(),
                Value::int(i as i64).unwrap()
            );
        }
        assert_eq!(pic.entry_count(), 3);
        assert_eq!(pic.misses(), 3);

        // All three now hit.
        for (i, &receiver) in receivers.iter().enumerate() {
            assert_eq!(
                pic.lookup(&mut heap, receiver).unwrap(),
                Value::int(i as i64).unwrap()
            );
        }
        assert_eq!(pic.misses(), 3);

        pic.release(&mut heap);
    }

    #[test]
    fn test_capacity_overflow_keeps_missing() {
        let mut heap = Heap::with_defaults();
        let key = test_key(&mut heap, b"k");
        let pic = Pic::new(&mut heap, key);

        let mut receivers = Vec::new();
        for i in 0..(PIC_CAPACITY + 2) {
            let proto = HObject::new_empty(&mut heap, Tenure::New).as_value();
            receivers.push(object_with(&mut heap, proto, key, Value::int(i as i64).unwrap()));
        }

        for &receiver in &receivers {
            pic.lookup(&mut heap, receiver).unwrap();
        }
        assert_eq!(pic.entry_count(), PIC_CAPACITY);

        // The overflow receivers stay correct through the miss stub.
        let last = *receivers.last().unwrap();
        assert_eq!(
            pic.lookup(&mut heap, last).unwrap(),
            Value::int((PIC_CAPACITY + 1) as i64).unwrap()
        );

        pic.release(&mut heap);
    }

    #[test]
    fn test_nil_receiver_traps() {
        let mut heap = Heap::with_defaults();
        let key = test_key(&mut heap, b"x");
        let pic = Pic::new(&mut heap, key);
        assert_eq!(pic.lookup(&mut heap, Value::NIL), Err(Error::PropertyOfNil));
        pic.release(&mut heap);
    }

    #[test]
    fn test_unboxed_and_non_object_receivers_miss_through() {
        let mut heap = Heap::with_defaults();
        let key = test_key(&mut heap, b"x");
        let pic = Pic::new(&mut heap, key);

        assert_eq!(
            pic.lookup(&mut heap, Value::int(3).unwrap()).unwrap(),
            Value::NIL
        );
        let string = HString::new(&mut heap, Tenure::New, b"s").as_value();
        assert_eq!(pic.lookup(&mut heap, string).unwrap(), Value::NIL);
        assert_eq!(pic.entry_count(), 0);

        pic.release(&mut heap);
    }

    #[test]
    fn test_disabled_proto_never_installs() {
        let mut heap = Heap::with_defaults();
        let key = test_key(&mut heap, b"x");
        let proto = HObject::new_empty(&mut heap, Tenure::New).as_value();
        let receiver = object_with(&mut heap, proto, key, Value::int(1).unwrap());
        HObject::cast(receiver).unwrap().disable_ic();

        let pic = Pic::new(&mut heap, key);
        for _ in 0..3 {
            assert_eq!(
                pic.lookup(&mut heap, receiver).unwrap(),
                Value::int(1).unwrap()
            );
        }
        assert_eq!(pic.entry_count(), 0);
        assert_eq!(pic.misses(), 3);

        pic.release(&mut heap);
    }

    #[test]
    fn test_nil_proto_is_not_cached() {
        let mut heap = Heap::with_defaults();
        let key = test_key(&mut heap, b"x");
        let receiver = object_with(&mut heap, Value::NIL, key, Value::int(5).unwrap());

        let pic = Pic::new(&mut heap, key);
        assert_eq!(
            pic.lookup(&mut heap, receiver).unwrap(),
            Value::int(5).unwrap()
        );
        assert_eq!(pic.entry_count(), 0);

        pic.release(&mut heap);
    }
}
