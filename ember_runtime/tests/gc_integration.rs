//! End-to-end collection scenarios against the full object model.

use ember_core::{Error, Value};
use ember_gc::{HandleKind, HeapConfig, SpaceKind, Tenure};
use ember_runtime::values::{HContext, HObject, HString};
use ember_runtime::{property, FrameStack, Isolate, Pic};
use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

// =============================================================================
// Collection under pressure
// =============================================================================

#[test]
fn test_allocation_pressure_triggers_young_collection() {
    let mut isolate = Isolate::new(HeapConfig {
        page_size: 4096,
        ..Default::default()
    });

    let mut root = HString::new(isolate.heap_mut(), Tenure::New, b"keep me alive").as_value();
    let before = root;
    unsafe { isolate.acquire(HandleKind::Persistent, NonNull::from(&mut root)) };

    // Churn allocations until the space outgrows its soft limit.
    let mut churned = 0usize;
    while isolate.poll_gc(None).is_none() {
        let _ = HString::new(isolate.heap_mut(), Tenure::New, &[b'x'; 64]);
        churned += 1;
        assert!(churned < 1_000_000, "soft limit never tripped");
    }

    // The root moved to a fresh page; the garbage did not come along.
    assert_ne!(root.raw(), before.raw());
    let moved = HString::cast(root).expect("string survived");
    assert_eq!(moved.bytes(isolate.heap_mut()), b"keep me alive");

    let new_space = isolate.heap().new_space();
    assert!(!new_space.contains(before.raw() as *const u8));
    assert!(new_space.contains(root.raw() as *const u8));
    assert!(new_space.size() < 4096);

    isolate.release(&root as *const Value);
}

// =============================================================================
// Weak notification
// =============================================================================

#[test]
fn test_weak_handle_notifies_once_and_unregisters() {
    let mut isolate = Isolate::with_defaults();

    let fired = Rc::new(Cell::new(0usize));
    let observer = Rc::clone(&fired);

    let mut weak = HString::new(isolate.heap_mut(), Tenure::New, b"doomed").as_value();
    unsafe {
        isolate.acquire_weak(
            NonNull::from(&mut weak),
            Box::new(move |_| observer.set(observer.get() + 1)),
        );
    }

    isolate.collect_garbage(None);
    assert_eq!(fired.get(), 1);
    assert_eq!(isolate.heap().handles().weak_count(), 0);

    isolate.collect_garbage(None);
    assert_eq!(fired.get(), 1);
}

// =============================================================================
// Object graphs across cycles
// =============================================================================

#[test]
fn test_object_properties_survive_collection() {
    let mut isolate = Isolate::with_defaults();

    let key_name = isolate.new_string(b"name");
    let key_size = isolate.new_string(b"size");

    let mut obj = HObject::new_empty(isolate.heap_mut(), Tenure::New).as_value();
    let name = HString::new(isolate.heap_mut(), Tenure::New, b"ember").as_value();
    isolate.set_property(obj, key_name, name).unwrap();
    isolate
        .set_property(obj, key_size, Value::int(128).unwrap())
        .unwrap();

    unsafe { isolate.acquire(HandleKind::Persistent, NonNull::from(&mut obj)) };
    isolate.collect_garbage(None);

    let got_name = isolate.get_property(obj, key_name).unwrap();
    let got_name = HString::cast(got_name).expect("string property");
    assert_eq!(got_name.bytes(isolate.heap_mut()), b"ember");

    assert_eq!(
        isolate.get_property(obj, key_size).unwrap(),
        Value::int(128).unwrap()
    );

    isolate.release(&obj as *const Value);
}

#[test]
fn test_cons_string_children_survive_and_flatten_after_move() {
    let mut isolate = Isolate::with_defaults();

    let left = HString::new(isolate.heap_mut(), Tenure::New, b"gar");
    let right = HString::new(isolate.heap_mut(), Tenure::New, b"bage collector");
    let mut cons =
        HString::concat(isolate.heap_mut(), Tenure::New, left, right).as_value();

    unsafe { isolate.acquire(HandleKind::Persistent, NonNull::from(&mut cons)) };
    isolate.collect_garbage(None);

    let moved = HString::cast(cons).expect("cons survived");
    assert!(moved.is_cons());
    assert_eq!(moved.bytes(isolate.heap_mut()), b"garbage collector");

    // The cached flat copy survives the next cycle through the left slot.
    isolate.collect_garbage(None);
    let moved = HString::cast(cons).expect("still alive");
    assert_eq!(moved.bytes(isolate.heap_mut()), b"garbage collector");

    isolate.release(&cons as *const Value);
}

#[test]
fn test_factory_canonical_identity_survives_old_space_collection() {
    let mut isolate = Isolate::with_defaults();

    let mut canonical = isolate.new_string(b"interned");
    unsafe { isolate.acquire(HandleKind::Persistent, NonNull::from(&mut canonical)) };

    // Old-space cycle moves the factory and its entries.
    isolate.heap_mut().request_gc(SpaceKind::Old);
    let result = isolate.collect_garbage(None);
    assert_eq!(result.collected, Some(SpaceKind::Old));

    // Interning the same content resolves to the moved canonical copy.
    let again = isolate.new_string(b"interned");
    assert_eq!(again.raw(), canonical.raw());

    isolate.release(&canonical as *const Value);
}

// =============================================================================
// Frame walking
// =============================================================================

#[test]
fn test_stack_slots_are_roots_and_get_rewritten() {
    let mut isolate = Isolate::with_defaults();
    let mut stack = FrameStack::new(128);

    let outer_string = HString::new(isolate.heap_mut(), Tenure::New, b"outer").as_value();
    let inner_string = HString::new(isolate.heap_mut(), Tenure::New, b"inner").as_value();

    let outer = stack.push_frame(&[outer_string, Value::int(7).unwrap()]);
    let inner = stack.push_frame_via_trampoline(&[inner_string]);

    isolate.collect_garbage(stack.current_frame());

    unsafe {
        let moved_inner = FrameStack::read_slot(inner, 0);
        assert_ne!(moved_inner.raw(), inner_string.raw());
        let view = HString::cast(moved_inner).expect("inner slot still a string");
        assert_eq!(view.bytes(isolate.heap_mut()), b"inner");

        // The walker followed the trampoline link into the outer frame.
        let moved_outer = FrameStack::read_slot(outer, 0);
        assert_ne!(moved_outer.raw(), outer_string.raw());
        let view = HString::cast(moved_outer).expect("outer slot still a string");
        assert_eq!(view.bytes(isolate.heap_mut()), b"outer");

        // Unboxed slots pass through untouched.
        assert_eq!(FrameStack::read_slot(outer, 1), Value::int(7).unwrap());
    }
}

#[test]
fn test_unrooted_values_die_when_stack_does_not_mention_them() {
    let mut isolate = Isolate::with_defaults();
    let mut stack = FrameStack::new(64);

    let kept = HString::new(isolate.heap_mut(), Tenure::New, b"kept").as_value();
    let _dropped = HString::new(isolate.heap_mut(), Tenure::New, b"dropped").as_value();
    let frame = stack.push_frame(&[kept]);

    let result = isolate.collect_garbage(stack.current_frame());
    assert_eq!(result.objects_evacuated, 1);

    unsafe {
        let survivor = FrameStack::read_slot(frame, 0);
        let view = HString::cast(survivor).expect("survivor");
        assert_eq!(view.bytes(isolate.heap_mut()), b"kept");
    }
}

// =============================================================================
// Inline caches across cycles
// =============================================================================

#[test]
fn test_pic_entry_is_patched_when_shape_moves() {
    let mut isolate = Isolate::with_defaults();

    let key = isolate.new_string(b"field");
    let proto = HObject::new_empty(isolate.heap_mut(), Tenure::New).as_value();
    let obj = HObject::new_empty(isolate.heap_mut(), Tenure::New);
    obj.set_proto(proto);
    let mut receiver = obj.as_value();
    isolate
        .set_property(receiver, key, Value::int(11).unwrap())
        .unwrap();

    let pic = Pic::new(isolate.heap_mut(), key);
    assert_eq!(
        pic.lookup(isolate.heap_mut(), receiver).unwrap(),
        Value::int(11).unwrap()
    );
    assert_eq!(pic.misses(), 1);

    unsafe { isolate.acquire(HandleKind::Persistent, NonNull::from(&mut receiver)) };
    isolate.collect_garbage(None);

    // Receiver and proto both moved; the cached proto immediate was
    // patched, so the lookup still hits.
    assert_eq!(
        pic.lookup(isolate.heap_mut(), receiver).unwrap(),
        Value::int(11).unwrap()
    );
    assert_eq!(pic.misses(), 1);
    assert_eq!(pic.entry_count(), 1);

    pic.release(isolate.heap_mut());
    isolate.release(&receiver as *const Value);
}

#[test]
fn test_pic_entry_is_disabled_when_shape_dies() {
    let mut isolate = Isolate::with_defaults();

    let key = isolate.new_string(b"field");
    let pic = Pic::new(isolate.heap_mut(), key);

    // Populate one entry from a shape that is about to die.
    {
        let proto = HObject::new_empty(isolate.heap_mut(), Tenure::New).as_value();
        let obj = HObject::new_empty(isolate.heap_mut(), Tenure::New);
        obj.set_proto(proto);
        isolate
            .set_property(obj.as_value(), key, Value::int(1).unwrap())
            .unwrap();
        pic.lookup(isolate.heap_mut(), obj.as_value()).unwrap();
        assert_eq!(pic.entry_count(), 1);
    }

    let result = isolate.collect_garbage(None);
    assert!(result.weak_fired >= 1);

    // The dead entry can never match again; a live shape installs fresh.
    let proto = HObject::new_empty(isolate.heap_mut(), Tenure::New).as_value();
    let obj = HObject::new_empty(isolate.heap_mut(), Tenure::New);
    obj.set_proto(proto);
    let mut receiver = obj.as_value();
    isolate
        .set_property(receiver, key, Value::int(2).unwrap())
        .unwrap();
    unsafe { isolate.acquire(HandleKind::Persistent, NonNull::from(&mut receiver)) };

    assert_eq!(
        pic.lookup(isolate.heap_mut(), receiver).unwrap(),
        Value::int(2).unwrap()
    );
    assert_eq!(pic.entry_count(), 2);
    assert_eq!(
        pic.lookup(isolate.heap_mut(), receiver).unwrap(),
        Value::int(2).unwrap()
    );

    pic.release(isolate.heap_mut());
    isolate.release(&receiver as *const Value);
}

// =============================================================================
// Traps
// =============================================================================

#[test]
fn test_pending_exception_survives_collection() {
    let mut isolate = Isolate::with_defaults();
    let key = isolate.new_string(b"x");

    assert_eq!(isolate.get_property(Value::NIL, key), Err(Error::PropertyOfNil));
    assert!(isolate.pending_exception().is_some());

    isolate.collect_garbage(None);

    let exception = isolate.take_pending_exception().expect("still pending");
    let message = HString::cast(exception).expect("message string");
    assert_eq!(
        message.bytes(isolate.heap_mut()),
        Error::PropertyOfNil.to_str().as_bytes()
    );
}

// =============================================================================
// Context chains
// =============================================================================

#[test]
fn test_context_chain_traced_through_old_space() {
    let mut isolate = Isolate::new(HeapConfig {
        tenure_threshold: 1,
        ..Default::default()
    });

    // Old-tenured parent holding a young value, reached through a young
    // child context.
    let captured = HString::new(isolate.heap_mut(), Tenure::New, b"captured").as_value();
    let parent = HContext::new(isolate.heap_mut(), Tenure::Old, &[captured]);
    let child = HContext::new(isolate.heap_mut(), Tenure::New, &[]);
    child.set_parent(parent.as_value());

    let mut root = child.as_value();
    unsafe { isolate.acquire(HandleKind::Persistent, NonNull::from(&mut root)) };

    isolate.collect_garbage(None);

    let child = HContext::cast(root).expect("child survived");
    let parent = HContext::cast(child.parent()).expect("parent reachable");
    let moved = HString::cast(parent.slot(0)).expect("captured survived");
    assert_eq!(moved.bytes(isolate.heap_mut()), b"captured");

    isolate.release(&root as *const Value);
}

// =============================================================================
// Slot-offset contract
// =============================================================================

#[test]
fn test_lookup_slot_offset_remains_valid_after_move() {
    let mut isolate = Isolate::with_defaults();
    let key = isolate.new_string(b"stable");

    let handle = HObject::new_empty(isolate.heap_mut(), Tenure::New);
    let mut obj = handle.as_value();
    isolate
        .set_property(obj, key, Value::int(64).unwrap())
        .unwrap();

    let offset = property::lookup_slot_offset(isolate.heap_mut(), obj, key)
        .unwrap()
        .expect("present");

    unsafe { isolate.acquire(HandleKind::Persistent, NonNull::from(&mut obj)) };
    isolate.collect_garbage(None);

    // The offset is relative to the map, so it survives the move.
    let moved = HObject::cast(obj).expect("object survived");
    assert_eq!(
        moved.map().value_at_offset(offset),
        Value::int(64).unwrap()
    );

    isolate.release(&obj as *const Value);
}
