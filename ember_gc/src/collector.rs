//! The tri-colour moving collector.
//!
//! One cycle copies the live part of the selected space into a temporary
//! to-space (promoting tenure-ripe survivors of a new-space cycle into the
//! old space), rewrites every root and recorded slot to the forwarding
//! addresses, notifies weak references of deaths, then swaps the to-space
//! in. The mutator is stopped for the whole cycle.
//!
//! # Colours
//!
//! - **White** (implicit): not yet reached.
//! - **Grey**: reached, children not yet scanned. Kept as a work list of
//!   `(value, slot)` pairs so the referencing slot can be rewritten.
//! - **Black**: soft-marked objects living outside the collected space,
//!   kept so their marks can be reset at the end of the cycle. Objects
//!   inside the collected space need no black list: the hard mark (plus
//!   forwarding address in the mark slot) is their "already processed"
//!   state, and it dies with the from-space pages.

use crate::heap::{Heap, Space};
use crate::trace::{ObjectModel, Tracer};
use crate::{NeedsGc, SpaceKind};

use ember_core::layout::{
    gc_mark, generation_of, is_gc_marked, is_soft_marked, is_traceable_word,
    reset_soft_mark, set_gc_mark, set_generation, set_soft_mark, CALL_PRELUDE_MARKER,
    FRAME_FIRST_SLOT_OFFSET, FRAME_PRELUDE_MARKER_OFFSET, FRAME_SLOT_COUNT_OFFSET,
    FRAME_SLOT_COUNT_SHIFT, FRAME_TRAMPOLINE_LINK_OFFSET, WORD_SIZE,
};
use ember_core::Value;

use std::collections::VecDeque;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::time::Instant;

/// One grey entry: a reached value and the slot that referenced it.
#[derive(Clone, Copy)]
struct GreyItem {
    value: u64,
    slot: *mut Value,
}

/// Result of one collection cycle.
#[derive(Debug, Default)]
pub struct CollectionResult {
    /// Which space was collected.
    pub collected: Option<SpaceKind>,
    /// Objects copied (to-space and old space together).
    pub objects_evacuated: usize,
    /// Bytes copied.
    pub bytes_evacuated: usize,
    /// Objects promoted into the old space.
    pub objects_promoted: usize,
    /// Bytes promoted into the old space.
    pub bytes_promoted: usize,
    /// Weak callbacks fired.
    pub weak_fired: usize,
}

/// The collector. Holds only its work lists; all heap state is borrowed
/// per cycle.
pub struct Collector {
    grey: VecDeque<GreyItem>,
    black: Vec<*mut u8>,
}

impl Collector {
    /// Create a collector with empty work lists.
    pub fn new() -> Self {
        Self {
            grey: VecDeque::with_capacity(256),
            black: Vec::with_capacity(64),
        }
    }

    /// Run one full collection cycle.
    ///
    /// If no collection is pending, a new-space cycle is forced (explicit
    /// collection requests arrive this way). `current_frame` is the
    /// innermost mutator frame, or `None` when no mutator code is on the
    /// stack.
    pub fn collect(
        &mut self,
        heap: &mut Heap,
        model: &dyn ObjectModel,
        current_frame: Option<NonNull<u8>>,
    ) -> CollectionResult {
        debug_assert!(self.grey.is_empty());
        debug_assert!(self.black.is_empty());

        let started = Instant::now();

        // An explicit request arrives with no flag set.
        if heap.needs_gc() == NeedsGc::None {
            heap.request_gc(SpaceKind::New);
        }
        let kind = heap.needs_gc();
        let threshold = heap.config().tenure_threshold;
        let trace = heap.config().trace;

        let (space_kind, page_size) = match kind {
            NeedsGc::NewSpace => (SpaceKind::New, heap.new_space().page_size()),
            NeedsGc::OldSpace => (SpaceKind::Old, heap.old_space().page_size()),
            NeedsGc::None => unreachable!(),
        };

        // To-space for this cycle. Detached: its growth never raises the
        // needs-gc flag.
        let mut tmp = Space::internal(space_kind, page_size);

        let mut result = CollectionResult {
            collected: Some(space_kind),
            ..Default::default()
        };

        // Phase 1: roots. Persistent handles and the heap's own slots
        // first, then the mutator stack. Each root is drained eagerly so
        // the grey list stays small.
        let mut root_slots = heap.handles_mut().persistent_trace_slots();
        root_slots.push(heap.factory_slot());
        root_slots.push(heap.pending_exception_slot());

        for slot in root_slots {
            // SAFETY: registration and heap ownership keep root slots valid.
            unsafe {
                self.push_grey(slot.read(), slot);
                self.process_grey(heap, &mut tmp, model, kind, threshold, &mut result);
            }
        }

        if let Some(frame) = current_frame {
            // SAFETY: the mutator is stopped; the frame chain obeys the
            // layout contract emitted by the code generator.
            unsafe {
                self.walk_frames(frame.as_ptr(), heap, &mut tmp, model, kind, threshold, &mut result);
            }
        }

        // Phase 2: reset soft marks on objects outside the collected space.
        while let Some(addr) = self.black.pop() {
            // SAFETY: black entries are live objects in the uncollected space.
            unsafe {
                debug_assert!(is_soft_marked(addr));
                reset_soft_mark(addr);
            }
        }

        // Phase 3: rewrite normal handles whose targets moved.
        for slot in heap.handles_mut().normal_trace_slots() {
            // SAFETY: registration keeps the slot valid; forwarding marks
            // are still intact.
            unsafe { relocate_if_marked(slot) };
        }

        // Phase 4: weak references. Must precede relocation patching: a
        // code slot registered both weak and relocatable has to be
        // examined at its original address before anything rewrites it.
        result.weak_fired = self.process_weak(heap, kind, threshold);

        // Phase 5: patch code-embedded immediates whose targets moved.
        // Slots already rewritten by the weak pass read as clean and are
        // skipped.
        // SAFETY: forwarding marks survive until the swap below.
        unsafe { heap.reloc().patch_evacuated() };

        // Phase 6: install the to-space; from-space pages die with tmp.
        match space_kind {
            SpaceKind::New => heap.new_space_mut().swap(&mut tmp),
            SpaceKind::Old => heap.old_space_mut().swap(&mut tmp),
        }
        drop(tmp);

        // Phase 7: clear the flag, then re-arm if promotion pushed the
        // other space over its limit.
        heap.clear_needs_gc();
        heap.refresh_gc_request();

        let elapsed = started.elapsed();
        let stats = heap.stats();
        match space_kind {
            SpaceKind::New => stats.new_space_collections.fetch_add(1, Ordering::Relaxed),
            SpaceKind::Old => stats.old_space_collections.fetch_add(1, Ordering::Relaxed),
        };
        stats
            .gc_time_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        stats
            .objects_evacuated
            .fetch_add(result.objects_evacuated as u64, Ordering::Relaxed);
        stats
            .bytes_evacuated
            .fetch_add(result.bytes_evacuated as u64, Ordering::Relaxed);
        stats
            .objects_promoted
            .fetch_add(result.objects_promoted as u64, Ordering::Relaxed);
        stats
            .bytes_promoted
            .fetch_add(result.bytes_promoted as u64, Ordering::Relaxed);
        stats
            .weak_callbacks_fired
            .fetch_add(result.weak_fired as u64, Ordering::Relaxed);

        if trace {
            eprintln!(
                "gc: {:?} cycle, {} objects / {} bytes evacuated, {} promoted, {} weak fired, {:?}",
                space_kind,
                result.objects_evacuated,
                result.bytes_evacuated,
                result.objects_promoted,
                result.weak_fired,
                elapsed,
            );
        }

        result
    }

    /// Enqueue a reached value with its back-slot.
    #[inline]
    fn push_grey(&mut self, value: Value, slot: *mut Value) {
        self.grey.push_back(GreyItem {
            value: value.raw(),
            slot,
        });
    }

    /// Drain the grey list.
    #[allow(clippy::too_many_arguments)]
    unsafe fn process_grey(
        &mut self,
        heap: &mut Heap,
        tmp: &mut Space,
        model: &dyn ObjectModel,
        kind: NeedsGc,
        threshold: u32,
        result: &mut CollectionResult,
    ) {
        while let Some(item) = self.grey.pop_front() {
            // Nil, unboxed integers and non-heap sentinels are not objects.
            if !is_traceable_word(item.value) {
                continue;
            }
            let addr = item.value as *mut u8;

            // SAFETY: traceable grey entries point at live boxed objects;
            // evacuated ones still carry their headers until the swap.
            unsafe {
                if is_gc_marked(addr) {
                    relocate(item.slot, gc_mark(addr));
                    continue;
                }

                if !in_collected_space(addr, kind, threshold) {
                    // Trace through, but do not move: a young cycle still
                    // has to follow pointers that pass through old space.
                    if !is_soft_marked(addr) {
                        set_soft_mark(addr);
                        self.black.push(addr);
                        model.visit_children(addr, &mut GreyPusher { grey: &mut self.grey });
                    }
                    continue;
                }

                // Evacuate.
                let size = model.size_of(addr);
                let new_generation = generation_of(addr) + 1;
                let promote =
                    kind == NeedsGc::NewSpace && new_generation >= threshold;

                let target: &mut Space = if kind == NeedsGc::OldSpace {
                    &mut *tmp
                } else if promote {
                    heap.old_space_mut()
                } else {
                    &mut *tmp
                };

                let new_addr = target.allocate(size);
                std::ptr::copy_nonoverlapping(addr, new_addr, size);
                set_generation(new_addr, new_generation);
                set_gc_mark(addr, new_addr);
                relocate(item.slot, new_addr);

                result.objects_evacuated += 1;
                result.bytes_evacuated += size;
                if promote {
                    result.objects_promoted += 1;
                    result.bytes_promoted += size;
                }

                // Children are scanned in the copy: their slots live there.
                model.visit_children(new_addr, &mut GreyPusher { grey: &mut self.grey });
            }
        }
    }

    /// Walk the mutator stack, tracing every tagged frame slot.
    ///
    /// See `ember_core::layout` for the frame contract. A frame carrying
    /// the call-prelude marker is transitioning into a native trampoline;
    /// its recorded link points at the next mutator frame directly.
    #[allow(clippy::too_many_arguments)]
    unsafe fn walk_frames(
        &mut self,
        current_frame: *mut u8,
        heap: &mut Heap,
        tmp: &mut Space,
        model: &dyn ObjectModel,
        kind: NeedsGc,
        threshold: u32,
        result: &mut CollectionResult,
    ) {
        let mut frame = current_frame;
        loop {
            // SAFETY: the caller vouches for the frame contract; every
            // read below stays within the live stack region.
            unsafe {
                let count_word =
                    (frame.offset(FRAME_SLOT_COUNT_OFFSET) as *const u32).read();
                let slots = (count_word >> FRAME_SLOT_COUNT_SHIFT) as usize;

                // Resolve the next frame, skipping native trampolines.
                let mut next = frame;
                while !next.is_null()
                    && (next.offset(FRAME_PRELUDE_MARKER_OFFSET) as *const u32).read()
                        == CALL_PRELUDE_MARKER
                {
                    next = (next.offset(FRAME_TRAMPOLINE_LINK_OFFSET) as *const *mut u8).read();
                }
                if next == frame {
                    next = (frame as *const *mut u8).read();
                }

                for i in 0..slots {
                    let slot = frame
                        .offset(FRAME_FIRST_SLOT_OFFSET - (i * WORD_SIZE) as isize)
                        as *mut Value;
                    let value = slot.read();

                    // Skip nil, unboxed integers and saved machine words.
                    if value.is_nil() || value.is_unboxed() {
                        continue;
                    }

                    self.push_grey(value, slot);
                    self.process_grey(heap, tmp, model, kind, threshold, result);
                }

                if next.is_null() {
                    break;
                }
                frame = next;
            }
        }
    }

    /// Notify weak references: rewrite the moved, bury the dead.
    fn process_weak(&mut self, heap: &mut Heap, kind: NeedsGc, threshold: u32) -> usize {
        let mut dead = Vec::new();

        for (&key, entry) in heap.handles_mut().weak.iter_mut() {
            // SAFETY: registration keeps weak slots valid.
            let word = unsafe { entry.slot.read() }.raw();
            if !is_traceable_word(word) {
                continue;
            }
            let target = word as *mut u8;
            // SAFETY: traceable weak targets are heap objects whose
            // headers survive until the swap.
            unsafe {
                if is_gc_marked(target) {
                    entry.slot.write(Value::from_addr(gc_mark(target)));
                } else if in_collected_space(target, kind, threshold) {
                    dead.push(key);
                }
            }
        }

        let fired = dead.len();
        for key in dead {
            let mut entry = heap
                .handles_mut()
                .weak
                .remove(&key)
                .expect("weak entry vanished mid-cycle");
            // The dead value stays readable until the space swap.
            let value = unsafe { entry.slot.read() };
            (entry.callback)(value);
        }
        fired
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracer that feeds child slots back onto the grey list.
struct GreyPusher<'a> {
    grey: &'a mut VecDeque<GreyItem>,
}

impl Tracer for GreyPusher<'_> {
    #[inline]
    fn trace_slot(&mut self, slot: *mut Value) {
        // SAFETY: the object model reports only valid tagged slots.
        let value = unsafe { slot.read() };
        self.grey.push_back(GreyItem {
            value: value.raw(),
            slot,
        });
    }
}

/// Membership in the collected space is a generation compare, never an
/// address check: old-tenured objects start at the threshold and
/// generations only grow.
#[inline]
unsafe fn in_collected_space(addr: *const u8, kind: NeedsGc, threshold: u32) -> bool {
    // SAFETY: caller guarantees a live object header.
    let generation = unsafe { generation_of(addr) };
    match kind {
        NeedsGc::NewSpace => generation < threshold,
        NeedsGc::OldSpace => generation >= threshold,
        NeedsGc::None => false,
    }
}

/// Rewrite a back-slot to an evacuated object's new address.
#[inline]
unsafe fn relocate(slot: *mut Value, forward: *mut u8) {
    if !slot.is_null() {
        // SAFETY: caller guarantees slot validity.
        unsafe { slot.write(Value::from_addr(forward)) };
    }
}

/// Rewrite a slot only if its target carries a forwarding mark.
#[inline]
unsafe fn relocate_if_marked(slot: *mut Value) {
    // SAFETY: caller guarantees slot validity.
    let word = unsafe { slot.read() }.raw();
    if !is_traceable_word(word) {
        return;
    }
    let target = word as *mut u8;
    // SAFETY: traceable words point at objects with intact headers.
    unsafe {
        if is_gc_marked(target) {
            relocate(slot, gc_mark(target));
        }
    }
}
