//! The embedder facade.
//!
//! An isolate owns one heap, one collector and the object model, and is
//! the single entry point an embedding works through: canonical constant
//! creation, the property path, external handles, safe-point polling and
//! the pending-exception protocol. The heap is always passed explicitly
//! below this layer; there is no ambient current-isolate state.

use crate::factory::Factory;
use crate::object_model::HeapObjectModel;
use crate::property;
use ember_core::{Error, Value};
use ember_gc::{CollectionResult, Collector, HandleKind, Heap, HeapConfig, NeedsGc, WeakCallback};
use std::ptr::NonNull;

/// One embedding of the runtime.
pub struct Isolate {
    heap: Heap,
    collector: Collector,
    model: HeapObjectModel,
}

impl Isolate {
    /// Create an isolate with the given heap configuration.
    pub fn new(config: HeapConfig) -> Isolate {
        Isolate {
            heap: Heap::new(config),
            collector: Collector::new(),
            model: HeapObjectModel::new(),
        }
    }

    /// Create an isolate with the default configuration.
    pub fn with_defaults() -> Isolate {
        Self::new(HeapConfig::default())
    }

    // =========================================================================
    // Constants
    // =========================================================================

    /// Create a canonical string constant (tenured, interned).
    pub fn new_string(&mut self, bytes: &[u8]) -> Value {
        Factory::intern_string(&mut self.heap, bytes)
    }

    /// Create a canonical boxed number constant.
    pub fn new_number(&mut self, value: f64) -> Value {
        Factory::intern_number(&mut self.heap, value)
    }

    /// Create an integer value: unboxed when it fits 63 bits, otherwise
    /// a canonical boxed double.
    pub fn new_integer(&mut self, value: i64) -> Value {
        match Value::int(value) {
            Some(tagged) => tagged,
            None => self.new_number(value as f64),
        }
    }

    /// Create a canonical boolean constant.
    pub fn new_boolean(&mut self, value: bool) -> Value {
        Factory::intern_boolean(&mut self.heap, value)
    }

    // =========================================================================
    // Property path
    // =========================================================================

    /// Read a property. Traps raise the pending exception.
    pub fn get_property(&mut self, receiver: Value, key: Value) -> Result<Value, Error> {
        property::get_property(&mut self.heap, receiver, key)
            .map_err(|error| self.throw(error))
    }

    /// Write a property. Traps raise the pending exception.
    pub fn set_property(&mut self, receiver: Value, key: Value, value: Value) -> Result<(), Error> {
        property::set_property(&mut self.heap, receiver, key, value)
            .map_err(|error| self.throw(error))
    }

    /// Record a runtime trap in the pending-exception slot.
    fn throw(&mut self, error: Error) -> Error {
        let message = Factory::intern_string(&mut self.heap, error.to_str().as_bytes());
        self.heap.set_pending_exception(message);
        error
    }

    /// The embedder-visible message for an error kind.
    pub fn error_to_string(error: Error) -> &'static str {
        error.to_str()
    }

    // =========================================================================
    // Collection
    // =========================================================================

    /// Force a collection cycle (new-space unless one is already
    /// pending), walking the given mutator stack.
    pub fn collect_garbage(&mut self, current_frame: Option<NonNull<u8>>) -> CollectionResult {
        self.collector
            .collect(&mut self.heap, &self.model, current_frame)
    }

    /// Safe-point poll: collect only when a space has requested it.
    pub fn poll_gc(&mut self, current_frame: Option<NonNull<u8>>) -> Option<CollectionResult> {
        if self.heap.needs_gc() == NeedsGc::None {
            return None;
        }
        Some(self.collect_garbage(current_frame))
    }

    // =========================================================================
    // External handles
    // =========================================================================

    /// Register a persistent or normal handle for the given storage slot.
    ///
    /// Weak handles take a callback; use
    /// [`acquire_weak`](Self::acquire_weak).
    ///
    /// # Safety
    /// `slot` must stay valid (and not move) until released.
    pub unsafe fn acquire(&mut self, kind: HandleKind, slot: NonNull<Value>) {
        match kind {
            // SAFETY: forwarded contract.
            HandleKind::Persistent => unsafe { self.heap.handles_mut().acquire_persistent(slot) },
            HandleKind::Normal => unsafe { self.heap.handles_mut().acquire_normal(slot) },
            HandleKind::Weak => panic!("weak handles require a callback; use acquire_weak"),
        }
    }

    /// Register a weak handle with a death callback.
    ///
    /// # Safety
    /// As [`acquire`](Self::acquire).
    pub unsafe fn acquire_weak(&mut self, slot: NonNull<Value>, callback: WeakCallback) {
        // SAFETY: forwarded contract.
        unsafe { self.heap.handles_mut().acquire_weak(slot, callback) }
    }

    /// Release a handle of any kind.
    pub fn release(&mut self, slot: *const Value) -> bool {
        self.heap.handles_mut().release(slot)
    }

    /// Read a handle's current value.
    ///
    /// # Safety
    /// `slot` must be a registered, live handle slot.
    pub unsafe fn read_handle(slot: *const Value) -> Value {
        // SAFETY: per the contract above.
        unsafe { slot.read() }
    }

    // =========================================================================
    // Exceptions and accessors
    // =========================================================================

    /// The pending exception, if any.
    pub fn pending_exception(&self) -> Option<Value> {
        self.heap.pending_exception()
    }

    /// Take and clear the pending exception.
    pub fn take_pending_exception(&mut self) -> Option<Value> {
        self.heap.take_pending_exception()
    }

    /// The heap.
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Mutable heap access.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }
}
