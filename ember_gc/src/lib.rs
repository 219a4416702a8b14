//! Ember garbage collector and paged heap.
//!
//! A stop-the-world, moving, tri-colour, generational collector for the
//! single-threaded Ember mutator.
//!
//! # Architecture
//!
//! The heap owns two [`heap::Space`]s of bump-allocated pages:
//!
//! - **New space**: every ordinary allocation lands here with generation 0.
//! - **Old space**: objects whose generation reaches the tenuring threshold
//!   are promoted here during evacuation; interned constants are allocated
//!   here directly, already at the threshold.
//!
//! A collection copies the live part of one space into a temporary
//! to-space (or, for tenured survivors of a new-space cycle, into the old
//! space), then swaps the to-space in and drops the from-space pages.
//! Space membership is a generation compare, never an address-range check.
//!
//! # Safe points
//!
//! Allocation never runs the collector. A space that outgrows its soft
//! limit raises the heap's needs-gc flag; the mutator polls the flag at
//! safe points (allocation entry, function prologues, explicit requests)
//! and enters [`Collector::collect`] synchronously.
//!
//! # Roots
//!
//! - persistent external handles (traced and rewritten),
//! - the mutator stack, walked frame by frame against the layout contract,
//! - the factory slot.
//!
//! Normal handles and relocation-table slots are rewritten after
//! evacuation without keeping their targets alive; weak handles get their
//! callback fired when the target dies.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod collector;
pub mod config;
pub mod handles;
pub mod heap;
pub mod reloc;
pub mod stats;
pub mod trace;

pub use collector::{CollectionResult, Collector};
pub use config::HeapConfig;
pub use handles::{HandleKind, HandleTable, WeakCallback};
pub use heap::{Heap, Space, Tenure};
pub use reloc::RelocationTable;
pub use stats::GcStats;
pub use trace::{NullObjectModel, ObjectModel, Tracer};

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Which space, if any, the next safe point must collect.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeedsGc {
    /// No collection pending.
    None = 0,
    /// The new space crossed its soft limit.
    NewSpace = 1,
    /// The old space crossed its soft limit.
    OldSpace = 2,
}

/// Which generation a space backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceKind {
    /// Young generation.
    New,
    /// Tenured generation.
    Old,
}

impl SpaceKind {
    /// The flag value an over-limit space of this kind raises.
    #[inline]
    pub fn gc_request(self) -> NeedsGc {
        match self {
            SpaceKind::New => NeedsGc::NewSpace,
            SpaceKind::Old => NeedsGc::OldSpace,
        }
    }
}

/// Shared needs-gc cell, held by the heap and cloned into each space so
/// allocation can raise it without reaching back through the heap.
#[derive(Debug, Clone)]
pub struct GcFlag(Arc<AtomicU8>);

impl GcFlag {
    /// Create a cleared flag.
    pub fn new() -> Self {
        GcFlag(Arc::new(AtomicU8::new(NeedsGc::None as u8)))
    }

    /// Read the pending request.
    #[inline]
    pub fn get(&self) -> NeedsGc {
        match self.0.load(Ordering::Relaxed) {
            1 => NeedsGc::NewSpace,
            2 => NeedsGc::OldSpace,
            _ => NeedsGc::None,
        }
    }

    /// Overwrite the pending request.
    #[inline]
    pub fn set(&self, value: NeedsGc) {
        self.0.store(value as u8, Ordering::Relaxed);
    }

    /// Raise a request for the given space unless one is already pending.
    /// The first request wins; the collector re-arms after each cycle.
    #[inline]
    pub fn request(&self, kind: SpaceKind) {
        let _ = self.0.compare_exchange(
            NeedsGc::None as u8,
            kind.gc_request() as u8,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }
}

impl Default for GcFlag {
    fn default() -> Self {
        Self::new()
    }
}
