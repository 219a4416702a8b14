//! Ember runtime object model.
//!
//! Everything above the collector and below the compiler:
//!
//! - [`values`]: non-owning typed views over boxed heap objects
//! - [`object_model`]: the tag-dispatching [`ember_gc::ObjectModel`] impl
//! - [`property`]: the open-addressed object property path
//! - [`factory`]: content interning for canonical constants
//! - [`pic`]: polymorphic inline caches with emission patch sites
//! - [`frame`]: mutator stack frames obeying the collector's contract
//! - [`isolate`]: the embedder facade tying it all together

#![deny(unsafe_op_in_unsafe_fn)]

pub mod factory;
pub mod frame;
pub mod isolate;
pub mod object_model;
pub mod pic;
pub mod property;
pub mod values;

pub use factory::Factory;
pub use frame::FrameStack;
pub use isolate::Isolate;
pub use object_model::HeapObjectModel;
pub use pic::Pic;
pub use values::{
    HArray, HBoolean, HCData, HContext, HFunction, HMap, HNumber, HObject, HString, HValue,
};
