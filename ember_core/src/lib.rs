//! Core types shared by every layer of the Ember runtime.
//!
//! This crate is the leaf of the workspace: it has no internal dependencies
//! and holds the things that must be agreed on by the heap, the collector,
//! the object views, and generated code alike:
//!
//! - [`Value`]: the 8-byte tagged mutator word (unboxed small integer or
//!   boxed heap address)
//! - [`layout`]: every byte offset, tag, header bit and magic sentinel of
//!   the object model, centralised in one module
//! - [`hash`]: the content hash used for property keys and interning
//! - [`error`]: the runtime error taxonomy and its string mapping

#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod hash;
pub mod layout;
pub mod value;

pub use error::Error;
pub use layout::HeapTag;
pub use value::Value;
