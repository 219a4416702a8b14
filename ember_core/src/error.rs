//! Runtime error taxonomy.
//!
//! Three classes of failure cross the runtime boundary:
//!
//! - *Compile-time* errors are produced by the front end and surfaced to
//!   the embedder as strings through [`Error::to_str`].
//! - *Allocation* failure is fatal; the page allocator aborts.
//! - *Runtime traps* are raised by generated code through the heap's
//!   pending-exception slot and polled on return. Only these are
//!   recoverable.

use std::fmt;

/// Every error kind the runtime can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Assignment target is not a variable or property.
    IncorrectLhs,
    /// Call syntax applied to something that is not a variable.
    CallWithoutVariable,
    /// `break`/`continue` outside of a loop.
    ExpectedLoop,
    /// The allocator could not grow a space.
    OutOfMemory,
    /// Call of a value that is not a function.
    NonCallable,
    /// Property access on nil.
    PropertyOfNil,
}

impl Error {
    /// Map an error kind to its embedder-visible message.
    pub const fn to_str(self) -> &'static str {
        match self {
            Error::IncorrectLhs => "incorrect left-hand side of assignment",
            Error::CallWithoutVariable => "call of a non-variable expression",
            Error::ExpectedLoop => "break or continue outside of a loop",
            Error::OutOfMemory => "out of memory",
            Error::NonCallable => "called value is not a function",
            Error::PropertyOfNil => "cannot read property of nil",
        }
    }

    /// Runtime traps may be caught by the embedder; everything else
    /// aborts the current operation.
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Error::NonCallable | Error::PropertyOfNil)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

impl std::error::Error for Error {}
