//! Function objects.

use crate::values::{read_value, read_word, value_tag, write_value, write_word};
use ember_core::layout::{
    BINDING_CONTEXT_SENTINEL, FUNCTION_ARGC_OFFSET, FUNCTION_CODE_OFFSET, FUNCTION_PARENT_OFFSET,
    FUNCTION_ROOT_OFFSET, FUNCTION_SIZE, HeapTag, WORD_SIZE,
};
use ember_core::Value;
use ember_gc::{Heap, Tenure};

/// A function: captured parent context, raw code address, root (module)
/// context and declared argument count.
///
/// The code address points into the code space, which the moving
/// collector never sweeps; it is a raw word, not a tagged value.
#[derive(Debug, Clone, Copy)]
pub struct HFunction {
    addr: *mut u8,
}

impl HFunction {
    /// Allocate a function.
    pub fn new(
        heap: &mut Heap,
        tenure: Tenure,
        parent: Value,
        code: u64,
        root: Value,
        argc: u32,
    ) -> HFunction {
        let addr = heap.allocate_tagged(HeapTag::Function, tenure, FUNCTION_SIZE - WORD_SIZE);
        // SAFETY: addr is a fresh function object.
        unsafe {
            write_value(addr, FUNCTION_PARENT_OFFSET, parent);
            write_word(addr, FUNCTION_CODE_OFFSET, code);
            write_value(addr, FUNCTION_ROOT_OFFSET, root);
            write_word(addr, FUNCTION_ARGC_OFFSET, argc as u64);
        }
        HFunction { addr }
    }

    /// Allocate a top-level function: its parent is the binding-context
    /// sentinel, never to be followed.
    pub fn new_bound(heap: &mut Heap, tenure: Tenure, code: u64, root: Value, argc: u32) -> Self {
        Self::new(
            heap,
            tenure,
            Value::from_raw(BINDING_CONTEXT_SENTINEL),
            code,
            root,
            argc,
        )
    }

    /// View a value as a function.
    #[inline]
    pub fn cast(value: Value) -> Option<HFunction> {
        if value_tag(value) == Some(HeapTag::Function) {
            Some(HFunction {
                addr: value.raw() as *mut u8,
            })
        } else {
            None
        }
    }

    /// The captured parent context (or the binding sentinel).
    #[inline]
    pub fn parent(&self) -> Value {
        // SAFETY: the view wraps a live function.
        unsafe { read_value(self.addr, FUNCTION_PARENT_OFFSET) }
    }

    /// Whether this function is bound to the global scope.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.parent().raw() == BINDING_CONTEXT_SENTINEL
    }

    /// Entry address in the code space.
    #[inline]
    pub fn code(&self) -> u64 {
        // SAFETY: the view wraps a live function.
        unsafe { read_word(self.addr, FUNCTION_CODE_OFFSET) }
    }

    /// The root (module) context.
    #[inline]
    pub fn root(&self) -> Value {
        // SAFETY: the view wraps a live function.
        unsafe { read_value(self.addr, FUNCTION_ROOT_OFFSET) }
    }

    /// Declared argument count.
    #[inline]
    pub fn argc(&self) -> u32 {
        // SAFETY: the view wraps a live function.
        unsafe { read_word(self.addr, FUNCTION_ARGC_OFFSET) as u32 }
    }

    /// The underlying tagged word.
    #[inline]
    pub fn as_value(&self) -> Value {
        Value::from_addr(self.addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::HContext;

    #[test]
    fn test_function_fields() {
        let mut heap = Heap::with_defaults();
        let root = HContext::new(&mut heap, Tenure::New, &[]);
        let parent = HContext::new(&mut heap, Tenure::New, &[]);
        let f = HFunction::new(
            &mut heap,
            Tenure::New,
            parent.as_value(),
            0xdead_0000,
            root.as_value(),
            2,
        );

        assert_eq!(f.parent(), parent.as_value());
        assert_eq!(f.code(), 0xdead_0000);
        assert_eq!(f.root(), root.as_value());
        assert_eq!(f.argc(), 2);
        assert!(!f.is_bound());
    }

    #[test]
    fn test_bound_function_sentinel() {
        let mut heap = Heap::with_defaults();
        let root = HContext::new(&mut heap, Tenure::New, &[]);
        let f = HFunction::new_bound(&mut heap, Tenure::New, 0x1000, root.as_value(), 0);
        assert!(f.is_bound());
        assert_eq!(f.parent().raw(), BINDING_CONTEXT_SENTINEL);
    }
}
