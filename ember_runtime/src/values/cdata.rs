//! Opaque embedder data blobs.

use crate::values::{read_word, value_tag, write_word};
use ember_core::layout::{CDATA_BYTES_OFFSET, CDATA_SIZE_OFFSET, HeapTag, WORD_SIZE};
use ember_core::Value;
use ember_gc::{Heap, Tenure};

/// A raw byte blob owned by the heap but opaque to the runtime.
/// The collector copies it wholesale and never traces into it.
#[derive(Debug, Clone, Copy)]
pub struct HCData {
    addr: *mut u8,
}

impl HCData {
    /// Allocate a zeroed blob of `size` bytes.
    pub fn new(heap: &mut Heap, tenure: Tenure, size: usize) -> HCData {
        let bytes = CDATA_BYTES_OFFSET - WORD_SIZE + size;
        let addr = heap.allocate_tagged(HeapTag::CData, tenure, bytes);
        // SAFETY: addr is a fresh c-data object; payload arrives zeroed.
        unsafe { write_word(addr, CDATA_SIZE_OFFSET, size as u64) };
        HCData { addr }
    }

    /// View a value as a blob.
    #[inline]
    pub fn cast(value: Value) -> Option<HCData> {
        if value_tag(value) == Some(HeapTag::CData) {
            Some(HCData {
                addr: value.raw() as *mut u8,
            })
        } else {
            None
        }
    }

    /// Payload size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        // SAFETY: the view wraps a live blob.
        unsafe { read_word(self.addr, CDATA_SIZE_OFFSET) as usize }
    }

    /// The payload bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        // SAFETY: size() bytes follow CDATA_BYTES_OFFSET by construction.
        unsafe { std::slice::from_raw_parts(self.addr.add(CDATA_BYTES_OFFSET), self.size()) }
    }

    /// The payload bytes, writable.
    #[inline]
    pub fn data_mut(&self) -> &mut [u8] {
        // SAFETY: as data(); the runtime is single-threaded.
        unsafe { std::slice::from_raw_parts_mut(self.addr.add(CDATA_BYTES_OFFSET), self.size()) }
    }

    /// The underlying tagged word.
    #[inline]
    pub fn as_value(&self) -> Value {
        Value::from_addr(self.addr)
    }
}
