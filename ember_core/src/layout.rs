//! Centralised heap object and frame layout.
//!
//! Every byte offset, tag value, header bit assignment and magic sentinel
//! used by the heap, the collector, the object views and generated code is
//! defined here and nowhere else. The model is 64-bit little-endian.
//!
//! # Header word
//!
//! Every boxed object begins with one metadata word:
//!
//! ```text
//! bits  0..8   tag (object shape)
//! bits  8..32  representation and mark flags
//! bits 32..64  generation counter (collections survived)
//! ```
//!
//! When an object has been evacuated, its hard mark flag is set and the
//! forwarding address is recorded in the first payload word (the "mark
//! slot") — the payload is dead at that point, the slot is free.
//!
//! # Frame contract
//!
//! A call frame, as emitted by the code generator:
//!
//! ```text
//! frame + 0   previous frame pointer (null terminates the walk)
//! frame - 8   slot count, shifted left by 3 (low bits carry flags)
//! frame - 16  slot 0, then slot i at frame - 16 - 8*i
//! ```
//!
//! A frame transitioning into a native trampoline instead carries the
//! call-prelude marker at `frame + 16` and the link to the next mutator
//! frame at `frame + 24`; the walker follows the link and skips the shim.
//! A safe-point map keyed by return address would make this scan
//! unnecessary; the marker contract is what generated code emits today.

use bitflags::bitflags;

/// Machine word size in bytes; also the slot stride everywhere.
pub const WORD_SIZE: usize = 8;

// =============================================================================
// Tags
// =============================================================================

/// Object shape discriminator stored in the low 8 bits of the header.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapTag {
    /// Scope context: parent pointer plus value slots.
    Context = 0x01,
    /// Function: parent context, code address, root context, argc.
    Function = 0x02,
    /// Boxed IEEE-754 double (small integers stay unboxed).
    Number = 0x03,
    /// Boolean: one payload byte.
    Boolean = 0x04,
    /// String, normal or cons (see [`HeaderFlags::CONS_STRING`]).
    String = 0x05,
    /// Object: mask, map pointer, proto pointer.
    Object = 0x06,
    /// Array: object payload plus a length word.
    Array = 0x07,
    /// Map: capacity plus interleaved key/value pairs.
    Map = 0x08,
    /// Opaque embedder data: size plus raw bytes.
    CData = 0x09,
}

impl HeapTag {
    /// Decode a tag byte. Returns `None` for an unknown tag.
    #[inline]
    pub const fn from_u8(byte: u8) -> Option<HeapTag> {
        match byte {
            0x01 => Some(HeapTag::Context),
            0x02 => Some(HeapTag::Function),
            0x03 => Some(HeapTag::Number),
            0x04 => Some(HeapTag::Boolean),
            0x05 => Some(HeapTag::String),
            0x06 => Some(HeapTag::Object),
            0x07 => Some(HeapTag::Array),
            0x08 => Some(HeapTag::Map),
            0x09 => Some(HeapTag::CData),
            _ => None,
        }
    }
}

bitflags! {
    /// Representation and mark flags, header bits 8..32.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HeaderFlags: u32 {
        /// Object has been evacuated; the mark slot holds the forwarding
        /// address.
        const GC_MARK = 1 << 0;
        /// Object outside the collected space has been visited this cycle.
        const SOFT_MARK = 1 << 1;
        /// String is a cons pair rather than inline bytes.
        const CONS_STRING = 1 << 2;
    }
}

/// Bit position of the flags field within the header word.
const FLAGS_SHIFT: u32 = 8;
/// Bit position of the generation counter within the header word.
const GENERATION_SHIFT: u32 = 32;
/// Width mask for the flags field.
const FLAGS_MASK: u64 = 0xffff_ff00;

// =============================================================================
// Sentinels
// =============================================================================

/// Proto value meaning "inline caching disabled for this object".
///
/// Looks like a boxed address but never points into the heap; the object
/// model and the root registries must never trace through it.
pub const IC_DISABLED_SENTINEL: u64 = 0x0DEC_0DE0;

/// Parent-context sentinel carried by top-level functions.
///
/// Marks a function as bound to the global scope. Must never be followed.
pub const BINDING_CONTEXT_SENTINEL: u64 = 0x0DEA_DC0D_E0E0;

/// Check whether a raw value word may be traced as a heap reference.
///
/// Rejects nil, unboxed integers and the two non-heap sentinels.
#[inline]
pub const fn is_traceable_word(word: u64) -> bool {
    word != 0
        && word & 1 == 0
        && word != IC_DISABLED_SENTINEL
        && word != BINDING_CONTEXT_SENTINEL
}

// =============================================================================
// Payload offsets (bytes from the object address)
// =============================================================================

/// Header word.
pub const HEADER_OFFSET: usize = 0;
/// Forwarding address of an evacuated object (first payload word).
pub const MARK_SLOT_OFFSET: usize = 8;

/// Context: parent context pointer.
pub const CONTEXT_PARENT_OFFSET: usize = 8;
/// Context: number of value slots.
pub const CONTEXT_SLOT_COUNT_OFFSET: usize = 16;
/// Context: first value slot.
pub const CONTEXT_SLOTS_OFFSET: usize = 24;

/// Function: parent context pointer.
pub const FUNCTION_PARENT_OFFSET: usize = 8;
/// Function: entry address in the code space (raw, never traced).
pub const FUNCTION_CODE_OFFSET: usize = 16;
/// Function: root (module) context pointer.
pub const FUNCTION_ROOT_OFFSET: usize = 24;
/// Function: declared argument count.
pub const FUNCTION_ARGC_OFFSET: usize = 32;
/// Function: total object size.
pub const FUNCTION_SIZE: usize = 40;

/// Number: boxed IEEE-754 double.
pub const NUMBER_VALUE_OFFSET: usize = 8;
/// Number: total object size.
pub const NUMBER_SIZE: usize = 16;

/// Boolean: payload byte, 0 or 1.
pub const BOOLEAN_VALUE_OFFSET: usize = 8;
/// Boolean: total object size.
pub const BOOLEAN_SIZE: usize = 16;

/// String: cached 32-bit hash, zero-padded to a word. 0 = not computed.
pub const STRING_HASH_OFFSET: usize = 8;
/// String: byte length (for a cons, the sum of both children).
pub const STRING_LENGTH_OFFSET: usize = 16;
/// Normal string: first inline byte.
pub const STRING_BYTES_OFFSET: usize = 24;
/// Cons string: left child.
pub const STRING_LEFT_OFFSET: usize = 24;
/// Cons string: right child (nil once the left holds the flattened copy).
pub const STRING_RIGHT_OFFSET: usize = 32;
/// Cons string: total object size.
pub const CONS_STRING_SIZE: usize = 40;

/// Object: `(capacity - 1) * WORD_SIZE`, the probe mask used by machine
/// code to derive a slot index from a key hash without branching.
pub const OBJECT_MASK_OFFSET: usize = 8;
/// Object: pointer to the separately allocated map.
pub const OBJECT_MAP_OFFSET: usize = 16;
/// Object: prototype identity used by inline caches.
pub const OBJECT_PROTO_OFFSET: usize = 24;
/// Object: total object size.
pub const OBJECT_SIZE: usize = 32;
/// Array: element count, one word past the object payload.
pub const ARRAY_LENGTH_OFFSET: usize = 32;
/// Array: total object size.
pub const ARRAY_SIZE: usize = 40;

/// Map: slot pair capacity.
pub const MAP_CAPACITY_OFFSET: usize = 8;
/// Map: first (key, value) pair; pair `i` at `MAP_PAIRS_OFFSET + i * 16`.
pub const MAP_PAIRS_OFFSET: usize = 16;
/// Byte size of one interleaved (key, value) pair.
pub const MAP_PAIR_SIZE: usize = 16;

/// C-data: payload byte length.
pub const CDATA_SIZE_OFFSET: usize = 8;
/// C-data: first raw byte.
pub const CDATA_BYTES_OFFSET: usize = 16;

// =============================================================================
// Frame contract
// =============================================================================

/// Previous frame pointer, at the frame address itself.
pub const FRAME_PREV_OFFSET: isize = 0;
/// Slot-count word (`count << FRAME_SLOT_COUNT_SHIFT`), below the frame.
pub const FRAME_SLOT_COUNT_OFFSET: isize = -8;
/// First tagged slot; slot `i` at `FRAME_FIRST_SLOT_OFFSET - 8 * i`.
pub const FRAME_FIRST_SLOT_OFFSET: isize = -16;
/// Call-prelude marker location, relative to a frame entering a trampoline.
pub const FRAME_PRELUDE_MARKER_OFFSET: isize = 16;
/// Trampoline link to the next mutator frame.
pub const FRAME_TRAMPOLINE_LINK_OFFSET: isize = 24;
/// The slot count is stored shifted so its low bits can carry flags.
pub const FRAME_SLOT_COUNT_SHIFT: u32 = 3;
/// 32-bit marker identifying a native-trampoline transition.
pub const CALL_PRELUDE_MARKER: u32 = 0xFEED_BEEF;

// =============================================================================
// Header accessors
// =============================================================================

/// Compose a fresh header word.
#[inline]
pub const fn make_header(tag: HeapTag, generation: u32) -> u64 {
    (tag as u64) | ((generation as u64) << GENERATION_SHIFT)
}

/// Read the raw header word.
///
/// # Safety
/// `addr` must point to a live boxed object.
#[inline]
pub unsafe fn header(addr: *const u8) -> u64 {
    unsafe { (addr as *const u64).read() }
}

/// Read the object's tag. Panics on a corrupt tag byte.
///
/// # Safety
/// `addr` must point to a live boxed object.
#[inline]
pub unsafe fn tag_of(addr: *const u8) -> HeapTag {
    let byte = unsafe { header(addr) } as u8;
    HeapTag::from_u8(byte).expect("corrupt heap tag")
}

/// Read the generation counter.
///
/// # Safety
/// `addr` must point to a live boxed object.
#[inline]
pub unsafe fn generation_of(addr: *const u8) -> u32 {
    (unsafe { header(addr) } >> GENERATION_SHIFT) as u32
}

/// Overwrite the generation counter, preserving tag and flags.
///
/// # Safety
/// `addr` must point to a live boxed object.
#[inline]
pub unsafe fn set_generation(addr: *mut u8, generation: u32) {
    let word = unsafe { header(addr) } & 0xffff_ffff;
    unsafe { (addr as *mut u64).write(word | ((generation as u64) << GENERATION_SHIFT)) }
}

/// Read the flags field.
///
/// # Safety
/// `addr` must point to a live boxed object.
#[inline]
pub unsafe fn flags_of(addr: *const u8) -> HeaderFlags {
    let bits = ((unsafe { header(addr) } & FLAGS_MASK) >> FLAGS_SHIFT) as u32;
    HeaderFlags::from_bits_truncate(bits)
}

/// Set one or more flag bits.
///
/// # Safety
/// `addr` must point to a live boxed object.
#[inline]
pub unsafe fn set_flags(addr: *mut u8, flags: HeaderFlags) {
    let word = unsafe { header(addr) } | ((flags.bits() as u64) << FLAGS_SHIFT);
    unsafe { (addr as *mut u64).write(word) }
}

/// Clear one or more flag bits.
///
/// # Safety
/// `addr` must point to a live boxed object.
#[inline]
pub unsafe fn clear_flags(addr: *mut u8, flags: HeaderFlags) {
    let word = unsafe { header(addr) } & !((flags.bits() as u64) << FLAGS_SHIFT);
    unsafe { (addr as *mut u64).write(word) }
}

/// Check the hard (evacuated) mark.
///
/// # Safety
/// `addr` must point to a live boxed object.
#[inline]
pub unsafe fn is_gc_marked(addr: *const u8) -> bool {
    unsafe { flags_of(addr) }.contains(HeaderFlags::GC_MARK)
}

/// Install the hard mark and record the forwarding address in the mark
/// slot. The payload is dead once this is called.
///
/// # Safety
/// `addr` must point to a boxed object whose payload has been copied out.
#[inline]
pub unsafe fn set_gc_mark(addr: *mut u8, forward: *const u8) {
    unsafe {
        set_flags(addr, HeaderFlags::GC_MARK);
        (addr.add(MARK_SLOT_OFFSET) as *mut u64).write(forward as u64);
    }
}

/// Read the forwarding address of a hard-marked object.
///
/// # Safety
/// `addr` must point to a hard-marked boxed object.
#[inline]
pub unsafe fn gc_mark(addr: *const u8) -> *mut u8 {
    debug_assert!(unsafe { is_gc_marked(addr) });
    unsafe { (addr.add(MARK_SLOT_OFFSET) as *const u64).read() as *mut u8 }
}

/// Check the soft (visited-only) mark.
///
/// # Safety
/// `addr` must point to a live boxed object.
#[inline]
pub unsafe fn is_soft_marked(addr: *const u8) -> bool {
    unsafe { flags_of(addr) }.contains(HeaderFlags::SOFT_MARK)
}

/// Set the soft mark.
///
/// # Safety
/// `addr` must point to a live boxed object.
#[inline]
pub unsafe fn set_soft_mark(addr: *mut u8) {
    unsafe { set_flags(addr, HeaderFlags::SOFT_MARK) }
}

/// Clear the soft mark.
///
/// # Safety
/// `addr` must point to a live boxed object.
#[inline]
pub unsafe fn reset_soft_mark(addr: *mut u8) {
    unsafe { clear_flags(addr, HeaderFlags::SOFT_MARK) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let mut word = [0u64; 2];
        let addr = word.as_mut_ptr() as *mut u8;
        unsafe {
            (addr as *mut u64).write(make_header(HeapTag::String, 3));
            assert_eq!(tag_of(addr), HeapTag::String);
            assert_eq!(generation_of(addr), 3);
            assert!(flags_of(addr).is_empty());
        }
    }

    #[test]
    fn test_flags_do_not_clobber_tag_or_generation() {
        let mut word = [0u64; 2];
        let addr = word.as_mut_ptr() as *mut u8;
        unsafe {
            (addr as *mut u64).write(make_header(HeapTag::Object, 7));
            set_flags(addr, HeaderFlags::SOFT_MARK | HeaderFlags::CONS_STRING);
            assert_eq!(tag_of(addr), HeapTag::Object);
            assert_eq!(generation_of(addr), 7);
            assert!(is_soft_marked(addr));

            reset_soft_mark(addr);
            assert!(!is_soft_marked(addr));
            assert!(flags_of(addr).contains(HeaderFlags::CONS_STRING));
        }
    }

    #[test]
    fn test_gc_mark_records_forwarding() {
        let mut words = [0u64; 2];
        let addr = words.as_mut_ptr() as *mut u8;
        unsafe {
            (addr as *mut u64).write(make_header(HeapTag::Number, 0));
            assert!(!is_gc_marked(addr));

            let forward = 0x4000usize as *const u8;
            set_gc_mark(addr, forward);
            assert!(is_gc_marked(addr));
            assert_eq!(gc_mark(addr), forward as *mut u8);
        }
    }

    #[test]
    fn test_generation_update() {
        let mut word = [0u64; 2];
        let addr = word.as_mut_ptr() as *mut u8;
        unsafe {
            (addr as *mut u64).write(make_header(HeapTag::Context, 0));
            set_generation(addr, 1);
            assert_eq!(generation_of(addr), 1);
            set_generation(addr, 6);
            assert_eq!(generation_of(addr), 6);
            assert_eq!(tag_of(addr), HeapTag::Context);
        }
    }

    #[test]
    fn test_traceable_word() {
        assert!(!is_traceable_word(0));
        assert!(!is_traceable_word(0x1001));
        assert!(!is_traceable_word(IC_DISABLED_SENTINEL));
        assert!(!is_traceable_word(BINDING_CONTEXT_SENTINEL));
        assert!(is_traceable_word(0x1000));
    }

    #[test]
    fn test_sentinels_look_boxed() {
        // Both sentinels must survive being stored in tagged slots.
        assert_eq!(IC_DISABLED_SENTINEL & 1, 0);
        assert_eq!(BINDING_CONTEXT_SENTINEL & 1, 0);
    }

    #[test]
    fn test_tag_decode() {
        assert_eq!(HeapTag::from_u8(0x05), Some(HeapTag::String));
        assert_eq!(HeapTag::from_u8(0x00), None);
        assert_eq!(HeapTag::from_u8(0xff), None);
    }
}
