//! Record Decoder - Frame Descriptor Records
//!
//! A frame descriptor is one variable-length binary record emitted by the
//! code generator for each call site. It names the stack slots holding live
//! heap references when execution is at that return address, so the stack
//! walker can scan frames precisely instead of conservatively.
//!
//! ## Record layout
//!
//! Records are packed back to back inside a frametable blob, each starting at
//! pointer-width alignment:
//!
//! ```text
//! ┌──────────────┬──────────┬───────────────────┬───────────────┬─────────────┬─────┐
//! │ key word     │ num_live │ live offsets      │ alloc lengths │ debug words │ pad │
//! │ usize        │ u16      │ num_live × u16    │ u8 count + N  │ N × u32     │     │
//! │              │          │                   │ (optional)    │ (optional,  │     │
//! │              │          │                   │               │  4-aligned) │     │
//! └──────────────┴──────────┴───────────────────┴───────────────┴─────────────┴─────┘
//! ```
//!
//! The key word is the return address with three flag bits folded into its
//! low bits (return addresses are at least 8-byte aligned, so those bits are
//! free). Hashing and key comparison always use the masked address.
//!
//! A record with zero live slots and [`FLAG_RETURN_TO_NATIVE`] set marks the
//! top boundary of a managed stack chunk; it carries no payload beyond the
//! header and its alloc/debug flags are ignored.
//!
//! This module only locates record boundaries. It never interprets the
//! live-offset table or the debug words; malformed blobs are a precondition
//! violation by the code generator, not a handled error.

use std::fmt;
use std::mem;

use crate::util::align_up;

/// Key-word flag: a count-prefixed run of allocation-length bytes follows the
/// live-offset array.
pub const FLAG_HAS_ALLOCS: usize = 0b001;
/// Key-word flag: 32-bit debug words follow the allocation lengths.
pub const FLAG_HAS_DEBUG: usize = 0b010;
/// Key-word flag: this record marks the top of a managed stack chunk.
pub const FLAG_RETURN_TO_NATIVE: usize = 0b100;
/// All flag bits carried in a record's key word.
pub const FLAG_MASK: usize = 0b111;

/// View over one frame descriptor record inside a frametable blob.
///
/// This is a header-only `repr(C)` type; the variable-length payload lives
/// directly behind it in the blob. References are only ever produced from
/// registered frametables, and stay valid until the containing frametable is
/// unregistered.
#[repr(C)]
pub struct FrameDescriptor {
    key: usize,
    num_live: u16,
    live_offsets: [u16; 0],
}

impl FrameDescriptor {
    /// The raw key word, flags included.
    #[inline]
    pub fn key_word(&self) -> usize {
        self.key
    }

    /// The return address this record describes, with flag bits stripped.
    #[inline]
    pub fn retaddr(&self) -> usize {
        self.key & !FLAG_MASK
    }

    /// Whether allocation-length bytes follow the live-offset array.
    #[inline]
    pub fn has_allocs(&self) -> bool {
        self.key & FLAG_HAS_ALLOCS != 0
    }

    /// Whether 32-bit debug words are present.
    #[inline]
    pub fn has_debug(&self) -> bool {
        self.key & FLAG_HAS_DEBUG != 0
    }

    /// Whether this record marks the top boundary of a managed stack chunk.
    #[inline]
    pub fn returns_to_native(&self) -> bool {
        self.key & FLAG_RETURN_TO_NATIVE != 0
    }

    /// Number of live stack slots at this call site.
    #[inline]
    pub fn num_live(&self) -> usize {
        self.num_live as usize
    }

    #[inline]
    fn offsets_base(&self) -> usize {
        self as *const FrameDescriptor as usize + mem::offset_of!(FrameDescriptor, live_offsets)
    }

    /// The live stack-slot offsets for this call site.
    pub fn live_offsets(&self) -> &[u16] {
        unsafe {
            std::slice::from_raw_parts(self.offsets_base() as *const u16, self.num_live())
        }
    }

    /// Allocation-length bytes, empty when the record carries none.
    ///
    /// Boundary markers report an empty slice regardless of their flag bits.
    pub fn alloc_lengths(&self) -> &[u8] {
        if self.returns_to_native() || !self.has_allocs() {
            return &[];
        }
        unsafe {
            let prefix = (self.offsets_base() + self.num_live() * mem::size_of::<u16>())
                as *const u8;
            std::slice::from_raw_parts(prefix.add(1), *prefix as usize)
        }
    }

    /// Debug words, empty when the record carries none.
    ///
    /// One word per allocation when allocation lengths are present, otherwise
    /// a single word for the whole frame.
    pub fn debug_words(&self) -> &[u32] {
        if self.returns_to_native() || !self.has_debug() {
            return &[];
        }
        unsafe {
            let mut p = self.offsets_base() + self.num_live() * mem::size_of::<u16>();
            let count = if self.has_allocs() {
                let num_allocs = *(p as *const u8) as usize;
                p += num_allocs + 1;
                num_allocs
            } else {
                1
            };
            p = align_up(p, mem::size_of::<u32>());
            std::slice::from_raw_parts(p as *const u32, count)
        }
    }

    /// Address of the record immediately following this one in the blob.
    ///
    /// Skips the live-offset array, the allocation lengths and debug words
    /// when their flags are set, then aligns to pointer width. Boundary
    /// markers skip straight past their empty offset array.
    ///
    /// # Safety
    ///
    /// `self` must lie inside a well-formed frametable blob. When `self` is
    /// the blob's last record, the result is one past its end and must only
    /// be used as a bound, never dereferenced.
    pub unsafe fn next(&self) -> *const FrameDescriptor {
        debug_assert!(self.retaddr() >= 4096);
        let mut p = self.offsets_base();
        if self.returns_to_native() {
            debug_assert_eq!(self.num_live(), 0);
        } else {
            p += self.num_live() * mem::size_of::<u16>();
            let mut num_allocs = 0usize;
            if self.has_allocs() {
                num_allocs = *(p as *const u8) as usize;
                p += num_allocs + 1;
            }
            if self.has_debug() {
                p = align_up(p, mem::size_of::<u32>());
                p += mem::size_of::<u32>() * if self.has_allocs() { num_allocs } else { 1 };
            }
        }
        align_up(p, mem::size_of::<usize>()) as *const FrameDescriptor
    }
}

impl fmt::Debug for FrameDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameDescriptor")
            .field("retaddr", &format_args!("{:#x}", self.retaddr()))
            .field("num_live", &self.num_live())
            .field("has_allocs", &self.has_allocs())
            .field("has_debug", &self.has_debug())
            .field("returns_to_native", &self.returns_to_native())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::FrametableBuilder;

    #[test]
    fn header_layout_matches_wire_format() {
        assert_eq!(mem::offset_of!(FrameDescriptor, key), 0);
        assert_eq!(
            mem::offset_of!(FrameDescriptor, num_live),
            mem::size_of::<usize>()
        );
        assert_eq!(
            mem::offset_of!(FrameDescriptor, live_offsets),
            mem::size_of::<usize>() + mem::size_of::<u16>()
        );
    }

    #[test]
    fn plain_record_fields() {
        let mut builder = FrametableBuilder::new();
        builder.push_frame(0x4000, &[8, 16, 24]);
        let buf = builder.finish();
        let table = buf.table();

        let d = unsafe { &*table.first_record() };
        assert_eq!(d.retaddr(), 0x4000);
        assert_eq!(d.num_live(), 3);
        assert_eq!(d.live_offsets(), &[8, 16, 24]);
        assert!(!d.has_allocs());
        assert!(!d.has_debug());
        assert!(d.alloc_lengths().is_empty());
        assert!(d.debug_words().is_empty());
    }

    #[test]
    fn decoder_skips_alloc_lengths() {
        let mut builder = FrametableBuilder::new();
        builder.push_frame_with(0x4000, &[8], Some(&[16, 32, 48]), false);
        builder.push_frame(0x5000, &[]);
        let buf = builder.finish();
        let table = buf.table();

        let first = unsafe { &*table.first_record() };
        assert_eq!(first.alloc_lengths(), &[16, 32, 48]);

        let second = unsafe { &*first.next() };
        assert_eq!(second.retaddr(), 0x5000);
    }

    #[test]
    fn decoder_skips_debug_words() {
        // Debug words without allocs occupy a single 32-bit slot.
        let mut builder = FrametableBuilder::new();
        builder.push_frame_with(0x4000, &[8, 16], None, true);
        builder.push_frame_with(0x5000, &[8], Some(&[24, 40]), true);
        builder.push_frame(0x6000, &[]);
        let buf = builder.finish();
        let table = buf.table();

        let first = unsafe { &*table.first_record() };
        assert_eq!(first.debug_words().len(), 1);

        let second = unsafe { &*first.next() };
        assert_eq!(second.retaddr(), 0x5000);
        // One debug word per allocation when allocs are present.
        assert_eq!(second.debug_words().len(), 2);

        let third = unsafe { &*second.next() };
        assert_eq!(third.retaddr(), 0x6000);
    }

    #[test]
    fn boundary_marker_ignores_payload_flags() {
        let mut builder = FrametableBuilder::new();
        builder.push_boundary(0x7000);
        builder.push_frame(0x8000, &[8]);
        let buf = builder.finish();
        let table = buf.table();

        let marker = unsafe { &*table.first_record() };
        assert!(marker.returns_to_native());
        assert_eq!(marker.num_live(), 0);
        assert!(marker.alloc_lengths().is_empty());
        assert!(marker.debug_words().is_empty());

        let next = unsafe { &*marker.next() };
        assert_eq!(next.retaddr(), 0x8000);
    }
}
