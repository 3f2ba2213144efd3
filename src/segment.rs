//! Segment List - Frametable Handles
//!
//! A frametable is an externally produced, externally owned contiguous blob:
//! one leading record-count word followed by that many packed frame
//! descriptor records. The registry never allocates or frees the blob's
//! bytes; it only reads them and tracks which frametables are currently
//! registered. Frametables are registered and unregistered as whole units,
//! identified by the address of their count word.
//!
//! [`FrametableBuilder`] produces correctly packed blobs for embedders that
//! generate tables at runtime and for tests; ahead-of-time compiled code
//! hands the registry raw pointers via [`Frametable::from_raw`].

use std::mem;

use crate::record::{
    FrameDescriptor, FLAG_HAS_ALLOCS, FLAG_HAS_DEBUG, FLAG_MASK, FLAG_RETURN_TO_NATIVE,
};
use crate::util::is_aligned;

/// Handle to an externally owned frametable blob.
///
/// `Copy` and compared by pointer identity: two handles are equal exactly
/// when they name the same blob.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Frametable(*const usize);

// The blob behind the handle is immutable for as long as it is registered,
// and the registration contract makes the embedder responsible for its
// lifetime across threads.
unsafe impl Send for Frametable {}
unsafe impl Sync for Frametable {}

impl Frametable {
    /// Wrap a pointer to a frametable's leading count word.
    ///
    /// # Safety
    ///
    /// `ptr` must reference a well-formed, pointer-aligned blob (count word
    /// followed by that many packed records) that stays valid and unmodified
    /// for as long as any registry operation can name it.
    #[inline]
    pub unsafe fn from_raw(ptr: *const usize) -> Self {
        debug_assert!(is_aligned(ptr as usize, mem::size_of::<usize>()));
        Frametable(ptr)
    }

    /// The blob's base address (its count word).
    #[inline]
    pub fn as_raw(&self) -> *const usize {
        self.0
    }

    /// Number of records in this frametable.
    #[inline]
    pub fn len(&self) -> usize {
        unsafe { *self.0 }
    }

    /// Whether the frametable holds no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pointer to the first packed record, directly behind the count word.
    #[inline]
    pub fn first_record(&self) -> *const FrameDescriptor {
        unsafe { self.0.add(1) as *const FrameDescriptor }
    }

    /// Iterate over the packed records in blob order.
    pub fn records(&self) -> RecordIter {
        RecordIter {
            next: self.first_record(),
            remaining: self.len(),
        }
    }
}

/// Iterator over the records of one frametable.
pub struct RecordIter {
    next: *const FrameDescriptor,
    remaining: usize,
}

impl Iterator for RecordIter {
    type Item = *const FrameDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let d = self.next;
        self.remaining -= 1;
        if self.remaining > 0 {
            self.next = unsafe { (*d).next() };
        }
        Some(d)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for RecordIter {}

/// Builder producing packed frametable blobs.
///
/// # Examples
///
/// ```rust
/// use frame_registry::FrametableBuilder;
///
/// let mut builder = FrametableBuilder::new();
/// builder.push_frame(0x1000, &[8, 24]);
/// builder.push_frame(0x2000, &[16]);
/// let buf = builder.finish();
/// assert_eq!(buf.table().len(), 2);
/// ```
#[derive(Default)]
pub struct FrametableBuilder {
    bytes: Vec<u8>,
    count: usize,
}

impl FrametableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record with live-slot offsets and no optional sections.
    pub fn push_frame(&mut self, retaddr: usize, live_offsets: &[u16]) -> &mut Self {
        self.push_frame_with(retaddr, live_offsets, None, false)
    }

    /// Append a record with optional allocation lengths and debug words.
    ///
    /// Debug words are emitted zeroed; their content belongs to the code
    /// generator, not the registry.
    ///
    /// # Panics
    ///
    /// If `retaddr` carries flag bits, holds more than `u16::MAX` offsets,
    /// or more than 255 allocation lengths.
    pub fn push_frame_with(
        &mut self,
        retaddr: usize,
        live_offsets: &[u16],
        alloc_lengths: Option<&[u8]>,
        debug: bool,
    ) -> &mut Self {
        assert_eq!(retaddr & FLAG_MASK, 0, "return address carries flag bits");
        assert!(live_offsets.len() <= u16::MAX as usize);

        let mut key = retaddr;
        if alloc_lengths.is_some() {
            key |= FLAG_HAS_ALLOCS;
        }
        if debug {
            key |= FLAG_HAS_DEBUG;
        }
        self.push_header(key, live_offsets.len() as u16);
        for off in live_offsets {
            self.bytes.extend_from_slice(&off.to_ne_bytes());
        }
        if let Some(lengths) = alloc_lengths {
            assert!(lengths.len() <= u8::MAX as usize);
            self.bytes.push(lengths.len() as u8);
            self.bytes.extend_from_slice(lengths);
        }
        if debug {
            self.pad_to(mem::size_of::<u32>());
            let words = alloc_lengths.map_or(1, <[u8]>::len);
            for _ in 0..words {
                self.bytes.extend_from_slice(&0u32.to_ne_bytes());
            }
        }
        self.pad_to(mem::size_of::<usize>());
        self.count += 1;
        self
    }

    /// Append a boundary marker: the record that terminates a managed stack
    /// chunk (zero live slots, returns-to-native flag set).
    pub fn push_boundary(&mut self, retaddr: usize) -> &mut Self {
        assert_eq!(retaddr & FLAG_MASK, 0, "return address carries flag bits");
        self.push_header(retaddr | FLAG_RETURN_TO_NATIVE, 0);
        self.pad_to(mem::size_of::<usize>());
        self.count += 1;
        self
    }

    fn push_header(&mut self, key: usize, num_live: u16) {
        debug_assert!(is_aligned(self.bytes.len(), mem::size_of::<usize>()));
        self.bytes.extend_from_slice(&key.to_ne_bytes());
        self.bytes.extend_from_slice(&num_live.to_ne_bytes());
    }

    fn pad_to(&mut self, alignment: usize) {
        while !is_aligned(self.bytes.len(), alignment) {
            self.bytes.push(0);
        }
    }

    /// Pack the accumulated records into an owned, word-aligned blob.
    pub fn finish(self) -> FrametableBuf {
        let word = mem::size_of::<usize>();
        let mut storage = Vec::with_capacity(1 + self.bytes.len() / word);
        storage.push(self.count);
        for chunk in self.bytes.chunks_exact(word) {
            let mut w = [0u8; mem::size_of::<usize>()];
            w.copy_from_slice(chunk);
            storage.push(usize::from_ne_bytes(w));
        }
        FrametableBuf {
            storage: storage.into_boxed_slice(),
        }
    }
}

/// Owned backing storage for a built frametable.
///
/// The registry only ever sees the [`Frametable`] handle; dropping the buffer
/// frees the blob, so it must outlive the handle's registration.
pub struct FrametableBuf {
    storage: Box<[usize]>,
}

impl FrametableBuf {
    /// Handle to the packed blob.
    pub fn table(&self) -> Frametable {
        unsafe { Frametable::from_raw(self.storage.as_ptr()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_builder_yields_empty_table() {
        let buf = FrametableBuilder::new().finish();
        assert!(buf.table().is_empty());
        assert_eq!(buf.table().records().count(), 0);
    }

    #[test]
    fn records_iterate_in_blob_order() {
        let mut builder = FrametableBuilder::new();
        builder.push_frame(0x1000, &[8]);
        builder.push_frame_with(0x2000, &[8, 16], Some(&[32]), true);
        builder.push_boundary(0x3000);
        let buf = builder.finish();

        let keys: Vec<usize> = buf
            .table()
            .records()
            .map(|d| unsafe { (*d).retaddr() })
            .collect();
        assert_eq!(keys, vec![0x1000, 0x2000, 0x3000]);
    }

    #[test]
    fn handles_compare_by_identity() {
        let mut builder = FrametableBuilder::new();
        builder.push_frame(0x1000, &[]);
        let a = builder.finish();

        let mut builder = FrametableBuilder::new();
        builder.push_frame(0x1000, &[]);
        let b = builder.finish();

        assert_eq!(a.table(), a.table());
        assert_ne!(a.table(), b.table());
    }

    #[test]
    #[should_panic(expected = "flag bits")]
    fn rejects_misaligned_return_address() {
        FrametableBuilder::new().push_frame(0x1001, &[]);
    }
}
