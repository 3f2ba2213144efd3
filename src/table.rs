//! Descriptor Registry - Open-Addressing Hash Table
//!
//! Maps a return address to the frame descriptor record describing that call
//! site. The table is an open-addressing, linear-probe array of atomic words,
//! one per slot, so lookups can run lock-free while a serialized writer
//! patches entries in place. Three slot states share the word:
//!
//! - `Empty` (0): never occupied; terminates probe chains.
//! - `Tombstone` (1): previously occupied, record since unregistered.
//!   Transparent to lookups so that probe chains through it stay intact.
//! - `Live(ptr)`: any other value is a pointer to a record inside a
//!   registered frametable.
//!
//! Invariants:
//! - `capacity = mask + 1`, a power of two.
//! - `record_count * 2 <= capacity`, maintained by the mutation coordinator
//!   rebuilding before the table would overflow.
//! - For any present key, probing from its bucket reaches its slot before an
//!   `Empty` slot.
//!
//! The hash mixes the return address through `FxHasher` before masking: code
//! addresses share high bits and stride in small low-bit increments, so the
//! identity map would pile whole compilation units into a few buckets.

use std::hash::Hasher;
use std::sync::atomic::{fence, AtomicUsize, Ordering};

use rustc_hash::FxHasher;

use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::record::FrameDescriptor;
use crate::segment::Frametable;

const EMPTY: usize = 0;
const TOMBSTONE: usize = 1;

/// Decoded state of one table slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Slot {
    Empty,
    Tombstone,
    Live(*const FrameDescriptor),
}

impl Slot {
    #[inline]
    fn decode(word: usize) -> Slot {
        match word {
            EMPTY => Slot::Empty,
            TOMBSTONE => Slot::Tombstone,
            ptr => Slot::Live(ptr as *const FrameDescriptor),
        }
    }
}

/// Bucket index for a return address in a table with the given mask.
#[inline]
pub fn bucket(retaddr: usize, mask: usize) -> usize {
    let mut hasher = FxHasher::default();
    hasher.write_usize(retaddr);
    hasher.finish() as usize & mask
}

/// The slot array of the frame-descriptor registry.
///
/// Readers probe concurrently with relaxed per-slot loads; all mutation goes
/// through the mutation coordinator, which guarantees at most one writer and
/// publishes its effects with release fences. A slot only ever transitions
/// from empty-or-tombstone to one final pointer value, so a concurrent reader
/// observes either the pre-insert or the fully inserted state, never a torn
/// record.
pub struct DescriptorTable {
    mask: usize,
    slots: Box<[AtomicUsize]>,
}

impl DescriptorTable {
    /// Allocate a cleared table. `capacity` must be a power of two.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        debug_assert!(capacity.is_power_of_two());
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| RegistryError::OutOfMemory {
                requested: capacity,
            })?;
        slots.resize_with(capacity, || AtomicUsize::new(EMPTY));
        Ok(Self {
            mask: capacity - 1,
            slots: slots.into_boxed_slice(),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    #[inline]
    pub fn mask(&self) -> usize {
        self.mask
    }

    /// Decoded state of slot `index`. Mutation-coordinator and test use only.
    pub fn slot(&self, index: usize) -> Slot {
        Slot::decode(self.slots[index].load(Ordering::Relaxed))
    }

    /// Insert `record` at the first empty-or-tombstone slot on its probe
    /// chain. Never overwrites a live entry: callers guarantee distinct keys
    /// across all registered frametables.
    ///
    /// # Safety
    ///
    /// `record` must point at a record inside a registered (or
    /// being-registered) frametable blob.
    pub unsafe fn insert(&self, record: *const FrameDescriptor) {
        let mut h = bucket((*record).retaddr(), self.mask);
        loop {
            let word = self.slots[h].load(Ordering::Relaxed);
            if word == EMPTY || word == TOMBSTONE {
                self.slots[h].store(record as usize, Ordering::Relaxed);
                return;
            }
            h = (h + 1) & self.mask;
        }
    }

    /// Probe for the record whose key equals `pc`.
    ///
    /// Tombstones neither match nor terminate the scan; an empty slot does.
    /// The scan is bounded at `capacity` probes, so a miss in a table with no
    /// empty slot left still terminates.
    pub fn lookup(&self, pc: usize) -> Option<*const FrameDescriptor> {
        let mut h = bucket(pc, self.mask);
        for _ in 0..self.capacity() {
            match Slot::decode(self.slots[h].load(Ordering::Relaxed)) {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                // A live slot always points into a registered frametable, and
                // unregistration drains in-flight readers before the blob can
                // be freed, so this dereference cannot race with the free.
                Slot::Live(d) => {
                    if unsafe { (*d).retaddr() } == pc {
                        return Some(d);
                    }
                }
            }
            h = (h + 1) & self.mask;
        }
        None
    }

    /// Tombstone the slot holding exactly `record`.
    ///
    /// Identity matters: with a duplicated key the slot to invalidate is the
    /// one holding this record's pointer, not whichever record compares equal
    /// by key.
    ///
    /// # Safety
    ///
    /// `record` must point at a record inside a registered frametable blob.
    ///
    /// # Panics
    ///
    /// If `record` is not present in the table (a collaborator unregistered
    /// something it never registered).
    pub unsafe fn erase(&self, record: *const FrameDescriptor) {
        let mut h = bucket((*record).retaddr(), self.mask);
        for _ in 0..self.capacity() {
            if self.slots[h].load(Ordering::Relaxed) == record as usize {
                self.slots[h].store(TOMBSTONE, Ordering::Relaxed);
                return;
            }
            h = (h + 1) & self.mask;
        }
        panic!("frame descriptor {record:p} is not present in the table");
    }

    /// Insert every record of every frametable.
    ///
    /// # Safety
    ///
    /// Every frametable must reference a well-formed, live blob.
    pub unsafe fn fill(&self, frametables: &[Frametable]) {
        for table in frametables {
            for record in table.records() {
                self.insert(record);
            }
        }
    }

    /// Build a fresh table sized for the full record population of
    /// `frametables` and fill it. Returns the table and the record count.
    ///
    /// Capacity is the smallest power of two >= `config.min_capacity` that
    /// keeps the load factor at or below 50%. This is the only operation that
    /// chooses a capacity.
    ///
    /// # Safety
    ///
    /// Every frametable must reference a well-formed, live blob.
    pub unsafe fn rebuild(
        config: &RegistryConfig,
        frametables: &[Frametable],
    ) -> Result<(DescriptorTable, usize)> {
        let num_records: usize = frametables.iter().map(Frametable::len).sum();
        let mut capacity = config.min_capacity;
        while capacity < 2 * num_records {
            capacity *= 2;
        }
        let table = DescriptorTable::with_capacity(capacity)?;
        table.fill(frametables);
        fence(Ordering::Release);
        Ok((table, num_records))
    }
}
