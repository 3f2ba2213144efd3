//! Mutation Coordinator and Lookup API
//!
//! [`FrameRegistry`] owns the live descriptor table and the list of
//! registered frametables, and coordinates three kinds of access:
//!
//! - **Lookups** ([`FrameRegistry::find`]) run lock-free at any time, from
//!   any number of execution units. They publish themselves through an
//!   in-flight counter so unregistration can drain them.
//! - **Mutations** (register / unregister) serialize on a writer mutex and
//!   patch the live table in place: additive inserts, tombstone removals.
//! - **Growth** escalates to a stop-the-world rebuild through the embedding
//!   runtime's [`WorldStopper`]: the elected actor swaps in a larger slot
//!   array while no lookup runs anywhere.
//!
//! A lookup that starts after a mutation completes sees it in full (the
//! acquire fence on entry pairs with the writer's release fence). A lookup
//! concurrent with an insert may or may not see the new entry, never a torn
//! one. A lookup concurrent with a removal may still return the removed
//! record; the reader drain in [`unregister_frametables`] bounds how long
//! that stale-but-valid read can overlap the caller freeing the blob.
//!
//! The table lives for the whole process once built; only frametable
//! registrations come and go.
//!
//! [`unregister_frametables`]: FrameRegistry::unregister_frametables

use std::sync::atomic::{fence, AtomicPtr, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::utils::Backoff;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::config::RegistryConfig;
use crate::error::Result;
use crate::pause::WorldStopper;
use crate::record::FrameDescriptor;
use crate::segment::Frametable;
use crate::table::DescriptorTable;

/// Writer-side state: only touched under the writer mutex (or by the elected
/// actor during a pause, when no other writer can run).
struct WriterState {
    num_records: usize,
    frametables: Vec<Frametable>,
}

/// The frame-descriptor registry.
///
/// Create one per process through [`init`], or construct instances directly
/// for embedding and tests.
pub struct FrameRegistry {
    /// The live table. Replaced only during a stop-the-world rebuild.
    table: AtomicPtr<DescriptorTable>,
    writer: Mutex<WriterState>,
    /// In-flight lookup count, drained by unregistration.
    readers: AtomicUsize,
    world: Arc<dyn WorldStopper>,
    config: RegistryConfig,
}

impl FrameRegistry {
    /// Build a registry and its initial table from the frametables known at
    /// startup. Runs before any concurrent reader exists, so no coordination
    /// is needed here.
    ///
    /// # Safety
    ///
    /// Every frametable must reference a well-formed blob that stays valid
    /// and unmodified until it is unregistered.
    pub unsafe fn new(
        config: RegistryConfig,
        world: Arc<dyn WorldStopper>,
        frametables: &[Frametable],
    ) -> Result<Self> {
        config.validate()?;
        let (table, num_records) = DescriptorTable::rebuild(&config, frametables)?;
        log::debug!(
            "frame registry built: {} records, capacity {}",
            num_records,
            table.capacity()
        );
        Ok(Self {
            table: AtomicPtr::new(Box::into_raw(Box::new(table))),
            writer: Mutex::new(WriterState {
                num_records,
                frametables: frametables.to_vec(),
            }),
            readers: AtomicUsize::new(0),
            world,
            config,
        })
    }

    #[inline]
    fn table_ref(&self) -> &DescriptorTable {
        // Never null: set in `new` and only ever replaced, not cleared.
        unsafe { &*self.table.load(Ordering::Acquire) }
    }

    /// Current slot-array capacity.
    pub fn capacity(&self) -> usize {
        self.table_ref().capacity()
    }

    /// Number of registered records.
    pub fn record_count(&self) -> usize {
        self.writer.lock().num_records
    }

    /// Number of registered frametables.
    pub fn frametable_count(&self) -> usize {
        self.writer.lock().frametables.len()
    }

    /// Number of live (non-empty, non-tombstone) slots. O(capacity);
    /// invariant-check and test use.
    pub fn live_slot_count(&self) -> usize {
        let table = self.table_ref();
        (0..table.capacity())
            .filter(|&i| matches!(table.slot(i), crate::table::Slot::Live(_)))
            .count()
    }

    /// Register frametables produced by newly loaded compiled code.
    ///
    /// When the live table has room, the new records are probe-inserted in
    /// place and published with a release fence; concurrent lookups observe
    /// either the pre-insert or the fully inserted state for any given key.
    /// When capacity would overflow the 50% load factor, the registry asks
    /// the world stopper for a pause and the elected actor rebuilds the
    /// table at a larger capacity.
    ///
    /// # Safety
    ///
    /// Every frametable must reference a well-formed blob that stays valid
    /// and unmodified until it is unregistered, and its keys must be
    /// distinct from every already-registered key.
    pub unsafe fn register_frametables(&self, frametables: &[Frametable]) -> Result<()> {
        if frametables.is_empty() {
            return Ok(());
        }
        let added: usize = frametables.iter().map(Frametable::len).sum();

        let mut writer = self.writer.lock();
        let table = self.table_ref();
        if table.capacity() >= 2 * (writer.num_records + added) {
            table.fill(frametables);
            writer.num_records += added;
            writer.frametables.splice(0..0, frametables.iter().copied());
            drop(writer);
            fence(Ordering::Release);
            log::trace!("registered {added} records in place");
            Ok(())
        } else {
            drop(writer);
            self.grow_and_register(frametables, added)
        }
    }

    /// Stop-the-world path of registration: rebuild at a larger capacity.
    ///
    /// # Safety
    ///
    /// Same contract as [`register_frametables`](Self::register_frametables);
    /// the writer mutex must not be held by the calling thread.
    unsafe fn grow_and_register(&self, frametables: &[Frametable], added: usize) -> Result<()> {
        let mut outcome = Ok(());
        self.world.run_stopped(&mut || {
            // Elected actor: every other unit is parked and no lookup runs.
            // Other writers queued on the mutex are parked too, so locking
            // here cannot deadlock.
            let mut writer = self.writer.lock();
            let table = self.table_ref();

            if table.capacity() >= 2 * (writer.num_records + added) {
                // A registration queued ahead of us already grew the table
                // before the pause took effect; patching in place is enough.
                unsafe { table.fill(frametables) };
                writer.num_records += added;
                writer.frametables.splice(0..0, frametables.iter().copied());
                return;
            }

            // Merge the new frametables onto the front of the existing list
            // and rebuild from the union.
            let mut merged = Vec::with_capacity(frametables.len() + writer.frametables.len());
            merged.extend_from_slice(frametables);
            merged.extend_from_slice(&writer.frametables);

            match unsafe { DescriptorTable::rebuild(&self.config, &merged) } {
                Ok((new_table, num_records)) => {
                    let old_capacity = table.capacity();
                    let old = self
                        .table
                        .swap(Box::into_raw(Box::new(new_table)), Ordering::AcqRel);
                    // No reader can still hold the old table: the world is
                    // stopped.
                    unsafe { drop(Box::from_raw(old)) };
                    writer.num_records = num_records;
                    writer.frametables = merged;
                    log::debug!(
                        "frame table grew: capacity {} -> {} ({} records)",
                        old_capacity,
                        self.table_ref().capacity(),
                        num_records
                    );
                }
                Err(e) => outcome = Err(e),
            }
        });
        outcome
    }

    /// Unregister frametables for compiled code about to be unloaded.
    ///
    /// Every record of every named frametable is tombstoned by pointer
    /// identity and the frametable handles are unlinked. The call then
    /// busy-waits (it never blocks lookups, only this caller) until every
    /// in-flight lookup has drained: a lookup may already have read a record
    /// pointer and still be comparing its key when this returns, and the
    /// caller is free to release the blob's memory immediately afterwards.
    ///
    /// # Safety
    ///
    /// The frametable blobs must still be valid when this is called; they
    /// may be freed as soon as it returns.
    ///
    /// # Panics
    ///
    /// If a named frametable (or any of its records) was never registered.
    pub unsafe fn unregister_frametables(&self, frametables: &[Frametable]) {
        if frametables.is_empty() {
            return;
        }
        {
            let mut writer = self.writer.lock();
            let table = self.table_ref();
            let mut removed = 0;
            for ft in frametables {
                for record in ft.records() {
                    table.erase(record);
                }
                removed += ft.len();
            }
            writer.num_records -= removed;
            for ft in frametables {
                let pos = writer
                    .frametables
                    .iter()
                    .position(|t| t == ft)
                    .unwrap_or_else(|| {
                        panic!("frametable {:p} is not registered", ft.as_raw())
                    });
                writer.frametables.swap_remove(pos);
            }
            log::trace!("unregistered {removed} records");
        }

        // Drain in-flight lookups before handing the blobs back to the
        // caller. Busy-wait: lookups are short and remove-vs-read overlap is
        // rare, so this spin is expected to be brief.
        let backoff = Backoff::new();
        while self.readers.load(Ordering::Acquire) != 0 {
            backoff.snooze();
        }
    }

    /// Look up the frame descriptor for a return address.
    ///
    /// Lock-free: never blocks, never allocates, never takes the writer
    /// mutex. `None` is a legitimate outcome for real compiled code without
    /// descriptor records, not an error.
    ///
    /// The returned reference stays valid until its frametable is
    /// unregistered; the stack walker uses it immediately and never holds it
    /// across an unregistration.
    pub fn find(&self, pc: usize) -> Option<&FrameDescriptor> {
        let _guard = ReaderGuard::enter(self);
        let record = self.table_ref().lookup(pc)?;
        // Live while the guard holds unregistration's drain at bay, and
        // beyond it while the frametable stays registered.
        Some(unsafe { &*record })
    }
}

impl Drop for FrameRegistry {
    fn drop(&mut self) {
        let table = *self.table.get_mut();
        if !table.is_null() {
            unsafe { drop(Box::from_raw(table)) };
        }
    }
}

/// RAII registration of an in-flight lookup.
///
/// The acquire fence on entry pairs with the release fence a completed
/// mutation publishes, so a lookup entered after that fence observes the
/// mutation in full.
struct ReaderGuard<'a> {
    registry: &'a FrameRegistry,
}

impl<'a> ReaderGuard<'a> {
    #[inline]
    fn enter(registry: &'a FrameRegistry) -> Self {
        fence(Ordering::Acquire);
        registry.readers.fetch_add(1, Ordering::AcqRel);
        ReaderGuard { registry }
    }
}

impl Drop for ReaderGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.registry.readers.fetch_sub(1, Ordering::Release);
    }
}

static GLOBAL: OnceCell<FrameRegistry> = OnceCell::new();

/// Build the process-wide registry.
///
/// Must run exactly once, before any other thread can reach the registry;
/// the explicit call keeps that precondition visible instead of hiding it
/// behind lazy initialization.
///
/// # Safety
///
/// Same frametable contract as [`FrameRegistry::new`].
///
/// # Panics
///
/// If the registry was already initialized.
pub unsafe fn init(
    config: RegistryConfig,
    world: Arc<dyn WorldStopper>,
    frametables: &[Frametable],
) -> Result<()> {
    let registry = FrameRegistry::new(config, world, frametables)?;
    if GLOBAL.set(registry).is_err() {
        panic!("frame registry initialized twice");
    }
    Ok(())
}

/// Handle to the process-wide registry, for repeated lookups without
/// re-resolving global state on every call.
///
/// # Panics
///
/// If [`init`] has not run.
pub fn get_table_handle() -> &'static FrameRegistry {
    GLOBAL
        .get()
        .expect("frame registry used before init")
}

/// Look up a return address in the process-wide registry.
pub fn find(pc: usize) -> Option<&'static FrameDescriptor> {
    get_table_handle().find(pc)
}

/// Register frametables with the process-wide registry.
///
/// # Safety
///
/// See [`FrameRegistry::register_frametables`].
pub unsafe fn register_frametables(frametables: &[Frametable]) -> Result<()> {
    get_table_handle().register_frametables(frametables)
}

/// Register a single frametable with the process-wide registry.
///
/// # Safety
///
/// See [`FrameRegistry::register_frametables`].
pub unsafe fn register_frametable(frametable: Frametable) -> Result<()> {
    register_frametables(&[frametable])
}

/// Unregister frametables from the process-wide registry.
///
/// # Safety
///
/// See [`FrameRegistry::unregister_frametables`].
pub unsafe fn unregister_frametables(frametables: &[Frametable]) {
    get_table_handle().unregister_frametables(frametables)
}

/// Unregister a single frametable from the process-wide registry.
///
/// # Safety
///
/// See [`FrameRegistry::unregister_frametables`].
pub unsafe fn unregister_frametable(frametable: Frametable) {
    unregister_frametables(&[frametable])
}
