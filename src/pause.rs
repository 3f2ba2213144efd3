//! Global Pause - Stop-the-World Coordination
//!
//! Growing the descriptor table swaps the slot array out from under readers,
//! which is only safe when no reader is running. The registry does not own
//! the mechanism that brings every execution unit to a halt; the embedding
//! runtime provides it through [`WorldStopper`]. The contract is the
//! classic "stop all units, one elected actor does the work, all resume
//! together" protocol, and it is the only registry operation visible to
//! lookups as a pause.
//!
//! Two implementations ship with the crate:
//!
//! - [`SingleUnitWorld`] for embedders with one execution unit, or whose
//!   caller already holds a stop-the-world section.
//! - [`SafepointWorld`], a polling safepoint barrier for embedders whose
//!   units can poll between units of work.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crossbeam::utils::Backoff;
use parking_lot::Mutex;

/// Externally provided stop-the-world capability.
pub trait WorldStopper: Send + Sync {
    /// Bring every execution unit to a pause, run `work` exactly once while
    /// all units are stopped, then resume all units together.
    ///
    /// The caller acts as the elected actor: `work` runs on the requesting
    /// unit while every other unit is parked. No lookup may execute anywhere
    /// between the moment all units are stopped and the moment they resume.
    fn run_stopped(&self, work: &mut dyn FnMut());
}

/// World stopper for embedders with a single execution unit.
///
/// With nobody else to stop, the work simply runs inline. Also usable when
/// the caller is already inside an externally coordinated stop-the-world
/// section.
pub struct SingleUnitWorld;

impl WorldStopper for SingleUnitWorld {
    fn run_stopped(&self, work: &mut dyn FnMut()) {
        work();
    }
}

const PAUSE_NONE: u8 = 0;
const PAUSE_REQUESTED: u8 = 1;

/// Polling safepoint barrier.
///
/// Execution units register themselves and call [`poll`](Self::poll) at
/// safepoints (anywhere outside a lookup). A pause request flips the shared
/// state; polling units park and spin until released. The requester waits
/// for every registered unit to park, runs the work as the elected actor,
/// then releases the world. A mutex serializes overlapping pause requests.
///
/// The requesting unit must not itself be registered (it cannot park while
/// coordinating), and registered units must keep polling or the requester
/// waits forever.
///
/// # Examples
///
/// ```rust
/// use frame_registry::{SafepointWorld, WorldStopper};
///
/// let world = SafepointWorld::new();
/// // No units registered: the work runs immediately.
/// let mut ran = false;
/// world.run_stopped(&mut || ran = true);
/// assert!(ran);
/// ```
pub struct SafepointWorld {
    state: AtomicU8,
    registered: AtomicUsize,
    parked: AtomicUsize,
    coordinator: Mutex<()>,
}

impl SafepointWorld {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PAUSE_NONE),
            registered: AtomicUsize::new(0),
            parked: AtomicUsize::new(0),
            coordinator: Mutex::new(()),
        }
    }

    /// Add the calling execution unit to the set that must park for a pause.
    pub fn register_unit(&self) {
        self.registered.fetch_add(1, Ordering::AcqRel);
    }

    /// Remove the calling execution unit from the pause set.
    ///
    /// Must be called while the unit is not parked; a unit that exits
    /// without unregistering blocks every future pause.
    pub fn unregister_unit(&self) {
        let prev = self.registered.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0);
    }

    /// Safepoint poll. Parks the calling unit for the duration of a pending
    /// pause; returns immediately when none is pending.
    pub fn poll(&self) {
        if self.state.load(Ordering::Acquire) == PAUSE_REQUESTED {
            self.park();
        }
    }

    /// Number of units currently parked. Test and introspection use.
    pub fn parked_units(&self) -> usize {
        self.parked.load(Ordering::Acquire)
    }

    fn park(&self) {
        self.parked.fetch_add(1, Ordering::AcqRel);
        let backoff = Backoff::new();
        while self.state.load(Ordering::Acquire) == PAUSE_REQUESTED {
            backoff.snooze();
        }
        self.parked.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Default for SafepointWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldStopper for SafepointWorld {
    fn run_stopped(&self, work: &mut dyn FnMut()) {
        let _pause = self.coordinator.lock();

        self.state.store(PAUSE_REQUESTED, Ordering::SeqCst);
        let backoff = Backoff::new();
        while self.parked.load(Ordering::Acquire) < self.registered.load(Ordering::Acquire) {
            backoff.snooze();
        }

        work();

        self.state.store(PAUSE_NONE, Ordering::Release);

        // Wait for the parked units to leave before the coordinator mutex is
        // released: a back-to-back pause must not mistake stale parked units
        // for newly arrived ones.
        let backoff = Backoff::new();
        while self.parked.load(Ordering::Acquire) != 0 {
            backoff.snooze();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn single_unit_world_runs_inline() {
        let mut ran = false;
        SingleUnitWorld.run_stopped(&mut || ran = true);
        assert!(ran);
    }

    #[test]
    fn pause_waits_for_registered_units() {
        let world = Arc::new(SafepointWorld::new());
        let stop = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let world = Arc::clone(&world);
            let stop = Arc::clone(&stop);
            world.register_unit();
            handles.push(std::thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    world.poll();
                    std::hint::spin_loop();
                }
                world.unregister_unit();
            }));
        }

        // All three units must be parked while the work runs.
        let world2 = Arc::clone(&world);
        world.run_stopped(&mut || {
            assert_eq!(world2.parked_units(), 3);
        });
        assert_eq!(world.parked_units(), 0);

        stop.store(true, Ordering::Release);
        for handle in handles {
            handle.join().unwrap();
        }
    }

    #[test]
    fn back_to_back_pauses() {
        let world = Arc::new(SafepointWorld::new());
        let stop = Arc::new(AtomicBool::new(false));

        world.register_unit();
        let worker = {
            let world = Arc::clone(&world);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    world.poll();
                }
                world.unregister_unit();
            })
        };

        for _ in 0..100 {
            let mut ran = false;
            world.run_stopped(&mut || ran = true);
            assert!(ran);
        }

        stop.store(true, Ordering::Release);
        worker.join().unwrap();
    }
}
