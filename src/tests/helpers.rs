//! Shared scaffolding for tests that drive the scheduler singleton.
//!
//! The scheduler is a process-wide global guarded only by the
//! interrupts-off discipline, which assumes a single logical CPU — not the
//! thread pool `cargo test` runs test functions under. [`serialize`] gives
//! a test exclusive access to it; [`boot`] brings the singleton up exactly
//! once per test binary.
//!
//! `std-shim`'s [`crate::arch::NoOpArch`] never actually transfers control
//! on a context switch, so "the thread that's running" is just whatever
//! `scheduler::current()` last points at, not a real call stack. Tests
//! script multi-thread scenarios — "B calls `lock.acquire()` while A holds
//! it" — by creating real threads with [`crate::scheduler::create`] and
//! then forcing `current` between steps with
//! [`crate::scheduler::set_current_for_test`], driving the real
//! `Lock`/`priority` code paths in the exact order a live scenario would.
//!
//! `scheduler::exit` is deliberately never exercised here: it relies on the
//! switch it triggers never returning, which only holds on real hardware.
//! Under `NoOpArch` it would fall through to its own `unreachable!()`.

#![cfg(feature = "std-shim")]

extern crate std;

use std::sync::{Mutex, MutexGuard, Once};

use core::ptr::NonNull;

use crate::scheduler::{self, PRI_DEFAULT};
use crate::thread::{Status, Tcb, ThreadId};

static TEST_LOCK: Mutex<()> = Mutex::new(());
static BOOT: Once = Once::new();

/// Exclusive access to the scheduler singleton for the rest of the calling
/// test. Hold this for the whole test, not just around individual calls,
/// since a scenario's intermediate states (donations mid-chain, a thread
/// parked `Blocked` outside any list) are only valid from this thread's own
/// point of view.
#[must_use]
pub fn serialize() -> MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Bring the scheduler singleton up for the whole test binary: adopt the
/// calling context as the initial thread and start the idle thread. Only
/// the first call does anything; safe to call from every test that needs
/// the singleton. Must be called while holding [`serialize`].
pub fn boot() {
    BOOT.call_once(|| {
        scheduler::init();
        scheduler::start();
    });
}

/// A thread body that does nothing. These tests never let a created
/// thread's entry function actually run — `NoOpArch` never switches a real
/// stack into it — but `scheduler::create` still needs a valid pointer.
pub fn noop_entry(_aux: usize) {}

/// Create a thread at the given priority and return its id, panicking on
/// allocation failure (the page pool is never exhausted in these tests).
pub fn spawn(name: &str, priority: u8) -> ThreadId {
    scheduler::create(name, priority, noop_entry, 0).expect("page pool should not be exhausted in tests")
}

/// Create a thread at the default priority.
pub fn spawn_default(name: &str) -> ThreadId {
    spawn(name, PRI_DEFAULT)
}

/// Force `t` to be reported as `current`, first unlinking it from the
/// ready list if it happens to be sitting there `Ready` (from its own
/// creation, or from a previous step of the same script), then marking it
/// `Running`. Without the status update, a thread forced current twice in a
/// row (common in multi-hop donation scripts) would still read back
/// `Ready` on the second call and get handed to `ready_list.remove` a
/// second time even though it is no longer linked, corrupting the list.
/// Real scheduling code never hits this because `current` only ever
/// changes via `schedule`, which always updates `status` itself.
pub fn force_current(t: NonNull<Tcb>) {
    let _guard = scheduler::interrupts_off();
    if unsafe { t.as_ref().status() } == Status::Ready {
        scheduler::ready_list_mut().remove(t);
    }
    unsafe { (*t.as_ptr()).status = Status::Running };
    drop(_guard);
    scheduler::set_current_for_test(t);
}
