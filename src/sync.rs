//! A minimal priority-donating lock, built directly on the scheduler's
//! block/unblock primitives and the priority model in [`crate::priority`].
//!
//! This is deliberately small: a binary lock with a single waiter queue,
//! enough to drive the donation chain end to end (component F's external
//! collaborator) and to exercise the multi-level donation scenarios in
//! integration tests. It is not a general-purpose synchronization library.

use crate::list::List;
use crate::priority;
use crate::scheduler;
use crate::thread::{Tcb, WaiterTag};
use core::ptr::NonNull;

/// The holder/waiters state a [`Lock`] shares with the priority model.
/// [`crate::thread::Tcb::required_lock`] points at this struct while a
/// thread is blocked trying to acquire it.
pub struct LockState {
    pub(crate) holder: Option<NonNull<Tcb>>,
    waiters: List<Tcb, WaiterTag>,
}

unsafe impl Send for LockState {}

/// A mutual-exclusion lock that donates the blocked thread's priority to
/// its current holder, recursively, across lock-holder chains.
pub struct Lock {
    state: scheduler::NoInterruptCell<LockState>,
}

unsafe impl Sync for Lock {}

impl Lock {
    pub const fn new() -> Self {
        Self {
            state: scheduler::NoInterruptCell::new(LockState { holder: None, waiters: List::new() }),
        }
    }

    /// Whether the calling thread already holds this lock.
    pub fn is_held_by_current(&self) -> bool {
        let _guard = scheduler::interrupts_off();
        unsafe { (*self.state.get()).holder } == Some(scheduler::current())
    }

    /// Acquire the lock, blocking and donating priority through the holder
    /// chain if it is already held.
    pub fn acquire(&self) {
        let _guard = scheduler::interrupts_off();
        let current = scheduler::current();
        let lock_ptr = unsafe { NonNull::new_unchecked(self.state.get()) };

        unsafe {
            let state = &mut *self.state.get();
            if let Some(holder) = state.holder {
                debug_assert_ne!(holder, current, "lock is not recursive");
                if holder != current {
                    (*current.as_ptr()).required_lock = Some(lock_ptr);
                    state.waiters.push_back(current);
                    priority::donate_priority(scheduler::ready_list_mut(), current);
                    // Still blocked on return: some other thread must have
                    // released the lock to us via `release`.
                    scheduler::block_current();
                    return;
                }
            }
            state.holder = Some(current);
        }
    }

    /// Release the lock, handing it to the highest-priority waiter (if any)
    /// and dropping this thread's priority back to its donation-free level.
    pub fn release(&self) {
        let _guard = scheduler::interrupts_off();
        let current = scheduler::current();
        unsafe {
            let state = &mut *self.state.get();
            debug_assert_eq!(state.holder, Some(current));

            priority::remove_donations_for_lock(current, NonNull::new_unchecked(self.state.get()));
            priority::reset_priority(scheduler::ready_list_mut(), current);

            if let Some(next) = state.waiters.pop_front() {
                (*next.as_ptr()).required_lock = None;
                state.holder = Some(next);
                scheduler::unblock(next);
            } else {
                state.holder = None;
            }
        }
    }
}

impl Default for Lock {
    fn default() -> Self {
        Self::new()
    }
}
