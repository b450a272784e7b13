//! Priority ordering and recursive priority donation (component F).
//!
//! Grounded directly on `thread_donate_priority`/`thread_remove_donation`/
//! `thread_reset_priority`/`thread_get_donated_priority`: a blocked thread
//! walks the chain of lock holders it is waiting behind, donating its
//! effective priority to each in turn, until it reaches a holder that is not
//! itself blocked. Every entry point here must be called with interrupts
//! already disabled — the donation lists are plain intrusive lists with no
//! locking of their own.

extern crate alloc;

use crate::list::List;
use crate::scheduler::PRI_MIN;
use crate::thread::{DonationTag, ReadyTag, Tcb};
use core::ptr::NonNull;

/// Ordering used for `ready_list`: strictly descending priority, with
/// equal-priority threads staying in arrival order (`insert_ordered` only
/// steps past strictly-greater-or-equal entries).
pub fn higher_priority(a: &Tcb, b: &Tcb) -> bool {
    a.priority() > b.priority()
}

/// Ordering used for a thread's `donations` list: strictly descending by
/// the donor's own effective priority.
fn higher_donation(a: &Tcb, b: &Tcb) -> bool {
    a.priority() > b.priority()
}

/// The highest priority among `t`'s current donors, or `PRI_MIN - 1` if `t`
/// has received no donations (mirrors `thread_get_donated_priority`'s use
/// of an out-of-range sentinel so a real donation always wins the `max`).
fn donated_priority(t: NonNull<Tcb>) -> i32 {
    let donations: &List<Tcb, DonationTag> = unsafe { &(*t.as_ptr()).donations };
    match donations.front() {
        Some(donor) => unsafe { donor.as_ref().priority() as i32 },
        None => PRI_MIN as i32 - 1,
    }
}

/// Recompute `t`'s effective priority as `max(base_priority, donated_priority)`
/// and, if `t` is on the ready list, reinsert it to keep the list sorted.
pub fn reset_priority(ready_list: &mut List<Tcb, ReadyTag>, t: NonNull<Tcb>) {
    let donated = donated_priority(t);
    unsafe {
        let tcb = &mut *t.as_ptr();
        tcb.priority = if donated > tcb.base_priority as i32 {
            donated as u8
        } else {
            tcb.base_priority
        };

        if tcb.status == crate::thread::Status::Ready {
            ready_list.remove(t);
            ready_list.insert_ordered(t, higher_priority);
        }
    }
}

/// Detach `t` from whichever thread's `donations` list currently holds it,
/// if any (mirrors `thread_remove_donation`'s `dona_elem.next != NULL`
/// tombstone check — here tracked via `donated_into` rather than a raw
/// linked-list pointer, since this crate's lists are not sentinel-based).
pub fn remove_donation(t: NonNull<Tcb>) {
    unsafe {
        if let Some(holder) = (*t.as_ptr()).donated_into.take() {
            (*holder.as_ptr()).donations.remove(t);
        }
    }
}

/// Remove every donation `holder` has received whose donor is blocked on
/// `lock`, and drop the donor's record of where it donated. Called when a
/// lock is released: the donations it motivated no longer apply.
pub fn remove_donations_for_lock(
    holder: NonNull<Tcb>,
    lock: NonNull<crate::sync::LockState>,
) {
    unsafe {
        let donations = &mut (*holder.as_ptr()).donations;
        let stale: alloc::vec::Vec<NonNull<Tcb>> = donations
            .iter()
            .filter(|&donor| donor.as_ref().required_lock == Some(lock))
            .collect();
        for donor in stale {
            donations.remove(donor);
            (*donor.as_ptr()).donated_into = None;
        }
    }
}

/// Walk `t`'s chain of required locks, donating its priority to each
/// holder in turn. Must be called with interrupts disabled.
///
/// Mirrors `thread_donate_priority`: `t` itself is reset first, then for as
/// long as `t` is waiting on a lock, its priority is donated to that lock's
/// holder (replacing any stale donation it previously made), and `t` is
/// advanced to that holder to continue the walk.
pub fn donate_priority(ready_list: &mut List<Tcb, ReadyTag>, mut t: NonNull<Tcb>) {
    let current = crate::scheduler::current();

    while let Some(lock) = unsafe { (*t.as_ptr()).required_lock } {
        reset_priority(ready_list, t);

        let holder = unsafe { (*lock.as_ptr()).holder };
        debug_assert_ne!(holder, Some(t));

        if t != current {
            remove_donation(t);
        }

        match holder {
            Some(holder) => unsafe {
                (*holder.as_ptr()).donations.insert_ordered(t, higher_donation);
                (*t.as_ptr()).donated_into = Some(holder);
                t = holder;
            },
            None => break,
        }
    }
    reset_priority(ready_list, t);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn donated_priority_sentinel_is_below_pri_min() {
        assert!(PRI_MIN as i32 - 1 < PRI_MIN as i32);
    }
}
